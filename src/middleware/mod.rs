use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::BookingError;

/// Header carrying the caller identity resolved by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Opaque caller identity. Bookings are scoped to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(CallerId(user_id.to_string()))
    }
}

/// JSON body that is deserialized and then validated. Malformed bodies and
/// failed rules are both a `ValidationError`.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| BookingError::Validation(rejection.body_text()))?;
        value
            .validate()
            .map_err(|e| BookingError::Validation(e.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

/// Path parameters whose parse failures are reported as a `ValidationError`.
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| BookingError::Validation(rejection.body_text()))?;
        Ok(ApiPath(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Hold {
        #[validate(length(min = 1))]
        seats: Vec<String>,
    }

    async fn hold(body: &str) -> Result<ValidatedJson<Hold>, BookingError> {
        let request = Request::builder()
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        ValidatedJson::<Hold>::from_request(request, &()).await
    }

    #[tokio::test]
    async fn body_errors_are_validation_errors() {
        let ValidatedJson(ok) = hold(r#"{"seats":["A-01"]}"#).await.unwrap();
        assert_eq!(ok.seats, vec!["A-01".to_string()]);

        assert!(matches!(hold(r#"{}"#).await, Err(BookingError::Validation(_))));
        assert!(matches!(hold(r#"{"seats": 3}"#).await, Err(BookingError::Validation(_))));
        assert!(matches!(hold("not json").await, Err(BookingError::Validation(_))));
        assert!(matches!(hold(r#"{"seats":[]}"#).await, Err(BookingError::Validation(_))));
    }

    async fn extract(request: Request<()>) -> Result<CallerId, StatusCode> {
        let (mut parts, _) = request.into_parts();
        CallerId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_header() {
        let request = Request::builder().header("X-User-Id", "user-7").body(()).unwrap();
        assert_eq!(extract(request).await, Ok(CallerId("user-7".into())));
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(extract(request).await, Err(StatusCode::UNAUTHORIZED));

        let request = Request::builder().header("X-User-Id", "  ").body(()).unwrap();
        assert_eq!(extract(request).await, Err(StatusCode::UNAUTHORIZED));
    }
}
