mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use common::{Harness, CAPACITY};
use showtime_booking::config::Config;
use showtime_booking::models::Money;
use showtime_booking::{app, AppState};

fn memory_config() -> Config {
    let env: HashMap<String, String> = [("STORE_BACKEND".to_string(), "memory".to_string())].into();
    Config::load(config::Environment::default().source(Some(env))).unwrap()
}

async fn router() -> (Harness, Router) {
    let h = Harness::new(Money::from_major(150)).await;
    let state = AppState::new(h.coordinator.clone(), memory_config());
    let router = app(Arc::new(state));
    (h, router)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn select_body(h: &Harness, seats: &[&str]) -> Value {
    json!({
        "showId": h.showtime.show_id,
        "showtimeId": h.showtime.id,
        "seatNumbers": seats,
    })
}

#[tokio::test]
async fn health_is_ok() {
    let (_h, router) = router().await;
    let (status, _) = send(&router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, get("/health/ready", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn seat_map_lists_every_row() {
    let (h, router) = router().await;
    let uri = format!("/api/shows/{}/showtimes/{}/seats", h.showtime.show_id, h.showtime.id);

    let (status, body) = send(&router, get(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["availableSeats"], CAPACITY);
    assert_eq!(body["showTitle"], "Interstellar");
    assert_eq!(body["seatLayout"]["gapAfterRow"], 2);
    assert_eq!(body["seats"]["A"][0]["type"], "premium");
    assert_eq!(body["seats"]["A"][0]["number"], "01");
    assert_eq!(body["seats"]["J"][11]["type"], "sofa");

    let missing = format!("/api/shows/{}/showtimes/{}/seats", uuid::Uuid::new_v4(), h.showtime.id);
    let (status, body) = send(&router, get(&missing, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn select_requires_caller_identity() {
    let (h, router) = router().await;
    let (status, _) = send(&router, post("/api/select", None, select_body(&h, &["A-01"]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_flow_over_http() {
    let (h, router) = router().await;

    let (status, receipt) = send(
        &router,
        post("/api/select", Some("user-1"), select_body(&h, &["E-01", "E-02"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["subtotal"], 300);
    assert_eq!(receipt["convenienceFee"], 30);
    assert_eq!(receipt["totalAmount"], 330);
    let booking_id = receipt["bookingId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &router,
        post("/api/select", Some("user-2"), select_body(&h, &["E-02"])),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "seat_unavailable");

    let (status, confirmation) = send(
        &router,
        post(
            "/api/confirm",
            Some("user-1"),
            json!({ "bookingId": booking_id, "paymentMethod": "upi", "paymentId": "pay_1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmation["seats"], "E01, E02");
    assert_eq!(confirmation["reference"], receipt["reference"]);

    let (status, booking) = send(&router, get(&format!("/api/bookings/{booking_id}"), Some("user-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "confirmed");
    assert_eq!(booking["payment"]["method"], "upi");

    let (status, _) = send(&router, get(&format!("/api/bookings/{booking_id}"), Some("user-2"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &router,
        post("/api/release", Some("user-1"), json!({ "bookingId": booking_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state_transition");
}

#[tokio::test]
async fn release_over_http() {
    let (h, router) = router().await;
    let (_, receipt) = send(
        &router,
        post("/api/select", Some("user-1"), select_body(&h, &["D-01"])),
    )
    .await;
    let booking_id = receipt["bookingId"].clone();

    let (status, body) = send(
        &router,
        post("/api/release", Some("user-1"), json!({ "bookingId": booking_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = send(
        &router,
        post("/api/release", Some("user-1"), json!({ "bookingId": booking_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn expired_hold_is_gone() {
    let (h, router) = router().await;
    let (_, receipt) = send(
        &router,
        post("/api/select", Some("user-1"), select_body(&h, &["D-02"])),
    )
    .await;
    h.clock.advance(chrono::Duration::minutes(10));

    let (status, body) = send(
        &router,
        post(
            "/api/confirm",
            Some("user-1"),
            json!({ "bookingId": receipt["bookingId"], "paymentMethod": "wallet", "paymentId": "pay_1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "expired_reservation");
}

#[tokio::test]
async fn empty_selection_is_a_bad_request() {
    let (h, router) = router().await;
    let (status, body) = send(&router, post("/api/select", Some("user-1"), select_body(&h, &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let (h, router) = router().await;

    let bodies = [
        json!({ "showId": h.showtime.show_id, "showtimeId": h.showtime.id }),
        json!({ "showId": "not-a-uuid", "showtimeId": h.showtime.id, "seatNumbers": ["A-01"] }),
    ];
    for body in bodies {
        let (status, body) = send(&router, post("/api/select", Some("user-1"), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    let (status, body) = send(
        &router,
        post(
            "/api/confirm",
            Some("user-1"),
            json!({ "bookingId": uuid::Uuid::new_v4(), "paymentMethod": "cash", "paymentId": "pay_1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = send(&router, get("/api/bookings/12", Some("user-1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn seat_map_prices_are_major_units() {
    let (h, router) = router().await;
    let uri = format!("/api/shows/{}/showtimes/{}/seats", h.showtime.show_id, h.showtime.id);
    let (_, body) = send(&router, get(&uri, None)).await;
    assert_eq!(body["price"], 150);
}
