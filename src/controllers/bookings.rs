use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BookingError;
use crate::middleware::{ApiPath, CallerId};
use crate::models::Booking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/bookings/{booking_id}", get(get_booking))
}

// GET /api/bookings/{booking_id}; other users' bookings are 404.
async fn get_booking(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<Booking>, BookingError> {
    let booking = state.coordinator.get_booking(booking_id, &user_id).await?;
    Ok(Json(booking))
}
