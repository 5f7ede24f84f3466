use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::BookingError;
use crate::middleware::{ApiPath, CallerId, ValidatedJson};
use crate::models::{PaymentMethod, SeatMapView};
use crate::services::{ConfirmBooking, Confirmation, SelectSeats, SelectionReceipt};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows/{show_id}/showtimes/{showtime_id}/seats", get(get_seats))
        .route("/select", post(select_seats))
        .route("/confirm", post(confirm_booking))
        .route("/release", post(release_seats))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    pub show_id: Uuid,
    pub showtime_id: Uuid,
    #[validate(length(min = 1, message = "please select at least one seat"))]
    pub seat_numbers: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub booking_id: Uuid,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1, max = 128))]
    pub payment_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub ok: bool,
    pub message: &'static str,
}

// GET /api/shows/{show_id}/showtimes/{showtime_id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    ApiPath((show_id, showtime_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<SeatMapView>, BookingError> {
    let view = state.coordinator.get_seats(show_id, showtime_id).await?;
    Ok(Json(view))
}

// POST /api/select
async fn select_seats(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    ValidatedJson(req): ValidatedJson<SelectRequest>,
) -> Result<Json<SelectionReceipt>, BookingError> {
    let receipt = state
        .coordinator
        .select(SelectSeats {
            show_id: req.show_id,
            showtime_id: req.showtime_id,
            user_id,
            seat_numbers: req.seat_numbers,
        })
        .await?;
    Ok(Json(receipt))
}

// POST /api/confirm
async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    ValidatedJson(req): ValidatedJson<ConfirmRequest>,
) -> Result<Json<Confirmation>, BookingError> {
    let confirmation = state
        .coordinator
        .confirm(ConfirmBooking {
            booking_id: req.booking_id,
            user_id,
            payment_method: req.payment_method,
            payment_id: req.payment_id,
        })
        .await?;
    Ok(Json(confirmation))
}

// POST /api/release
async fn release_seats(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    ValidatedJson(req): ValidatedJson<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>, BookingError> {
    state.coordinator.release(req.booking_id, &user_id).await?;
    Ok(Json(ReleaseResponse {
        ok: true,
        message: "Seats released successfully",
    }))
}
