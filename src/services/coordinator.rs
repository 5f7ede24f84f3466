//! Booking lifecycle: `NONE → PENDING → {CONFIRMED | RELEASED | EXPIRED}`.
//!
//! Each operation is a single unit of work against the [`Store`]; every
//! check that decides whether a mutation is legal is made again inside the
//! unit of work that performs it, never only on an earlier read.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheService, SeatMapLookup};
use crate::clock::{Clock, SystemClock};
use crate::config::BookingSettings;
use crate::error::BookingError;
use crate::models::{
    BookedSeat, Booking, BookingDraft, BookingStatus, Money, Payment, PaymentMethod, PaymentStatus, SeatId,
    SeatMapView, TransitionExtra,
};
use crate::services::payment::{PassthroughGateway, PaymentDecision, PaymentGateway, PaymentRequest};
use crate::services::pricing;
use crate::store::{BookingLedger, SeatMapStore, Store, UnitOfWork};

const QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

#[derive(Debug, Clone)]
pub struct SelectSeats {
    pub show_id: Uuid,
    pub showtime_id: Uuid,
    pub user_id: String,
    /// `"{row}-{number}"`, e.g. `"A-03"`.
    pub seat_numbers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmBooking {
    pub booking_id: Uuid,
    pub user_id: String,
    pub payment_method: PaymentMethod,
    pub payment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReceipt {
    pub booking_id: Uuid,
    pub reference: String,
    pub subtotal: Money,
    pub convenience_fee: Money,
    pub total_amount: Money,
    pub expires_at: DateTime<Utc>,
}

impl From<&Booking> for SelectionReceipt {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            reference: booking.booking_reference.clone(),
            subtotal: booking.subtotal,
            convenience_fee: booking.convenience_fee,
            total_amount: booking.total_amount,
            expires_at: booking.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub booking_id: Uuid,
    pub reference: String,
    pub movie: String,
    pub theater: String,
    pub screen: String,
    pub date: NaiveDate,
    pub time: String,
    pub seats: String,
    pub total_amount: Money,
    pub qr_payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    Expired { showtime_id: Uuid },
    /// Confirmed, released or not yet due by the time the unit of work ran.
    Skipped,
}

pub struct ReservationCoordinator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    cache: Option<CacheService>,
    settings: BookingSettings,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn Store>, settings: BookingSettings) -> Self {
        Self {
            store,
            gateway: Arc::new(PassthroughGateway),
            clock: Arc::new(SystemClock),
            cache: None,
            settings,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Seat map for one showtime, served from the cache when it holds a
    /// current one.
    pub async fn get_seats(&self, show_id: Uuid, showtime_id: Uuid) -> Result<SeatMapView, BookingError> {
        let mut generation = None;
        if let Some(cache) = &self.cache {
            match cache.get_seat_map(showtime_id).await {
                SeatMapLookup::Hit(view) if view.show_id == show_id => return Ok(view),
                SeatMapLookup::Hit(_) => {}
                SeatMapLookup::Miss { generation: current } => generation = current,
            }
        }

        let mut uow = self.store.begin().await?;
        let showtime = uow
            .get_showtime(show_id, showtime_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("showtime {showtime_id}")))?;
        uow.rollback().await?;

        let view = SeatMapView::from(showtime);
        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            cache.put_seat_map(&view, generation).await;
        }
        Ok(view)
    }

    /// Holds the requested seats and opens a pending booking with frozen
    /// prices.
    pub async fn select(&self, request: SelectSeats) -> Result<SelectionReceipt, BookingError> {
        let seat_ids = parse_seat_ids(&request.seat_numbers)?;

        let booking = self
            .with_retry("select", || self.select_once(&request, &seat_ids))
            .await?;

        self.invalidate(booking.showtime_id).await;
        info!(
            booking_id = %booking.id,
            reference = %booking.booking_reference,
            showtime_id = %booking.showtime_id,
            seats = %booking.seat_labels(),
            total = %booking.total_amount,
            "Seats held"
        );
        Ok(SelectionReceipt::from(&booking))
    }

    async fn select_once(&self, request: &SelectSeats, seat_ids: &[SeatId]) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let showtime = uow
            .get_showtime(request.show_id, request.showtime_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("showtime {}", request.showtime_id)))?;

        let seats = uow.try_reserve(showtime.id, seat_ids).await?;
        let quote = pricing::quote(showtime.base_price, seats.iter().map(|s| s.seat_type));

        let booked: Vec<BookedSeat> = seats
            .into_iter()
            .zip(quote.seat_prices.iter().copied())
            .map(|(seat, price)| BookedSeat {
                number: seat.number,
                row: seat.row,
                seat_type: seat.seat_type,
                price,
            })
            .collect();

        let draft = BookingDraft {
            user_id: request.user_id.clone(),
            show_id: showtime.show_id,
            showtime_id: showtime.id,
            theater_id: showtime.theater_id,
            movie_title: showtime.movie_title,
            theater_name: showtime.theater_name,
            screen: showtime.screen,
            show_date: showtime.date,
            show_time: showtime.time,
            seats: booked,
            subtotal: quote.subtotal,
            convenience_fee: quote.convenience_fee,
            total_amount: quote.total,
            expires_at: now + self.settings.hold_duration,
            created_at: now,
        };

        let booking = uow.create(draft).await?;
        uow.commit().await?;
        Ok(booking)
    }

    /// Authorizes payment, then turns a live hold into a confirmed booking.
    pub async fn confirm(&self, request: ConfirmBooking) -> Result<Confirmation, BookingError> {
        let booking = self.load_owned(request.booking_id, &request.user_id).await?;
        ensure_confirmable(&booking, self.clock.now())?;

        let payment_request = PaymentRequest {
            booking_id: booking.id,
            booking_reference: booking.booking_reference.clone(),
            amount: booking.total_amount,
            method: request.payment_method,
            payment_id: request.payment_id.clone(),
        };
        let transaction_id = match self.gateway.authorize(&payment_request).await? {
            PaymentDecision::Approved { transaction_id } => transaction_id,
            PaymentDecision::Declined { reason } => {
                warn!(booking_id = %booking.id, %reason, "Payment declined, booking left pending");
                return Err(BookingError::PaymentDeclined(reason));
            }
        };

        let confirmed = match self
            .with_retry("confirm", || self.confirm_once(&request, &transaction_id))
            .await
        {
            Ok(booking) => booking,
            Err(e) => {
                error!(
                    booking_id = %request.booking_id,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Payment approved but booking could not be confirmed"
                );
                self.record_unapplied_payment(&request, &transaction_id).await;
                return Err(e);
            }
        };

        self.invalidate(confirmed.showtime_id).await;
        info!(
            booking_id = %confirmed.id,
            reference = %confirmed.booking_reference,
            transaction_id = %transaction_id,
            "Booking confirmed"
        );
        confirmation(&confirmed)
    }

    async fn confirm_once(&self, request: &ConfirmBooking, transaction_id: &str) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let booking = owned(uow.get(request.booking_id).await?, &request.user_id)?;
        ensure_confirmable(&booking, now)?;

        uow.commit_booked(booking.showtime_id, &booking.seat_ids()).await?;

        let payment = Payment {
            method: Some(request.payment_method),
            transaction_id: Some(transaction_id.to_string()),
            status: PaymentStatus::Completed,
            amount: Some(booking.total_amount),
            paid_at: Some(now),
        };
        let confirmed = uow
            .transition(
                booking.id,
                BookingStatus::Pending,
                BookingStatus::Confirmed,
                TransitionExtra::at(now).with_payment(payment),
            )
            .await?;

        uow.commit().await?;
        Ok(confirmed)
    }

    /// Keeps an approved payment that never confirmed the booking on the
    /// booking itself, marked refunded, so the charge can be reconciled. A
    /// hold that lapsed while the gateway was deciding is expired in the same
    /// unit of work.
    async fn record_unapplied_payment(&self, request: &ConfirmBooking, transaction_id: &str) {
        match self
            .with_retry("record_payment", || self.record_payment_once(request, transaction_id))
            .await
        {
            Ok(expired) => {
                if let Some(showtime_id) = expired {
                    self.invalidate(showtime_id).await;
                }
                warn!(
                    booking_id = %request.booking_id,
                    transaction_id = %transaction_id,
                    hold_expired = expired.is_some(),
                    "Approved payment recorded for refund"
                );
            }
            Err(e) => error!(
                booking_id = %request.booking_id,
                transaction_id = %transaction_id,
                error = %e,
                "Approved payment could not be recorded"
            ),
        }
    }

    // Returns the showtime whose seats went back to the pool when the hold
    // was expired here.
    async fn record_payment_once(
        &self,
        request: &ConfirmBooking,
        transaction_id: &str,
    ) -> Result<Option<Uuid>, BookingError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let booking = owned(uow.get(request.booking_id).await?, &request.user_id)?;
        if booking.status == BookingStatus::Confirmed {
            // Another confirm won; this charge is a duplicate and the booking
            // keeps the payment that confirmed it.
            return Err(BookingError::InvalidStateTransition {
                booking_id: booking.id,
                expected: BookingStatus::Pending,
                actual: booking.status,
            });
        }

        let payment = Payment {
            method: Some(request.payment_method),
            transaction_id: Some(transaction_id.to_string()),
            status: PaymentStatus::Refunded,
            amount: Some(booking.total_amount),
            paid_at: Some(now),
        };

        let expired = if booking.status == BookingStatus::Pending && now >= booking.expires_at {
            uow.transition(
                booking.id,
                BookingStatus::Pending,
                BookingStatus::Expired,
                TransitionExtra::at(now).with_payment(payment),
            )
            .await?;
            release_held_seats(uow.as_mut(), &booking).await?;
            Some(booking.showtime_id)
        } else {
            uow.attach_payment(booking.id, payment, now).await?;
            None
        };

        uow.commit().await?;
        Ok(expired)
    }

    /// Gives the seats of a pending booking back and deletes the booking.
    pub async fn release(&self, booking_id: Uuid, user_id: &str) -> Result<(), BookingError> {
        let showtime_id = self
            .with_retry("release", || self.release_once(booking_id, user_id))
            .await?;

        self.invalidate(showtime_id).await;
        info!(%booking_id, %showtime_id, "Booking released");
        Ok(())
    }

    async fn release_once(&self, booking_id: Uuid, user_id: &str) -> Result<Uuid, BookingError> {
        let mut uow = self.store.begin().await?;

        let booking = owned(uow.get(booking_id).await?, user_id)?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidStateTransition {
                booking_id,
                expected: BookingStatus::Pending,
                actual: booking.status,
            });
        }

        uow.release(booking.showtime_id, &booking.seat_ids()).await?;
        uow.delete(booking_id).await?;
        uow.commit().await?;
        Ok(booking.showtime_id)
    }

    /// Expires one booking if it is still pending and past its deadline.
    /// Losing a race against confirm or release is a skip, not an error.
    pub async fn expire(&self, booking_id: Uuid) -> Result<ExpireOutcome, BookingError> {
        let outcome = self.with_retry("expire", || self.expire_once(booking_id)).await?;

        if let ExpireOutcome::Expired { showtime_id } = outcome {
            self.invalidate(showtime_id).await;
            info!(%booking_id, %showtime_id, "Hold expired, seats returned");
        }
        Ok(outcome)
    }

    async fn expire_once(&self, booking_id: Uuid) -> Result<ExpireOutcome, BookingError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let booking = match uow.get(booking_id).await {
            Ok(booking) => booking,
            Err(BookingError::NotFound(_)) => {
                debug!(%booking_id, "Booking gone before expiry");
                return Ok(ExpireOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        if booking.status != BookingStatus::Pending || now < booking.expires_at {
            debug!(%booking_id, status = %booking.status, "Booking no longer due for expiry");
            uow.rollback().await?;
            return Ok(ExpireOutcome::Skipped);
        }

        uow.transition(
            booking_id,
            BookingStatus::Pending,
            BookingStatus::Expired,
            TransitionExtra::at(now),
        )
        .await?;
        release_held_seats(uow.as_mut(), &booking).await?;
        uow.commit().await?;

        Ok(ExpireOutcome::Expired {
            showtime_id: booking.showtime_id,
        })
    }

    /// Pending bookings already past their deadline, oldest first.
    pub async fn expired_pending(&self, limit: u32) -> Result<Vec<Uuid>, BookingError> {
        let mut uow = self.store.begin().await?;
        let ids = uow.expired_pending(self.clock.now(), limit).await?;
        uow.rollback().await?;
        Ok(ids)
    }

    pub async fn get_booking(&self, booking_id: Uuid, user_id: &str) -> Result<Booking, BookingError> {
        self.load_owned(booking_id, user_id).await
    }

    async fn load_owned(&self, booking_id: Uuid, user_id: &str) -> Result<Booking, BookingError> {
        let mut uow = self.store.begin().await?;
        let booking = uow.get(booking_id).await?;
        uow.rollback().await?;
        owned(booking, user_id)
    }

    async fn invalidate(&self, showtime_id: Uuid) {
        if let Some(cache) = &self.cache {
            cache.invalidate_seat_map(showtime_id).await;
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, BookingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.settings.max_conflict_retries => {
                    retries += 1;
                    warn!(operation, retries, "Storage conflict, retrying");
                    tokio::time::sleep(self.settings.conflict_backoff * retries).await;
                }
                result => return result,
            }
        }
    }
}

/// Parses `"{row}-{number}"` ids, rejecting empty lists and duplicates.
pub fn parse_seat_ids(seat_numbers: &[String]) -> Result<Vec<SeatId>, BookingError> {
    if seat_numbers.is_empty() {
        return Err(BookingError::Validation("at least one seat must be selected".into()));
    }

    let mut ids: Vec<SeatId> = Vec::with_capacity(seat_numbers.len());
    for raw in seat_numbers {
        let id: SeatId = raw.parse()?;
        if ids.contains(&id) {
            return Err(BookingError::Validation(format!("seat {id} requested more than once")));
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Returns the seats of an expiring booking to the pool. When the seat map
/// refuses the whole batch, seats are released one at a time and the ones it
/// does not hold for this booking are logged and left alone, so a drifted
/// seat cannot keep the booking pending.
async fn release_held_seats(uow: &mut dyn UnitOfWork, booking: &Booking) -> Result<(), BookingError> {
    let seat_ids = booking.seat_ids();
    match uow.release(booking.showtime_id, &seat_ids).await {
        Err(BookingError::InvalidSeatState { .. } | BookingError::NotFound(_)) => {}
        other => return other,
    }

    for seat in &seat_ids {
        match uow.release(booking.showtime_id, std::slice::from_ref(seat)).await {
            Ok(()) => {}
            Err(e @ (BookingError::InvalidSeatState { .. } | BookingError::NotFound(_))) => error!(
                booking_id = %booking.id,
                showtime_id = %booking.showtime_id,
                seat = %seat,
                error = %e,
                "Seat map does not hold this seat for the booking, leaving it as is"
            ),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// Bookings of other users are reported as missing.
fn owned(booking: Booking, user_id: &str) -> Result<Booking, BookingError> {
    if booking.user_id == user_id {
        Ok(booking)
    } else {
        Err(BookingError::booking_not_found(booking.id))
    }
}

fn ensure_confirmable(booking: &Booking, now: DateTime<Utc>) -> Result<(), BookingError> {
    if booking.is_hold_live(now) {
        Ok(())
    } else {
        Err(BookingError::ExpiredReservation(booking.id))
    }
}

fn confirmation(booking: &Booking) -> Result<Confirmation, BookingError> {
    let query = serde_urlencoded::to_string([("size", "200x200"), ("data", booking.booking_reference.as_str())])
        .map_err(|e| BookingError::Internal(format!("qr payload: {e}")))?;

    Ok(Confirmation {
        booking_id: booking.id,
        reference: booking.booking_reference.clone(),
        movie: booking.movie_title.clone(),
        theater: booking.theater_name.clone(),
        screen: booking.screen.clone(),
        date: booking.show_date,
        time: booking.show_time.clone(),
        seats: booking.seat_labels(),
        total_amount: booking.total_amount,
        qr_payload: format!("{QR_ENDPOINT}?{query}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn seat_ids_must_be_present_and_distinct() {
        assert!(matches!(parse_seat_ids(&[]), Err(BookingError::Validation(_))));
        assert!(matches!(
            parse_seat_ids(&strings(&["A-01", "A-01"])),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(parse_seat_ids(&strings(&["A01"])), Err(BookingError::Validation(_))));
        assert_eq!(
            parse_seat_ids(&strings(&["A-01", "B-02"])).unwrap(),
            vec![SeatId::new("A", "01"), SeatId::new("B", "02")]
        );
    }
}
