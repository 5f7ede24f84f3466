//! Storage protocol for the seat map and the booking ledger.
//!
//! Every coordinator operation runs inside one [`UnitOfWork`] obtained from a
//! [`Store`]. A unit of work is the only way to touch seats or bookings, and
//! it is the store (row locks in PostgreSQL, exclusive ownership in memory)
//! that serializes competing units of work. Dropping a unit of work without
//! calling [`UnitOfWork::commit`] discards every write it made.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{
    Booking, BookingDraft, BookingStatus, Payment, Seat, SeatId, SeatStatus, Showtime, TransitionExtra,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Attempts at finding an unused booking reference before giving up.
pub const MAX_REFERENCE_ATTEMPTS: usize = 5;

#[async_trait]
pub trait SeatMapStore: Send {
    async fn get_showtime(&mut self, show_id: Uuid, showtime_id: Uuid) -> Result<Option<Showtime>, BookingError>;

    /// available → selected for every seat, or for none. Fails with
    /// `SeatUnavailable` naming the first requested seat that is missing or
    /// not available. `seats` must not contain duplicates.
    async fn try_reserve(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<Vec<Seat>, BookingError>;

    /// selected → booked.
    async fn commit_booked(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<(), BookingError>;

    /// selected (or booked) → available. Already available seats are an error.
    async fn release(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<(), BookingError>;
}

#[async_trait]
pub trait BookingLedger: Send {
    async fn create(&mut self, draft: BookingDraft) -> Result<Booking, BookingError>;

    async fn get(&mut self, booking_id: Uuid) -> Result<Booking, BookingError>;

    /// Compare-and-swap on status: applies only while the booking is still
    /// `expected`.
    async fn transition(
        &mut self,
        booking_id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        extra: TransitionExtra,
    ) -> Result<Booking, BookingError>;

    /// Stores `payment` on the booking without touching its status.
    async fn attach_payment(
        &mut self,
        booking_id: Uuid,
        payment: Payment,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError>;

    async fn delete(&mut self, booking_id: Uuid) -> Result<(), BookingError>;

    /// Pending bookings whose deadline is at or before `now`, oldest first.
    async fn expired_pending(&mut self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Uuid>, BookingError>;
}

#[async_trait]
pub trait UnitOfWork: SeatMapStore + BookingLedger + Send {
    async fn commit(self: Box<Self>) -> Result<(), BookingError>;

    async fn rollback(self: Box<Self>) -> Result<(), BookingError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, BookingError>;
}

/// Seat status transitions the seat map supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeatTransition {
    Reserve,
    CommitBooked,
    Release,
}

impl SeatTransition {
    pub(crate) fn accepts(self, status: SeatStatus) -> bool {
        match self {
            SeatTransition::Reserve => status == SeatStatus::Available,
            SeatTransition::CommitBooked => status == SeatStatus::Selected,
            SeatTransition::Release => matches!(status, SeatStatus::Selected | SeatStatus::Booked),
        }
    }

    pub(crate) fn target(self) -> SeatStatus {
        match self {
            SeatTransition::Reserve => SeatStatus::Selected,
            SeatTransition::CommitBooked => SeatStatus::Booked,
            SeatTransition::Release => SeatStatus::Available,
        }
    }

    /// Change to the showtime's available counter for `count` seats.
    pub(crate) fn available_delta(self, count: usize) -> i64 {
        let count = count as i64;
        match self {
            SeatTransition::Reserve => -count,
            SeatTransition::CommitBooked => 0,
            SeatTransition::Release => count,
        }
    }

    /// Statuses as stored, for conditional updates.
    pub(crate) fn accepted_statuses(self) -> Vec<String> {
        [SeatStatus::Available, SeatStatus::Selected, SeatStatus::Booked]
            .into_iter()
            .filter(|s| self.accepts(*s))
            .map(|s| s.as_str().to_string())
            .collect()
    }
}

/// Checks every requested seat, in request order, before anything is written.
pub(crate) fn check_seats<F>(transition: SeatTransition, requested: &[SeatId], current: F) -> Result<(), BookingError>
where
    F: Fn(&SeatId) -> Option<SeatStatus>,
{
    for id in requested {
        match (transition, current(id)) {
            (_, Some(status)) if transition.accepts(status) => {}
            (SeatTransition::Reserve, _) => return Err(BookingError::SeatUnavailable(id.clone())),
            (_, Some(status)) => {
                return Err(BookingError::InvalidSeatState {
                    seat: id.clone(),
                    status,
                })
            }
            (_, None) => return Err(BookingError::NotFound(format!("seat {id}"))),
        }
    }
    Ok(())
}

/// `BMS` + last six digits of the creation time in epoch millis + the ledger
/// counter zero-padded to four digits.
pub fn booking_reference(created_at: DateTime<Utc>, counter: i64) -> String {
    let stamp = created_at.timestamp_millis().rem_euclid(1_000_000);
    format!("BMS{stamp:06}{counter:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_embeds_timestamp_and_counter() {
        let at = Utc.timestamp_millis_opt(1_760_000_123_456).unwrap();
        assert_eq!(booking_reference(at, 7), "BMS1234560007");
        assert_eq!(booking_reference(at, 12_345), "BMS12345612345");
    }

    #[test]
    fn reserve_reports_first_conflict_in_request_order() {
        let a = SeatId::new("A", "01");
        let b = SeatId::new("A", "02");
        let c = SeatId::new("A", "03");
        let result = check_seats(SeatTransition::Reserve, &[a.clone(), b.clone(), c.clone()], |id| {
            if *id == a {
                Some(SeatStatus::Available)
            } else {
                Some(SeatStatus::Booked)
            }
        });
        assert!(matches!(result, Err(BookingError::SeatUnavailable(seat)) if seat == b));
    }

    #[test]
    fn release_refuses_available_seats() {
        let a = SeatId::new("A", "01");
        let result = check_seats(SeatTransition::Release, &[a], |_| Some(SeatStatus::Available));
        assert!(matches!(
            result,
            Err(BookingError::InvalidSeatState { status: SeatStatus::Available, .. })
        ));
        assert_eq!(SeatTransition::Release.accepted_statuses(), vec!["selected", "booked"]);
    }
}
