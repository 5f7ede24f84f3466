//! Single-process store. A unit of work takes exclusive ownership of the
//! whole state and writes to a private copy, which replaces the shared state
//! on commit. Units of work are therefore fully serialized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    booking_reference, check_seats, BookingLedger, SeatMapStore, SeatTransition, Store, UnitOfWork,
    MAX_REFERENCE_ATTEMPTS,
};
use crate::error::BookingError;
use crate::models::{
    Booking, BookingDraft, BookingStatus, Payment, Seat, SeatId, SeatStatus, Showtime, TransitionExtra,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    showtimes: HashMap<Uuid, Showtime>,
    bookings: HashMap<Uuid, Booking>,
    // References held by bookings still in the ledger.
    references: HashSet<String>,
    reference_counter: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a showtime. The available counter is derived from
    /// the seat statuses.
    pub async fn insert_showtime(&self, mut showtime: Showtime) {
        showtime.available_seats = showtime.count_with_status(SeatStatus::Available);
        let mut state = self.state.lock().await;
        state.showtimes.insert(showtime.id, showtime);
    }

    pub async fn showtime(&self, showtime_id: Uuid) -> Option<Showtime> {
        self.state.lock().await.showtimes.get(&showtime_id).cloned()
    }

    pub async fn booking(&self, booking_id: Uuid) -> Option<Booking> {
        self.state.lock().await.bookings.get(&booking_id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, BookingError> {
        let committed = self.state.clone().lock_owned().await;
        let working = committed.clone();
        Ok(Box::new(MemoryUnitOfWork { committed, working }))
    }
}

struct MemoryUnitOfWork {
    committed: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryUnitOfWork {
    fn apply(
        &mut self,
        showtime_id: Uuid,
        seats: &[SeatId],
        transition: SeatTransition,
    ) -> Result<Vec<Seat>, BookingError> {
        let showtime = self
            .working
            .showtimes
            .get_mut(&showtime_id)
            .ok_or_else(|| BookingError::NotFound(format!("showtime {showtime_id}")))?;

        check_seats(transition, seats, |id| showtime.seat(id).map(|s| s.status))?;

        let mut touched = Vec::with_capacity(seats.len());
        for id in seats {
            if let Some(seat) = showtime.seat_mut(id) {
                seat.status = transition.target();
                touched.push(seat.clone());
            }
        }

        let available = i64::from(showtime.available_seats) + transition.available_delta(seats.len());
        showtime.available_seats = u32::try_from(available)
            .map_err(|_| BookingError::Internal(format!("available seat counter of {showtime_id} out of range")))?;

        Ok(touched)
    }
}

#[async_trait]
impl SeatMapStore for MemoryUnitOfWork {
    async fn get_showtime(&mut self, show_id: Uuid, showtime_id: Uuid) -> Result<Option<Showtime>, BookingError> {
        Ok(self
            .working
            .showtimes
            .get(&showtime_id)
            .filter(|s| s.show_id == show_id)
            .cloned())
    }

    async fn try_reserve(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<Vec<Seat>, BookingError> {
        self.apply(showtime_id, seats, SeatTransition::Reserve)
    }

    async fn commit_booked(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<(), BookingError> {
        self.apply(showtime_id, seats, SeatTransition::CommitBooked).map(|_| ())
    }

    async fn release(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<(), BookingError> {
        self.apply(showtime_id, seats, SeatTransition::Release).map(|_| ())
    }
}

#[async_trait]
impl BookingLedger for MemoryUnitOfWork {
    async fn create(&mut self, draft: BookingDraft) -> Result<Booking, BookingError> {
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            self.working.reference_counter += 1;
            let reference = booking_reference(draft.created_at, self.working.reference_counter);
            if self.working.references.insert(reference.clone()) {
                let booking = draft.into_booking(Uuid::new_v4(), reference);
                self.working.bookings.insert(booking.id, booking.clone());
                return Ok(booking);
            }
        }
        Err(BookingError::Internal("could not allocate a unique booking reference".into()))
    }

    async fn get(&mut self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.working
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::booking_not_found(booking_id))
    }

    async fn transition(
        &mut self,
        booking_id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        extra: TransitionExtra,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .working
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;

        if booking.status != expected {
            return Err(BookingError::InvalidStateTransition {
                booking_id,
                expected,
                actual: booking.status,
            });
        }

        booking.status = next;
        if let Some(payment) = extra.payment {
            booking.payment = payment;
        }
        booking.updated_at = extra.at;
        Ok(booking.clone())
    }

    async fn attach_payment(
        &mut self,
        booking_id: Uuid,
        payment: Payment,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .working
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;
        booking.payment = payment;
        booking.updated_at = at;
        Ok(booking.clone())
    }

    async fn delete(&mut self, booking_id: Uuid) -> Result<(), BookingError> {
        let booking = self
            .working
            .bookings
            .remove(&booking_id)
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;
        self.working.references.remove(&booking.booking_reference);
        Ok(())
    }

    async fn expired_pending(&mut self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Uuid>, BookingError> {
        let mut expired: Vec<&Booking> = self
            .working
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.expires_at <= now)
            .collect();
        expired.sort_by_key(|b| b.expires_at);
        Ok(expired.into_iter().take(limit as usize).map(|b| b.id).collect())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), BookingError> {
        let MemoryUnitOfWork { mut committed, working } = *self;
        *committed = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BookingError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Money, PaymentMethod, PaymentStatus, SeatLayout};
    use chrono::NaiveDate;

    fn showtime() -> Showtime {
        let layout = SeatLayout::new(2, 3);
        Showtime {
            id: Uuid::new_v4(),
            show_id: Uuid::new_v4(),
            movie_title: "Dune".into(),
            theater_id: Uuid::new_v4(),
            theater_name: "Orion".into(),
            screen: "Screen 1".into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            time: "7:00 PM".into(),
            base_price: Money::from_major(150),
            layout,
            available_seats: 0,
            seats: layout.generate_seats(&[], &[]),
        }
    }

    fn draft(st: &Showtime) -> BookingDraft {
        let now = Utc::now();
        BookingDraft {
            user_id: "u1".into(),
            show_id: st.show_id,
            showtime_id: st.id,
            theater_id: st.theater_id,
            movie_title: st.movie_title.clone(),
            theater_name: st.theater_name.clone(),
            screen: st.screen.clone(),
            show_date: st.date,
            show_time: st.time.clone(),
            seats: Vec::new(),
            subtotal: Money::from_major(150),
            convenience_fee: Money::from_major(15),
            total_amount: Money::from_major(165),
            expires_at: now + chrono::Duration::minutes(10),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn attach_payment_keeps_status() {
        let store = MemoryStore::new();
        let st = showtime();
        store.insert_showtime(st.clone()).await;

        let mut uow = store.begin().await.unwrap();
        let booking = uow.create(draft(&st)).await.unwrap();
        let payment = Payment {
            method: Some(PaymentMethod::Upi),
            transaction_id: Some("txn_42".into()),
            status: PaymentStatus::Refunded,
            amount: Some(booking.total_amount),
            paid_at: Some(booking.created_at),
        };
        let updated = uow
            .attach_payment(booking.id, payment.clone(), booking.created_at)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(updated.status, BookingStatus::Pending);
        assert_eq!(store.booking(booking.id).await.unwrap().payment, payment);
    }

    #[tokio::test]
    async fn deleted_bookings_free_their_reference() {
        let store = MemoryStore::new();
        let st = showtime();
        store.insert_showtime(st.clone()).await;

        let mut uow = store.begin().await.unwrap();
        let kept = uow.create(draft(&st)).await.unwrap();
        let dropped = uow.create(draft(&st)).await.unwrap();
        uow.delete(dropped.id).await.unwrap();
        uow.commit().await.unwrap();

        let state = store.state.lock().await;
        assert_eq!(state.references.len(), 1);
        assert!(state.references.contains(&kept.booking_reference));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_no_trace() {
        let store = MemoryStore::new();
        let st = showtime();
        store.insert_showtime(st.clone()).await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.try_reserve(st.id, &[SeatId::new("A", "01")]).await.unwrap();
        }

        let after = store.showtime(st.id).await.unwrap();
        assert_eq!(after.available_seats, 6);
        assert_eq!(after.count_with_status(SeatStatus::Selected), 0);
    }

    #[tokio::test]
    async fn reserve_is_all_or_nothing() {
        let store = MemoryStore::new();
        let st = showtime();
        store.insert_showtime(st.clone()).await;

        let mut uow = store.begin().await.unwrap();
        uow.try_reserve(st.id, &[SeatId::new("B", "02")]).await.unwrap();
        let err = uow
            .try_reserve(st.id, &[SeatId::new("A", "01"), SeatId::new("B", "02")])
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SeatUnavailable(ref s) if *s == SeatId::new("B", "02")));
        uow.commit().await.unwrap();

        let after = store.showtime(st.id).await.unwrap();
        assert_eq!(after.seat(&SeatId::new("A", "01")).unwrap().status, SeatStatus::Available);
        assert_eq!(after.available_seats, 5);
    }
}
