#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use showtime_booking::clock::ManualClock;
use showtime_booking::config::BookingSettings;
use showtime_booking::models::{Money, PaymentMethod, SeatLayout, Showtime};
use showtime_booking::services::{ConfirmBooking, ReservationCoordinator, SelectSeats};
use showtime_booking::store::{MemoryStore, Store};

pub const CAPACITY: u32 = 120;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap()
}

/// 10 rows × 12 seats; rows A and B premium, row J sofa.
pub fn showtime(base_price: Money) -> Showtime {
    let layout = SeatLayout::new(10, 12);
    Showtime {
        id: Uuid::new_v4(),
        show_id: Uuid::new_v4(),
        movie_title: "Interstellar".into(),
        theater_id: Uuid::new_v4(),
        theater_name: "PVR Orion Mall".into(),
        screen: "Audi 3".into(),
        date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
        time: "7:30 PM".into(),
        base_price,
        layout,
        available_seats: CAPACITY,
        seats: layout.generate_seats(&["A", "B"], &["J"]),
    }
}

pub fn fast_settings() -> BookingSettings {
    BookingSettings {
        conflict_backoff: Duration::from_millis(1),
        ..BookingSettings::default()
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub coordinator: Arc<ReservationCoordinator>,
    pub showtime: Showtime,
}

impl Harness {
    pub async fn new(base_price: Money) -> Self {
        Self::with(base_price, |c, _| c).await
    }

    /// Lets a test swap in a gateway or other collaborator. The closure also
    /// gets the harness clock.
    pub async fn with<F>(base_price: Money, customize: F) -> Self
    where
        F: FnOnce(ReservationCoordinator, Arc<ManualClock>) -> ReservationCoordinator,
    {
        let store = MemoryStore::new();
        let showtime = showtime(base_price);
        store.insert_showtime(showtime.clone()).await;

        let clock = Arc::new(ManualClock::new(start_time()));
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let coordinator = ReservationCoordinator::new(shared, fast_settings()).with_clock(clock.clone());
        let coordinator = Arc::new(customize(coordinator, clock.clone()));

        Self {
            store,
            clock,
            coordinator,
            showtime,
        }
    }

    pub fn select_request(&self, user: &str, seats: &[&str]) -> SelectSeats {
        SelectSeats {
            show_id: self.showtime.show_id,
            showtime_id: self.showtime.id,
            user_id: user.to_string(),
            seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn confirm_request(&self, booking_id: Uuid, user: &str, payment_id: &str) -> ConfirmBooking {
        ConfirmBooking {
            booking_id,
            user_id: user.to_string(),
            payment_method: PaymentMethod::CreditCard,
            payment_id: payment_id.to_string(),
        }
    }

    pub async fn current(&self) -> Showtime {
        self.store.showtime(self.showtime.id).await.unwrap()
    }
}
