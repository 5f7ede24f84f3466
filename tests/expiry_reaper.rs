mod common;

use chrono::Duration;

use common::{Harness, CAPACITY};
use showtime_booking::config::ReaperConfig;
use showtime_booking::error::BookingError;
use showtime_booking::models::{BookingStatus, Money, SeatId, SeatStatus};
use showtime_booking::services::{ExpireOutcome, ExpiryReaper, SweepReport};

fn reaper(h: &Harness) -> ExpiryReaper {
    ExpiryReaper::new(h.coordinator.clone(), ReaperConfig::default())
}

#[tokio::test]
async fn sweep_expires_stale_holds_once() {
    let h = Harness::new(Money::from_major(150)).await;
    let receipt = h
        .coordinator
        .select(h.select_request("user-1", &["B-01", "B-02"]))
        .await
        .unwrap();
    assert_eq!(h.current().await.available_seats, CAPACITY - 2);

    h.clock.advance(Duration::minutes(10) + Duration::seconds(1));
    let report = reaper(&h).sweep().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            expired: 1,
            skipped: 0,
            failed: 0
        }
    );

    let after = h.current().await;
    assert_eq!(after.available_seats, CAPACITY);
    assert_eq!(after.seat(&SeatId::new("B", "01")).unwrap().status, SeatStatus::Available);
    let booking = h.store.booking(receipt.booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Expired);

    let second = reaper(&h).sweep().await.unwrap();
    assert_eq!(second, SweepReport::default());
    assert_eq!(h.current().await.available_seats, CAPACITY);
}

#[tokio::test]
async fn sweep_leaves_live_and_confirmed_bookings_alone() {
    let h = Harness::new(Money::from_major(150)).await;
    let confirmed = h
        .coordinator
        .select(h.select_request("user-1", &["C-01"]))
        .await
        .unwrap();
    h.coordinator
        .confirm(h.confirm_request(confirmed.booking_id, "user-1", "pay_1"))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(5));
    let live = h
        .coordinator
        .select(h.select_request("user-2", &["C-02"]))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(6));
    let report = reaper(&h).sweep().await.unwrap();
    assert_eq!(report, SweepReport::default());

    assert_eq!(
        h.coordinator.expire(confirmed.booking_id).await.unwrap(),
        ExpireOutcome::Skipped
    );
    assert_eq!(h.coordinator.expire(live.booking_id).await.unwrap(), ExpireOutcome::Skipped);

    let after = h.current().await;
    assert_eq!(after.seat(&SeatId::new("C", "01")).unwrap().status, SeatStatus::Booked);
    assert_eq!(after.seat(&SeatId::new("C", "02")).unwrap().status, SeatStatus::Selected);
    assert_eq!(after.available_seats, CAPACITY - 2);
}

#[tokio::test]
async fn expired_booking_can_no_longer_be_confirmed_or_released() {
    let h = Harness::new(Money::from_major(150)).await;
    let receipt = h
        .coordinator
        .select(h.select_request("user-1", &["G-09"]))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(15));
    reaper(&h).sweep().await.unwrap();

    let err = h
        .coordinator
        .confirm(h.confirm_request(receipt.booking_id, "user-1", "pay_1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::ExpiredReservation(_)));

    let err = h.coordinator.release(receipt.booking_id, "user-1").await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidStateTransition {
            actual: BookingStatus::Expired,
            ..
        }
    ));

    // the seat can be held again by someone else
    h.coordinator
        .select(h.select_request("user-2", &["G-09"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn sweep_respects_batch_size() {
    let h = Harness::new(Money::from_major(150)).await;
    for n in 1..=5 {
        let seat = format!("H-{n:02}");
        h.coordinator
            .select(h.select_request("user-1", &[seat.as_str()]))
            .await
            .unwrap();
    }
    h.clock.advance(Duration::minutes(10));

    let small = ExpiryReaper::new(
        h.coordinator.clone(),
        ReaperConfig {
            batch_size: 2,
            concurrency: 2,
            ..ReaperConfig::default()
        },
    );
    assert_eq!(small.sweep().await.unwrap().expired, 2);
    assert_eq!(small.sweep().await.unwrap().expired, 2);
    assert_eq!(small.sweep().await.unwrap().expired, 1);
    assert_eq!(small.sweep().await.unwrap(), SweepReport::default());
    assert_eq!(h.current().await.available_seats, CAPACITY);
}

#[tokio::test]
async fn unknown_booking_expiry_is_a_skip() {
    let h = Harness::new(Money::from_major(150)).await;
    assert_eq!(
        h.coordinator.expire(uuid::Uuid::new_v4()).await.unwrap(),
        ExpireOutcome::Skipped
    );
}

#[tokio::test]
async fn drifted_seat_does_not_keep_a_hold_pending() {
    let h = Harness::new(Money::from_major(150)).await;
    let receipt = h
        .coordinator
        .select(h.select_request("user-1", &["F-01", "F-02"]))
        .await
        .unwrap();

    // F-02 went back to the pool behind the ledger's back
    let mut drifted = h.current().await;
    drifted.seat_mut(&SeatId::new("F", "02")).unwrap().status = SeatStatus::Available;
    h.store.insert_showtime(drifted).await;
    assert_eq!(h.current().await.available_seats, CAPACITY - 1);

    h.clock.advance(Duration::minutes(11));
    let report = reaper(&h).sweep().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);

    let booking = h.store.booking(receipt.booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Expired);
    let after = h.current().await;
    assert_eq!(after.seat(&SeatId::new("F", "01")).unwrap().status, SeatStatus::Available);
    assert_eq!(after.seat(&SeatId::new("F", "02")).unwrap().status, SeatStatus::Available);
    assert_eq!(after.available_seats, CAPACITY);

    assert_eq!(reaper(&h).sweep().await.unwrap(), SweepReport::default());
}
