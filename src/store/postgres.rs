//! PostgreSQL store. Seats live in their own table keyed by
//! `(showtime_id, row_label, number)`; a unit of work is a database
//! transaction. Seat rows are locked with `SELECT … FOR UPDATE` in
//! `(row_label, number)` order before any status is written, and bookings are
//! locked when read, so competing units of work queue on the rows they share.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{types::Json, FromRow, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    booking_reference, check_seats, BookingLedger, SeatMapStore, SeatTransition, Store, UnitOfWork,
    MAX_REFERENCE_ATTEMPTS,
};
use crate::database::Database;
use crate::error::BookingError;
use crate::models::{
    BookedSeat, Booking, BookingDraft, BookingStatus, Money, Payment, Seat, SeatId, SeatLayout, SeatStatus,
    Showtime, TransitionExtra,
};

const BOOKING_COLUMNS: &str = "id, user_id, show_id, showtime_id, theater_id, movie_title, theater_name, \
     screen, show_date, show_time, seats, subtotal, convenience_fee, total_amount, status, payment, \
     booking_reference, expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Loads a showtime and its seat map. Catalog tooling owns showtimes;
    /// this exists for provisioning and tests.
    pub async fn insert_showtime(&self, showtime: &Showtime) -> Result<(), BookingError> {
        let mut tx = self.db.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO showtimes (id, show_id, movie_title, theater_id, theater_name, screen,
                                   show_date, show_time, base_price, layout_rows, layout_cols,
                                   gap_after_row, gap_after_col, available_seats)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(showtime.id)
        .bind(showtime.show_id)
        .bind(&showtime.movie_title)
        .bind(showtime.theater_id)
        .bind(&showtime.theater_name)
        .bind(&showtime.screen)
        .bind(showtime.date)
        .bind(&showtime.time)
        .bind(showtime.base_price.minor())
        .bind(to_i32(showtime.layout.rows)?)
        .bind(to_i32(showtime.layout.cols)?)
        .bind(to_i32(showtime.layout.gap_after_row)?)
        .bind(to_i32(showtime.layout.gap_after_col)?)
        .bind(to_i32(showtime.count_with_status(SeatStatus::Available))?)
        .execute(&mut *tx)
        .await?;

        let mut rows = Vec::new();
        let mut numbers = Vec::new();
        let mut positions = Vec::new();
        let mut types = Vec::new();
        let mut statuses = Vec::new();
        for row_seats in showtime.seats.values() {
            for (position, seat) in row_seats.iter().enumerate() {
                rows.push(seat.row.clone());
                numbers.push(seat.number.clone());
                positions.push(to_i32(position as u32)?);
                types.push(seat.seat_type.as_str().to_string());
                statuses.push(seat.status.as_str().to_string());
            }
        }

        sqlx::query(
            r#"
            INSERT INTO seats (showtime_id, row_label, number, position, seat_type, status)
            SELECT $1, r.row_label, r.number, r.position, r.seat_type, r.status
            FROM UNNEST($2::text[], $3::text[], $4::int4[], $5::text[], $6::text[])
                 AS r(row_label, number, position, seat_type, status)
            "#,
        )
        .bind(showtime.id)
        .bind(rows)
        .bind(numbers)
        .bind(positions)
        .bind(types)
        .bind(statuses)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, BookingError> {
        let tx = self.db.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[derive(FromRow)]
struct ShowtimeRow {
    id: Uuid,
    show_id: Uuid,
    movie_title: String,
    theater_id: Uuid,
    theater_name: String,
    screen: String,
    show_date: NaiveDate,
    show_time: String,
    base_price: i64,
    layout_rows: i32,
    layout_cols: i32,
    gap_after_row: i32,
    gap_after_col: i32,
    available_seats: i32,
}

#[derive(FromRow)]
struct SeatRow {
    row_label: String,
    number: String,
    seat_type: String,
    status: String,
}

impl TryFrom<SeatRow> for Seat {
    type Error = BookingError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            seat_type: row.seat_type.parse()?,
            status: row.status.parse()?,
            number: row.number,
            row: row.row_label,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    show_id: Uuid,
    showtime_id: Uuid,
    theater_id: Uuid,
    movie_title: String,
    theater_name: String,
    screen: String,
    show_date: NaiveDate,
    show_time: String,
    seats: Json<Vec<BookedSeat>>,
    subtotal: i64,
    convenience_fee: i64,
    total_amount: i64,
    status: String,
    payment: Json<Payment>,
    booking_reference: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = BookingError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            show_id: row.show_id,
            showtime_id: row.showtime_id,
            theater_id: row.theater_id,
            movie_title: row.movie_title,
            theater_name: row.theater_name,
            screen: row.screen,
            show_date: row.show_date,
            show_time: row.show_time,
            seats: row.seats.0,
            subtotal: Money::from_minor(row.subtotal),
            convenience_fee: Money::from_minor(row.convenience_fee),
            total_amount: Money::from_minor(row.total_amount),
            status: row.status.parse()?,
            payment: row.payment.0,
            booking_reference: row.booking_reference,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_u32(value: i32, what: &str) -> Result<u32, BookingError> {
    u32::try_from(value).map_err(|_| BookingError::Internal(format!("{what} is negative: {value}")))
}

fn to_i32(value: u32) -> Result<i32, BookingError> {
    i32::try_from(value).map_err(|_| BookingError::Internal(format!("{value} does not fit a database integer")))
}

fn split_ids(seats: &[SeatId]) -> (Vec<String>, Vec<String>) {
    seats.iter().map(|s| (s.row.clone(), s.number.clone())).unzip()
}

impl PgUnitOfWork {
    async fn apply(
        &mut self,
        showtime_id: Uuid,
        seats: &[SeatId],
        transition: SeatTransition,
    ) -> Result<Vec<Seat>, BookingError> {
        let (rows, numbers) = split_ids(seats);

        let locked: Vec<SeatRow> = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT s.row_label, s.number, s.seat_type, s.status
            FROM seats s
            JOIN UNNEST($2::text[], $3::text[]) AS req(row_label, number)
              ON s.row_label = req.row_label AND s.number = req.number
            WHERE s.showtime_id = $1
            ORDER BY s.row_label, s.number
            FOR UPDATE OF s
            "#,
        )
        .bind(showtime_id)
        .bind(&rows)
        .bind(&numbers)
        .fetch_all(&mut *self.tx)
        .await?;

        let current = locked
            .into_iter()
            .map(|row| Ok((SeatId::new(row.row_label, row.number), row.status.parse::<SeatStatus>()?)))
            .collect::<Result<HashMap<SeatId, SeatStatus>, BookingError>>()?;

        check_seats(transition, seats, |id| current.get(id).copied())?;

        let updated: Vec<SeatRow> = sqlx::query_as::<_, SeatRow>(
            r#"
            UPDATE seats s
            SET status = $4
            FROM UNNEST($2::text[], $3::text[]) AS req(row_label, number)
            WHERE s.showtime_id = $1
              AND s.row_label = req.row_label
              AND s.number = req.number
              AND s.status = ANY($5)
            RETURNING s.row_label, s.number, s.seat_type, s.status
            "#,
        )
        .bind(showtime_id)
        .bind(&rows)
        .bind(&numbers)
        .bind(transition.target().as_str())
        .bind(transition.accepted_statuses())
        .fetch_all(&mut *self.tx)
        .await?;

        if updated.len() != seats.len() {
            warn!(
                %showtime_id,
                expected = seats.len(),
                updated = updated.len(),
                "seat update touched fewer rows than were locked"
            );
            return Err(BookingError::StorageConflict);
        }

        let delta = transition.available_delta(seats.len());
        if delta != 0 {
            sqlx::query("UPDATE showtimes SET available_seats = available_seats + $2 WHERE id = $1")
                .bind(showtime_id)
                .bind(i32::try_from(delta).map_err(|_| BookingError::Internal("seat delta overflow".into()))?)
                .execute(&mut *self.tx)
                .await?;
        }

        let mut by_id = updated
            .into_iter()
            .map(|row| Seat::try_from(row).map(|seat| (seat.id(), seat)))
            .collect::<Result<HashMap<SeatId, Seat>, BookingError>>()?;

        seats
            .iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .ok_or_else(|| BookingError::Internal(format!("seat {id} missing from update")))
            })
            .collect()
    }
}

#[async_trait]
impl SeatMapStore for PgUnitOfWork {
    async fn get_showtime(&mut self, show_id: Uuid, showtime_id: Uuid) -> Result<Option<Showtime>, BookingError> {
        let row: Option<ShowtimeRow> = sqlx::query_as::<_, ShowtimeRow>(
            r#"
            SELECT id, show_id, movie_title, theater_id, theater_name, screen, show_date, show_time,
                   base_price, layout_rows, layout_cols, gap_after_row, gap_after_col, available_seats
            FROM showtimes
            WHERE id = $1 AND show_id = $2
            "#,
        )
        .bind(showtime_id)
        .bind(show_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seat_rows: Vec<SeatRow> = sqlx::query_as::<_, SeatRow>(
            "SELECT row_label, number, seat_type, status FROM seats WHERE showtime_id = $1 ORDER BY row_label, position",
        )
        .bind(showtime_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut seats: BTreeMap<String, Vec<Seat>> = BTreeMap::new();
        for seat_row in seat_rows {
            let seat = Seat::try_from(seat_row)?;
            seats.entry(seat.row.clone()).or_default().push(seat);
        }

        Ok(Some(Showtime {
            id: row.id,
            show_id: row.show_id,
            movie_title: row.movie_title,
            theater_id: row.theater_id,
            theater_name: row.theater_name,
            screen: row.screen,
            date: row.show_date,
            time: row.show_time,
            base_price: Money::from_minor(row.base_price),
            layout: SeatLayout {
                rows: to_u32(row.layout_rows, "layout_rows")?,
                cols: to_u32(row.layout_cols, "layout_cols")?,
                gap_after_row: to_u32(row.gap_after_row, "gap_after_row")?,
                gap_after_col: to_u32(row.gap_after_col, "gap_after_col")?,
            },
            available_seats: to_u32(row.available_seats, "available_seats")?,
            seats,
        }))
    }

    async fn try_reserve(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<Vec<Seat>, BookingError> {
        self.apply(showtime_id, seats, SeatTransition::Reserve).await
    }

    async fn commit_booked(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<(), BookingError> {
        self.apply(showtime_id, seats, SeatTransition::CommitBooked).await.map(|_| ())
    }

    async fn release(&mut self, showtime_id: Uuid, seats: &[SeatId]) -> Result<(), BookingError> {
        self.apply(showtime_id, seats, SeatTransition::Release).await.map(|_| ())
    }
}

#[async_trait]
impl BookingLedger for PgUnitOfWork {
    async fn create(&mut self, draft: BookingDraft) -> Result<Booking, BookingError> {
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let counter: i64 = sqlx::query_scalar("SELECT nextval('booking_reference_seq')")
                .fetch_one(&mut *self.tx)
                .await?;
            let reference = booking_reference(draft.created_at, counter);

            let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookings WHERE booking_reference = $1)")
                .bind(&reference)
                .fetch_one(&mut *self.tx)
                .await?;
            if taken {
                debug!(%reference, "booking reference already issued, drawing another");
                continue;
            }

            let booking = draft.into_booking(Uuid::new_v4(), reference);
            sqlx::query(
                r#"
                INSERT INTO bookings (id, user_id, show_id, showtime_id, theater_id, movie_title,
                                      theater_name, screen, show_date, show_time, seats, subtotal,
                                      convenience_fee, total_amount, status, payment,
                                      booking_reference, expires_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
                "#,
            )
            .bind(booking.id)
            .bind(&booking.user_id)
            .bind(booking.show_id)
            .bind(booking.showtime_id)
            .bind(booking.theater_id)
            .bind(&booking.movie_title)
            .bind(&booking.theater_name)
            .bind(&booking.screen)
            .bind(booking.show_date)
            .bind(&booking.show_time)
            .bind(Json(&booking.seats))
            .bind(booking.subtotal.minor())
            .bind(booking.convenience_fee.minor())
            .bind(booking.total_amount.minor())
            .bind(booking.status.as_str())
            .bind(Json(&booking.payment))
            .bind(&booking.booking_reference)
            .bind(booking.expires_at)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *self.tx)
            .await?;

            return Ok(booking);
        }
        Err(BookingError::Internal("could not allocate a unique booking reference".into()))
    }

    async fn get(&mut self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        let row: Option<BookingRow> = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.ok_or_else(|| BookingError::booking_not_found(booking_id))?.try_into()
    }

    async fn transition(
        &mut self,
        booking_id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        extra: TransitionExtra,
    ) -> Result<Booking, BookingError> {
        let sql = format!(
            "UPDATE bookings SET status = $3, payment = COALESCE($4, payment), updated_at = $5 \
             WHERE id = $1 AND status = $2 RETURNING {BOOKING_COLUMNS}"
        );
        let row: Option<BookingRow> = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(extra.payment.map(Json))
            .bind(extra.at)
            .fetch_optional(&mut *self.tx)
            .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match actual {
            None => Err(BookingError::booking_not_found(booking_id)),
            Some(actual) => Err(BookingError::InvalidStateTransition {
                booking_id,
                expected,
                actual: actual.parse()?,
            }),
        }
    }

    async fn attach_payment(
        &mut self,
        booking_id: Uuid,
        payment: Payment,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let sql = format!("UPDATE bookings SET payment = $2, updated_at = $3 WHERE id = $1 RETURNING {BOOKING_COLUMNS}");
        let row: Option<BookingRow> = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .bind(Json(payment))
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.ok_or_else(|| BookingError::booking_not_found(booking_id))?.try_into()
    }

    async fn delete(&mut self, booking_id: Uuid) -> Result<(), BookingError> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BookingError::booking_not_found(booking_id));
        }
        Ok(())
    }

    async fn expired_pending(&mut self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Uuid>, BookingError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM bookings
            WHERE status = 'pending' AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), BookingError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BookingError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
