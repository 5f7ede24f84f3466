use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Money, SeatId, SeatType};
use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
            BookingStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "expired" => Ok(BookingStatus::Expired),
            "refunded" => Ok(BookingStatus::Refunded),
            other => Err(BookingError::Internal(format!("unknown booking status '{other}'"))),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Option<Money>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn pending() -> Self {
        Self {
            method: None,
            transaction_id: None,
            status: PaymentStatus::Pending,
            amount: None,
            paid_at: None,
        }
    }
}

/// Seat as it was priced at select time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSeat {
    pub number: String,
    pub row: String,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
    pub price: Money,
}

impl BookedSeat {
    pub fn id(&self) -> SeatId {
        SeatId::new(self.row.clone(), self.number.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub show_id: Uuid,
    pub showtime_id: Uuid,
    pub theater_id: Uuid,
    pub movie_title: String,
    pub theater_name: String,
    pub screen: String,
    pub show_date: NaiveDate,
    pub show_time: String,
    pub seats: Vec<BookedSeat>,
    pub subtotal: Money,
    pub convenience_fee: Money,
    pub total_amount: Money,
    pub status: BookingStatus,
    pub payment: Payment,
    pub booking_reference: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn seat_ids(&self) -> Vec<SeatId> {
        self.seats.iter().map(BookedSeat::id).collect()
    }

    /// `"A01, A02"` as printed on the ticket.
    pub fn seat_labels(&self) -> String {
        self.seats
            .iter()
            .map(|s| s.id().label())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_hold_live(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && now < self.expires_at
    }
}

/// Everything the ledger needs to open a pending booking. Id, reference
/// and status are assigned by the ledger.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub user_id: String,
    pub show_id: Uuid,
    pub showtime_id: Uuid,
    pub theater_id: Uuid,
    pub movie_title: String,
    pub theater_name: String,
    pub screen: String,
    pub show_date: NaiveDate,
    pub show_time: String,
    pub seats: Vec<BookedSeat>,
    pub subtotal: Money,
    pub convenience_fee: Money,
    pub total_amount: Money,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BookingDraft {
    pub fn into_booking(self, id: Uuid, booking_reference: String) -> Booking {
        Booking {
            id,
            user_id: self.user_id,
            show_id: self.show_id,
            showtime_id: self.showtime_id,
            theater_id: self.theater_id,
            movie_title: self.movie_title,
            theater_name: self.theater_name,
            screen: self.screen,
            show_date: self.show_date,
            show_time: self.show_time,
            seats: self.seats,
            subtotal: self.subtotal,
            convenience_fee: self.convenience_fee,
            total_amount: self.total_amount,
            status: BookingStatus::Pending,
            payment: Payment::pending(),
            booking_reference,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Side data written together with a status transition.
#[derive(Debug, Clone)]
pub struct TransitionExtra {
    pub payment: Option<Payment>,
    pub at: DateTime<Utc>,
}

impl TransitionExtra {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self { payment: None, at }
    }

    pub fn with_payment(mut self, payment: Payment) -> Self {
        self.payment = Some(payment);
        self
    }
}
