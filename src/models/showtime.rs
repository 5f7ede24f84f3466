use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{Money, Seat, SeatId, SeatStatus, SeatType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatLayout {
    pub rows: u32,
    pub cols: u32,
    pub gap_after_row: u32,
    pub gap_after_col: u32,
}

impl SeatLayout {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            gap_after_row: 2,
            gap_after_col: 4,
        }
    }

    /// Builds a fully available seat map: rows `A`, `B`, … with seats
    /// numbered `01..=cols`. Rows listed in `premium_rows` / `sofa_rows` get
    /// that seat type, everything else is standard.
    pub fn generate_seats(&self, premium_rows: &[&str], sofa_rows: &[&str]) -> BTreeMap<String, Vec<Seat>> {
        (0..self.rows)
            .map(|index| {
                let row = row_label(index);
                let seat_type = if premium_rows.contains(&row.as_str()) {
                    SeatType::Premium
                } else if sofa_rows.contains(&row.as_str()) {
                    SeatType::Sofa
                } else {
                    SeatType::Standard
                };
                let seats = (1..=self.cols)
                    .map(|n| Seat {
                        number: format!("{n:02}"),
                        row: row.clone(),
                        seat_type,
                        status: SeatStatus::Available,
                    })
                    .collect();
                (row, seats)
            })
            .collect()
    }
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
fn row_label(mut index: u32) -> String {
    let mut label = Vec::new();
    loop {
        label.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

/// A scheduled screening with its own seat inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Uuid,
    pub show_id: Uuid,
    pub movie_title: String,
    pub theater_id: Uuid,
    pub theater_name: String,
    pub screen: String,
    pub date: NaiveDate,
    pub time: String,
    pub base_price: Money,
    pub layout: SeatLayout,
    /// Always `capacity - selected - booked`.
    pub available_seats: u32,
    pub seats: BTreeMap<String, Vec<Seat>>,
}

impl Showtime {
    pub fn capacity(&self) -> u32 {
        self.seats.values().map(|row| row.len() as u32).sum()
    }

    pub fn seat(&self, id: &SeatId) -> Option<&Seat> {
        self.seats.get(&id.row)?.iter().find(|s| s.number == id.number)
    }

    pub fn seat_mut(&mut self, id: &SeatId) -> Option<&mut Seat> {
        self.seats.get_mut(&id.row)?.iter_mut().find(|s| s.number == id.number)
    }

    pub fn count_with_status(&self, status: SeatStatus) -> u32 {
        self.seats
            .values()
            .flatten()
            .filter(|s| s.status == status)
            .count() as u32
    }
}

/// Read view returned by `getSeats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMapView {
    pub show_id: Uuid,
    pub show_title: String,
    pub showtime_id: Uuid,
    pub theater: String,
    pub screen: String,
    pub date: NaiveDate,
    pub time: String,
    pub price: Money,
    pub available_seats: u32,
    pub seat_layout: SeatLayout,
    pub seats: BTreeMap<String, Vec<Seat>>,
}

impl From<Showtime> for SeatMapView {
    fn from(showtime: Showtime) -> Self {
        Self {
            show_id: showtime.show_id,
            show_title: showtime.movie_title,
            showtime_id: showtime.id,
            theater: showtime.theater_name,
            screen: showtime.screen,
            date: showtime.date,
            time: showtime.time,
            price: showtime.base_price,
            available_seats: showtime.available_seats,
            seat_layout: showtime.layout,
            seats: showtime.seats,
        }
    }
}
