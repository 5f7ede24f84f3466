use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Standard,
    Premium,
    Sofa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Selected,
    Booked,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Standard => "standard",
            SeatType::Premium => "premium",
            SeatType::Sofa => "sofa",
        }
    }
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Selected => "selected",
            SeatStatus::Booked => "booked",
        }
    }
}

impl FromStr for SeatType {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(SeatType::Standard),
            "premium" => Ok(SeatType::Premium),
            "sofa" => Ok(SeatType::Sofa),
            other => Err(BookingError::Internal(format!("unknown seat type '{other}'"))),
        }
    }
}

impl FromStr for SeatStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "selected" => Ok(SeatStatus::Selected),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(BookingError::Internal(format!("unknown seat status '{other}'"))),
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub number: String,
    pub row: String,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
    pub status: SeatStatus,
}

impl Seat {
    pub fn id(&self) -> SeatId {
        SeatId {
            row: self.row.clone(),
            number: self.number.clone(),
        }
    }
}

/// Client-facing seat identifier, written `"{row}-{number}"` (e.g. `"A-03"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatId {
    pub row: String,
    pub number: String,
}

impl SeatId {
    pub fn new(row: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            number: number.into(),
        }
    }

    /// Ticket label, row and number without separator (`"A03"`).
    pub fn label(&self) -> String {
        format!("{}{}", self.row, self.number)
    }
}

impl FromStr for SeatId {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, number) = s
            .split_once('-')
            .ok_or_else(|| BookingError::Validation(format!("seat id '{s}' must look like ROW-NUMBER")))?;

        let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(row) || !valid(number) {
            return Err(BookingError::Validation(format!(
                "seat id '{s}' must look like ROW-NUMBER"
            )));
        }

        Ok(SeatId::new(row, number))
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_row_dash_number() {
        let id: SeatId = "A-03".parse().unwrap();
        assert_eq!(id, SeatId::new("A", "03"));
        assert_eq!(id.to_string(), "A-03");
        assert_eq!(id.label(), "A03");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "A03", "-03", "A-", "A-0-3", "A -03"] {
            assert!(
                matches!(bad.parse::<SeatId>(), Err(BookingError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn seat_type_round_trips_through_storage_text() {
        for ty in [SeatType::Standard, SeatType::Premium, SeatType::Sofa] {
            assert_eq!(ty.as_str().parse::<SeatType>().unwrap(), ty);
        }
        assert!("vip".parse::<SeatType>().is_err());
    }
}
