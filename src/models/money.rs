use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Amount in minor currency units (1 major unit = 100 minor). Serialized as
/// a major-unit number: `330`, `262.5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub const MINOR_PER_MAJOR: i64 = 100;

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub const fn from_major(major: i64) -> Self {
        Money(major * Self::MINOR_PER_MAJOR)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % Self::MINOR_PER_MAJOR == 0 {
            serializer.serialize_i64(self.0 / Self::MINOR_PER_MAJOR)
        } else {
            serializer.serialize_f64(self.0 as f64 / Self::MINOR_PER_MAJOR as f64)
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MajorUnits)
    }
}

struct MajorUnits;

impl Visitor<'_> for MajorUnits {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an amount in major currency units")
    }

    fn visit_i64<E: de::Error>(self, major: i64) -> Result<Money, E> {
        major
            .checked_mul(Money::MINOR_PER_MAJOR)
            .map(Money)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_u64<E: de::Error>(self, major: u64) -> Result<Money, E> {
        let major = i64::try_from(major).map_err(|_| E::custom("amount out of range"))?;
        self.visit_i64(major)
    }

    // Rounded to the nearest minor unit.
    fn visit_f64<E: de::Error>(self, major: f64) -> Result<Money, E> {
        let minor = (major * Money::MINOR_PER_MAJOR as f64).round();
        if !minor.is_finite() || minor.abs() >= i64::MAX as f64 {
            return Err(E::custom("amount out of range"));
        }
        Ok(Money(minor as i64))
    }
}
