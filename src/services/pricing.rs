//! Seat pricing. Pure functions only; the coordinator freezes the result
//! into the booking at select time.

use crate::models::{Money, SeatType};

/// Convenience fee charged on top of the subtotal, in percent.
pub const CONVENIENCE_FEE_PERCENT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub seat_prices: Vec<Money>,
    pub subtotal: Money,
    pub convenience_fee: Money,
    pub total: Money,
}

/// Price multiplier as a `(numerator, denominator)` pair.
pub fn multiplier(seat_type: SeatType) -> (i64, i64) {
    match seat_type {
        SeatType::Standard => (1, 1),
        SeatType::Premium => (3, 2),
        SeatType::Sofa => (2, 1),
    }
}

/// `base × multiplier`, rounded up to a whole minor unit.
pub fn seat_price(base_price: Money, seat_type: SeatType) -> Money {
    let (num, den) = multiplier(seat_type);
    Money::from_minor(ceil_div(base_price.minor() * num, den))
}

/// `ceil(subtotal × 10%)`, rounded up to a whole major unit.
pub fn convenience_fee(subtotal: Money) -> Money {
    let per_major = Money::MINOR_PER_MAJOR;
    let major = ceil_div(subtotal.minor() * CONVENIENCE_FEE_PERCENT, 100 * per_major);
    Money::from_major(major)
}

pub fn quote<I>(base_price: Money, seat_types: I) -> PriceBreakdown
where
    I: IntoIterator<Item = SeatType>,
{
    let seat_prices: Vec<Money> = seat_types
        .into_iter()
        .map(|t| seat_price(base_price, t))
        .collect();
    let subtotal: Money = seat_prices.iter().copied().sum();
    let convenience_fee = convenience_fee(subtotal);

    PriceBreakdown {
        seat_prices,
        subtotal,
        convenience_fee,
        total: subtotal + convenience_fee,
    }
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    let q = value / divisor;
    if value % divisor > 0 {
        q + 1
    } else {
        q
    }
}
