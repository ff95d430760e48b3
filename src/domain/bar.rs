//! Minute OHLC bar representation and decimal rounding helpers.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept by every threshold and cost-price division.
pub const PRICE_SCALE: u32 = 3;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepts `%Y-%m-%d %H:%M:%S`, the same with a `T` separator, a bare date
/// (midnight) or RFC 3339. An RFC 3339 offset is dropped and the local wall
/// clock kept.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Round half-up (away from zero on a tie) to [`PRICE_SCALE`] digits.
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `value * percent / 100`, rounded with [`round_price`].
pub fn percent_of(value: Decimal, percent: Decimal) -> Decimal {
    round_price(value * percent / Decimal::ONE_HUNDRED)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl Bar {
    /// (open + high + low + close) / 4, unrounded.
    pub fn reference_price(&self) -> Decimal {
        (self.open + self.high + self.low + self.close) / Decimal::from(4)
    }
}

/// Index of the first bar whose timestamp is not strictly greater than its
/// predecessor's, if any.
pub fn first_non_increasing(bars: &[Bar]) -> Option<usize> {
    bars.windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
        .map(|i| i + 1)
}
