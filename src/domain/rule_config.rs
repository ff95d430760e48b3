//! Parameter bundle for the observation-point buy rule and trailing exits.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::TrailtraderError;

/// Which side of the computed boundary the current price must sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// +1: price must exceed the boundary.
    Above,
    /// -1: price must be below the boundary.
    Below,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Above => 1,
            Direction::Below => -1,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" | "+1" => Ok(Direction::Above),
            "-1" => Ok(Direction::Below),
            other => Err(format!("direction must be 1 or -1, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitMode {
    /// Thresholds anchored on the highest high since entry.
    TrailingFromExtreme,
    /// Thresholds anchored on the entry price.
    TrailingFromEntry,
}

impl FromStr for ExitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trailing_from_extreme" | "extreme" => Ok(ExitMode::TrailingFromExtreme),
            "trailing_from_entry" | "entry" => Ok(ExitMode::TrailingFromEntry),
            other => Err(format!(
                "exit_mode must be trailing_from_extreme or trailing_from_entry, got '{other}'"
            )),
        }
    }
}

impl fmt::Display for ExitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitMode::TrailingFromExtreme => write!(f, "trailing_from_extreme"),
            ExitMode::TrailingFromEntry => write!(f, "trailing_from_entry"),
        }
    }
}

/// One `(offset, percent, direction)` buy condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationPoint {
    pub offset: usize,
    pub percent: Decimal,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    /// Lookback distances in bars, paired by index with the two vectors below.
    pub observation_offsets: Vec<usize>,
    pub threshold_percents: Vec<Decimal>,
    pub directions: Vec<Direction>,
    pub quorum: usize,
    pub profit_gap: Decimal,
    /// e.g. 97 allows a 3 % pullback while in profit.
    pub win_percent: Decimal,
    pub lose_percent: Decimal,
    pub exit_mode: ExitMode,
}

impl RuleConfig {
    pub fn validate(&self) -> Result<(), TrailtraderError> {
        let n = self.observation_offsets.len();
        if n == 0 {
            return Err(invalid("at least one observation point is required"));
        }
        if self.threshold_percents.len() != n || self.directions.len() != n {
            return Err(invalid(&format!(
                "observation_offsets ({}), threshold_percents ({}) and directions ({}) must have the same length",
                n,
                self.threshold_percents.len(),
                self.directions.len()
            )));
        }
        if self.observation_offsets.contains(&0) {
            return Err(invalid("observation offsets must be at least 1"));
        }
        if self.quorum == 0 {
            return Err(invalid("quorum must be positive"));
        }
        Ok(())
    }

    /// Largest lookback; the first evaluated bar needs at least this many
    /// bars before it.
    pub fn max_offset(&self) -> usize {
        self.observation_offsets.iter().copied().max().unwrap_or(0)
    }

    pub fn observation_points(&self) -> impl Iterator<Item = ObservationPoint> + '_ {
        self.observation_offsets
            .iter()
            .zip(&self.threshold_percents)
            .zip(&self.directions)
            .map(|((&offset, &percent), &direction)| ObservationPoint {
                offset,
                percent,
                direction,
            })
    }
}

fn invalid(reason: &str) -> TrailtraderError {
    TrailtraderError::RuleInvalid {
        reason: reason.to_string(),
    }
}
