//! Rule evaluation engine.
//!
//! Decides buy and sell signals from an explicit, time-ascending bar history.
//!
//! # Evaluation Semantics
//!
//! - Buy: each observation point compares the current price with
//!   `round3(mean_ohlc(bar[index - offset]) * percent / 100)`; a point holds
//!   when the price sits strictly on its configured side. Equality holds for
//!   neither side. Buy when at least `quorum` points hold.
//! - Sell: the position is "in profit" when `price > entry + profit_gap`.
//!   The threshold is `round3(reference * win|lose / 100)` where the
//!   reference is the highest high since entry (trailing-from-extreme) or
//!   the entry price (trailing-from-entry). Trailing-from-extreme sells when
//!   the price drops below the threshold, trailing-from-entry when it rises
//!   above it.
//!
//! Both functions are pure and the evaluator is `Send + Sync`, so the same
//! instance may serve a backtest and a live decision loop.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::cmp::Ordering;

use super::bar::{percent_of, Bar};
use super::error::TrailtraderError;
use super::rule_config::{ExitMode, RuleConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluator {
    config: RuleConfig,
}

impl RuleEvaluator {
    /// Validates the configuration up front so evaluation never sees a
    /// malformed rule.
    pub fn new(config: RuleConfig) -> Result<Self, TrailtraderError> {
        config.validate()?;
        Ok(RuleEvaluator { config })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Number of observation points satisfied at `observation_index`.
    pub fn satisfied_conditions(
        &self,
        history: &[Bar],
        current_price: Decimal,
        observation_index: usize,
    ) -> Result<usize, TrailtraderError> {
        let mut satisfied = 0;
        for point in self.config.observation_points() {
            let bar = observation_bar(history, observation_index, point.offset)?;
            let boundary = percent_of(bar.reference_price(), point.percent);
            if sign(current_price.cmp(&boundary)) == point.direction.sign() {
                satisfied += 1;
            }
        }
        Ok(satisfied)
    }

    pub fn should_buy(
        &self,
        history: &[Bar],
        current_price: Decimal,
        observation_index: usize,
    ) -> Result<bool, TrailtraderError> {
        let satisfied = self.satisfied_conditions(history, current_price, observation_index)?;
        Ok(satisfied >= self.config.quorum)
    }

    pub fn should_sell(
        &self,
        history: &[Bar],
        entry_price: Decimal,
        entry_time: NaiveDateTime,
        current_price: Decimal,
        now: NaiveDateTime,
        exit_mode: ExitMode,
    ) -> Result<bool, TrailtraderError> {
        let is_profit = current_price > entry_price + self.config.profit_gap;

        let reference = match exit_mode {
            ExitMode::TrailingFromExtreme => highest_high_since(history, entry_time, now)?,
            ExitMode::TrailingFromEntry => {
                // the window must still be non-empty in this mode
                highest_high_since(history, entry_time, now)?;
                entry_price
            }
        };

        let stop_sign = match exit_mode {
            ExitMode::TrailingFromExtreme => 1,
            ExitMode::TrailingFromEntry => -1,
        };

        let threshold = if is_profit {
            percent_of(reference, self.config.win_percent)
        } else {
            percent_of(reference, self.config.lose_percent)
        };

        Ok(sign(current_price.cmp(&threshold)) == -stop_sign)
    }
}

fn sign(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn observation_bar(
    history: &[Bar],
    observation_index: usize,
    offset: usize,
) -> Result<&Bar, TrailtraderError> {
    let index = observation_index.checked_sub(offset).ok_or_else(|| {
        TrailtraderError::InsufficientLookback {
            reason: format!(
                "offset {offset} from index {observation_index} reaches before the first bar"
            ),
        }
    })?;
    history
        .get(index)
        .ok_or_else(|| TrailtraderError::InsufficientLookback {
            reason: format!(
                "bar {index} requested but history holds {} bars",
                history.len()
            ),
        })
}

/// Highest high among bars with `entry_time <= timestamp < now`.
pub fn highest_high_since(
    history: &[Bar],
    entry_time: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<Decimal, TrailtraderError> {
    history
        .iter()
        .filter(|bar| bar.timestamp >= entry_time && bar.timestamp < now)
        .map(|bar| bar.high)
        .max()
        .ok_or_else(|| TrailtraderError::InsufficientLookback {
            reason: format!("no bar recorded between entry at {entry_time} and {now}"),
        })
}
