//! Backtest engine and replay loop.
//!
//! One chronological pass over a symbol's bars:
//!
//! - bars before `begin_time` are skipped without evaluation;
//! - bars at or after `end_time` (when set) end the replay;
//! - each bar allows at most one trade and a sell always wins over a buy;
//! - after the last bar any holding is liquidated at that bar's close.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info};

use super::bar::{first_non_increasing, Bar};
use super::error::TrailtraderError;
use super::fees::FeeModel;
use super::ledger::{AffordabilityPolicy, SimulationState};
use super::rule_eval::RuleEvaluator;

/// Price at which a triggered buy is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFill {
    #[default]
    Close,
    High,
}

impl EntryFill {
    pub fn price(self, bar: &Bar) -> Decimal {
        match self {
            EntryFill::Close => bar.close,
            EntryFill::High => bar.high,
        }
    }
}

impl FromStr for EntryFill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(EntryFill::Close),
            "high" => Ok(EntryFill::High),
            other => Err(format!("entry_fill must be close or high, got '{other}'")),
        }
    }
}

/// Price at which a triggered sell is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitFill {
    #[default]
    Close,
    Low,
}

impl ExitFill {
    pub fn price(self, bar: &Bar) -> Decimal {
        match self {
            ExitFill::Close => bar.close,
            ExitFill::Low => bar.low,
        }
    }
}

impl FromStr for ExitFill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(ExitFill::Close),
            "low" => Ok(ExitFill::Low),
            other => Err(format!("exit_fill must be close or low, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub begin_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub initial_cash: Decimal,
    pub currency: String,
    pub entry_fill: EntryFill,
    pub exit_fill: ExitFill,
    pub affordability: AffordabilityPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    AwaitingStart,
    Running,
    Finalized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub symbol: String,
    pub state: SimulationState,
    /// Bars that reached the rule evaluator.
    pub bars_evaluated: usize,
    pub engine_state: EngineState,
    /// Cash plus holdings marked at the close, one point per evaluated bar.
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestResult {
    pub fn final_cash(&self) -> Decimal {
        self.state.cash
    }
}

/// Checks a bar sequence before replay and returns the index of the first
/// bar that will be evaluated, if any.
pub fn validate_bars(
    symbol: &str,
    bars: &[Bar],
    config: &BacktestConfig,
    required_lookback: usize,
) -> Result<Option<usize>, TrailtraderError> {
    if bars.is_empty() {
        return Err(TrailtraderError::DataUnavailable {
            symbol: symbol.to_string(),
        });
    }
    if let Some(index) = first_non_increasing(bars) {
        return Err(TrailtraderError::NonMonotonicBars {
            symbol: symbol.to_string(),
            index,
            timestamp: bars[index].timestamp,
        });
    }

    let first = bars.iter().position(|b| {
        b.timestamp >= config.begin_time && config.end_time.is_none_or(|end| b.timestamp < end)
    });
    match first {
        Some(first) if first < required_lookback => Err(TrailtraderError::InsufficientHistory {
            symbol: symbol.to_string(),
            bars: first,
            minimum: required_lookback,
        }),
        _ => Ok(first),
    }
}

pub fn run_backtest(
    symbol: &str,
    bars: &[Bar],
    evaluator: &RuleEvaluator,
    fees: &dyn FeeModel,
    config: &BacktestConfig,
) -> Result<BacktestResult, TrailtraderError> {
    let rule = evaluator.config();
    validate_bars(symbol, bars, config, rule.max_offset())?;

    let mut state = SimulationState::new(
        &[symbol.to_string()],
        &config.currency,
        config.initial_cash,
        config.begin_time,
        config.end_time,
    );
    let mut phase = EngineState::AwaitingStart;
    let mut last_bar: Option<&Bar> = None;
    let mut bars_evaluated = 0usize;
    let mut equity_curve = Vec::new();

    info!(
        symbol,
        bars = bars.len(),
        begin = %config.begin_time,
        cash = %config.initial_cash,
        "Starting backtest"
    );

    for (index, bar) in bars.iter().enumerate() {
        if phase == EngineState::AwaitingStart {
            if bar.timestamp < config.begin_time {
                continue;
            }
            phase = EngineState::Running;
            debug!(symbol, index, at = %bar.timestamp, "Replay running");
        }
        if config.end_time.is_some_and(|end| bar.timestamp >= end) {
            break;
        }
        last_bar = Some(bar);
        bars_evaluated += 1;

        let held = state.held_quantity(symbol);
        if held > Decimal::ZERO {
            let entry_price = state
                .position(symbol)
                .map(|p| p.cost_price)
                .unwrap_or(Decimal::ZERO);
            let entry_time = state.recent_buy_time(symbol).ok_or_else(|| {
                TrailtraderError::LedgerViolation {
                    reason: format!("{symbol} is held but has no buy record"),
                }
            })?;

            let sell = evaluator.should_sell(
                bars,
                entry_price,
                entry_time,
                bar.high,
                bar.timestamp,
                rule.exit_mode,
            )?;
            if sell {
                let price = config.exit_fill.price(bar);
                liquidate(&mut state, symbol, held, price, bar.timestamp, fees)?;
                equity_curve.push(mark(&state, symbol, bar));
                continue;
            }
        }

        let trigger = bar.low;
        if evaluator.should_buy(bars, trigger, index)? && trigger > Decimal::ZERO {
            let requested = (state.cash / trigger).floor();
            let price = config.entry_fill.price(bar);
            state.buy(
                symbol,
                requested,
                price,
                bar.timestamp,
                fees,
                config.affordability,
            )?;
        }
        equity_curve.push(mark(&state, symbol, bar));
    }

    if let Some(bar) = last_bar {
        let held = state.held_quantity(symbol);
        if held > Decimal::ZERO {
            debug!(symbol, quantity = %held, at = %bar.timestamp, "Forced liquidation");
            liquidate(&mut state, symbol, held, bar.close, bar.timestamp, fees)?;
            if let Some(point) = equity_curve.last_mut() {
                point.equity = state.cash;
            }
        }
    }
    phase = EngineState::Finalized;

    info!(
        symbol,
        bars_evaluated,
        trades = state.trade_records.len(),
        cash = %state.cash,
        "Backtest finalized"
    );

    Ok(BacktestResult {
        symbol: symbol.to_string(),
        state,
        bars_evaluated,
        engine_state: phase,
        equity_curve,
    })
}

fn mark(state: &SimulationState, symbol: &str, bar: &Bar) -> EquityPoint {
    EquityPoint {
        timestamp: bar.timestamp,
        equity: state.cash + state.held_quantity(symbol) * bar.close,
    }
}

fn liquidate(
    state: &mut SimulationState,
    symbol: &str,
    quantity: Decimal,
    price: Decimal,
    time: NaiveDateTime,
    fees: &dyn FeeModel,
) -> Result<(), TrailtraderError> {
    if state.sell(symbol, quantity, price, time, fees)? {
        Ok(())
    } else {
        Err(TrailtraderError::LedgerViolation {
            reason: format!("sell of held {quantity} {symbol} was rejected"),
        })
    }
}
