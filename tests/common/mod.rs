#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use trailtrader::domain::backtest::{BacktestConfig, EntryFill, ExitFill};
pub use trailtrader::domain::bar::Bar;
use trailtrader::domain::error::TrailtraderError;
use trailtrader::domain::ledger::AffordabilityPolicy;
use trailtrader::domain::rule_config::{Direction, ExitMode, RuleConfig};
use trailtrader::domain::rule_eval::RuleEvaluator;
use trailtrader::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, TrailtraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TrailtraderError::DataRead {
                reason: reason.clone(),
            });
        }
        let bars: Vec<Bar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && end.is_none_or(|end| b.timestamp < end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(TrailtraderError::DataUnavailable {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrailtraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, TrailtraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TrailtraderError::DataRead {
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.timestamp).min().unwrap();
                let max = bars.iter().map(|b| b.timestamp).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

/// Minute `minute` after 2024-11-15 14:30:00.
pub fn minute(minute: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 15)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap()
        + Duration::minutes(minute)
}

pub fn make_bar(at: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
    Bar {
        timestamp: minute(at),
        open,
        high,
        low,
        close,
        volume: 1000,
    }
}

pub fn flat_bar(at: i64, price: Decimal) -> Bar {
    make_bar(at, price, price, price, price)
}

/// Two flat warm-up bars at 100, a dip that triggers a buy at close 97.5,
/// a bar that holds, and a pullback that sells at close 93.5.
pub fn dip_and_pullback() -> Vec<Bar> {
    vec![
        flat_bar(0, dec!(100)),
        flat_bar(1, dec!(100)),
        make_bar(2, dec!(99), dec!(99), dec!(97), dec!(97.5)),
        make_bar(3, dec!(98), dec!(100), dec!(98), dec!(99)),
        make_bar(4, dec!(94), dec!(94.5), dec!(93), dec!(93.5)),
    ]
}

/// Saw-tooth series: a slow climb from `start_price` broken by a sharp dip
/// every `period` bars.
pub fn generate_bars(count: usize, start_price: Decimal, period: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let base = start_price + Decimal::new(i as i64 % period as i64 * 25, 2);
            let (low, close) = if i % period == period - 1 {
                (base * dec!(0.93), base * dec!(0.95))
            } else {
                (base - dec!(0.10), base)
            };
            make_bar(i as i64, base, base + dec!(0.20), low, close)
        })
        .collect()
}

pub fn dip_rule_config() -> RuleConfig {
    RuleConfig {
        observation_offsets: vec![2],
        threshold_percents: vec![dec!(98)],
        directions: vec![Direction::Below],
        quorum: 1,
        profit_gap: Decimal::ZERO,
        win_percent: dec!(97),
        lose_percent: dec!(95),
        exit_mode: ExitMode::TrailingFromExtreme,
    }
}

pub fn dip_rule() -> RuleEvaluator {
    RuleEvaluator::new(dip_rule_config()).unwrap()
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        begin_time: minute(2),
        end_time: None,
        initial_cash: dec!(1000),
        currency: "USD".into(),
        entry_fill: EntryFill::Close,
        exit_fill: ExitFill::Close,
        affordability: AffordabilityPolicy::ResidualCash,
    }
}

pub fn is_success(code: std::process::ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", std::process::ExitCode::SUCCESS)
}
