//! Configuration validation.
//!
//! Validates all config fields before a backtest runs. The typed readers
//! here are shared with the CLI builders so a value that validates is
//! parsed the same way when it is used.

use crate::domain::backtest::{EntryFill, ExitFill};
use crate::domain::bar::parse_timestamp;
use crate::domain::error::TrailtraderError;
use crate::domain::ledger::AffordabilityPolicy;
use crate::domain::rule_config::{Direction, ExitMode};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    validate_symbols(config)?;
    validate_initial_cash(config)?;
    validate_times(config)?;
    validate_fills(config)?;
    validate_fees(config)?;
    Ok(())
}

pub fn validate_rule_config(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    validate_observation_points(config)?;
    validate_quorum(config)?;
    validate_exit_percents(config)?;
    read_parsed::<ExitMode>(config, "rule", "exit_mode")?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TrailtraderError {
    TrailtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> TrailtraderError {
    TrailtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Non-empty trimmed value, or `None` when the key is absent or blank.
fn non_blank(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Comma-separated list; a missing or blank key is `ConfigMissing`.
pub fn read_list<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Vec<T>, TrailtraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = non_blank(config, section, key).ok_or_else(|| missing(section, key))?;
    raw.split(',')
        .map(str::trim)
        .map(|item| {
            item.parse::<T>()
                .map_err(|e| invalid(section, key, format!("'{item}': {e}")))
        })
        .collect()
}

/// Optional decimal that must parse when present.
pub fn read_decimal(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Decimal>, TrailtraderError> {
    read_parsed(config, section, key)
}

/// Optional value parsed with `FromStr` that must parse when present.
pub fn read_parsed<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, TrailtraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_blank(config, section, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, e.to_string())),
    }
}

/// Optional timestamp in `%Y-%m-%d %H:%M:%S` (or a bare date).
pub fn read_time(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDateTime>, TrailtraderError> {
    match non_blank(config, section, key) {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw).map(Some).ok_or_else(|| {
            invalid(
                section,
                key,
                format!("invalid {key} '{raw}', expected YYYY-MM-DD HH:MM:SS"),
            )
        }),
    }
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    let symbols: Vec<String> = read_list(config, "backtest", "symbols")?;
    if symbols.iter().any(|s| s.is_empty()) {
        return Err(invalid("backtest", "symbols", "symbols must not contain empty entries"));
    }
    Ok(())
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    match read_decimal(config, "backtest", "initial_cash")? {
        None => Err(missing("backtest", "initial_cash")),
        Some(v) if v <= Decimal::ZERO => Err(invalid(
            "backtest",
            "initial_cash",
            "initial_cash must be positive",
        )),
        Some(_) => Ok(()),
    }
}

fn validate_times(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    let begin = read_time(config, "backtest", "begin_time")?
        .ok_or_else(|| missing("backtest", "begin_time"))?;
    match read_time(config, "backtest", "end_time")? {
        Some(end) if end <= begin => Err(invalid(
            "backtest",
            "end_time",
            "end_time must be after begin_time",
        )),
        _ => Ok(()),
    }
}

fn validate_fills(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    read_parsed::<EntryFill>(config, "backtest", "entry_fill")?;
    read_parsed::<ExitFill>(config, "backtest", "exit_fill")?;
    read_parsed::<AffordabilityPolicy>(config, "backtest", "affordability")?;
    Ok(())
}

fn validate_fees(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    for key in ["buy_per_order", "sell_per_order", "commission_pct"] {
        if read_decimal(config, "fees", key)?.is_some_and(|v| v < Decimal::ZERO) {
            return Err(invalid("fees", key, format!("{key} must be non-negative")));
        }
    }
    Ok(())
}

fn validate_observation_points(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    let offsets: Vec<usize> = read_list(config, "rule", "observation_offsets")?;
    let percents: Vec<Decimal> = read_list(config, "rule", "threshold_percents")?;
    let directions: Vec<Direction> = read_list(config, "rule", "directions")?;

    if offsets.contains(&0) {
        return Err(invalid(
            "rule",
            "observation_offsets",
            "observation offsets must be at least 1",
        ));
    }
    if percents.len() != offsets.len() {
        return Err(invalid(
            "rule",
            "threshold_percents",
            format!(
                "expected {} values to match observation_offsets, got {}",
                offsets.len(),
                percents.len()
            ),
        ));
    }
    if directions.len() != offsets.len() {
        return Err(invalid(
            "rule",
            "directions",
            format!(
                "expected {} values to match observation_offsets, got {}",
                offsets.len(),
                directions.len()
            ),
        ));
    }
    Ok(())
}

fn validate_quorum(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    if config.get_string("rule", "quorum").is_none() {
        return Err(missing("rule", "quorum"));
    }
    let value = config.get_int("rule", "quorum", 0);
    if value < 1 {
        return Err(invalid("rule", "quorum", "quorum must be at least 1"));
    }
    Ok(())
}

fn validate_exit_percents(config: &dyn ConfigPort) -> Result<(), TrailtraderError> {
    for key in ["win_percent", "lose_percent"] {
        match read_decimal(config, "rule", key)? {
            None => return Err(missing("rule", key)),
            Some(v) if v <= Decimal::ZERO => {
                return Err(invalid("rule", key, format!("{key} must be positive")));
            }
            Some(_) => {}
        }
    }
    if read_decimal(config, "rule", "profit_gap")?.is_some_and(|gap| gap < Decimal::ZERO) {
        return Err(invalid("rule", "profit_gap", "profit_gap must be non-negative"));
    }
    Ok(())
}
