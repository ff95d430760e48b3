//! Core domain types and logic.

pub mod bar;
pub mod fees;
pub mod position;
pub mod rule_config;
pub mod rule_eval;
pub mod ledger;
pub mod backtest;
pub mod metrics;
pub mod sweep;
pub mod live;
pub mod config_validation;
pub mod error;
