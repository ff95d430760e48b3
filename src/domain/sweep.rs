//! Parallel parameter sweep over rule configurations using rayon.
//!
//! Each configuration replays the same bars with its own
//! [`SimulationState`](super::ledger::SimulationState); only the bars, the
//! fee model and the backtest settings are shared.

use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::info;

use super::backtest::{run_backtest, BacktestConfig, BacktestResult};
use super::bar::Bar;
use super::error::TrailtraderError;
use super::fees::FeeModel;
use super::rule_config::RuleConfig;
use super::rule_eval::RuleEvaluator;

#[derive(Debug, Clone)]
pub struct SweepResult {
    /// Position of the configuration in the input slice.
    pub config_index: usize,
    pub config: RuleConfig,
    pub result: BacktestResult,
}

/// Cartesian product of win and lose percents applied to `base`, in
/// win-major order.
pub fn exit_grid(base: &RuleConfig, win_percents: &[Decimal], lose_percents: &[Decimal]) -> Vec<RuleConfig> {
    let mut configs = Vec::with_capacity(win_percents.len() * lose_percents.len());
    for &win in win_percents {
        for &lose in lose_percents {
            configs.push(RuleConfig {
                win_percent: win,
                lose_percent: lose,
                ..base.clone()
            });
        }
    }
    configs
}

/// Runs one backtest per configuration and returns the results sorted by
/// final cash, best first. Equal final cash keeps input order.
///
/// Every configuration is validated before any replay starts.
pub fn run_sweep(
    symbol: &str,
    bars: &[Bar],
    configs: &[RuleConfig],
    fees: &dyn FeeModel,
    settings: &BacktestConfig,
) -> Result<Vec<SweepResult>, TrailtraderError> {
    let evaluators = configs
        .iter()
        .cloned()
        .map(RuleEvaluator::new)
        .collect::<Result<Vec<_>, _>>()?;

    info!(symbol, configs = configs.len(), "Starting sweep");

    let mut results = evaluators
        .par_iter()
        .enumerate()
        .map(|(i, evaluator)| {
            run_backtest(symbol, bars, evaluator, fees, settings).map(|result| SweepResult {
                config_index: i,
                config: evaluator.config().clone(),
                result,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    results.sort_by(|a, b| {
        b.result
            .final_cash()
            .cmp(&a.result.final_cash())
            .then(a.config_index.cmp(&b.config_index))
    });
    Ok(results)
}
