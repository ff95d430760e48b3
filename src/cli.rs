//! CLI definition and dispatch.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_ledger_writer::CsvLedgerWriter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::bar::Bar;
use crate::domain::config_validation::{
    read_decimal, read_list, read_parsed, read_time, validate_backtest_config,
    validate_rule_config,
};
use crate::domain::error::TrailtraderError;
use crate::domain::fees::{CommissionFees, FeeModel};
use crate::domain::metrics::Metrics;
use crate::domain::rule_config::{ExitMode, RuleConfig};
use crate::domain::rule_eval::RuleEvaluator;
use crate::domain::sweep;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_DATA_DIR: &str = "data";
/// 1.01 per order.
const DEFAULT_PER_ORDER_FEE: Decimal = Decimal::from_parts(101, 0, 0, false, 2);
/// 0.12 % of notional.
const DEFAULT_COMMISSION_PCT: Decimal = Decimal::from_parts(12, 0, 0, false, 2);

#[derive(Parser, Debug)]
#[command(
    name = "trailtrader",
    about = "Mean-reversion entry, trailing-stop exit backtester"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Backtest only this symbol instead of the configured list
        #[arg(long)]
        symbol: Option<String>,
        /// Trade ledger CSV; overrides [report] output_path
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Rank exit percent combinations by final cash
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Comma-separated win percents
        #[arg(long, value_delimiter = ',', required = true)]
        win: Vec<Decimal>,
        /// Comma-separated lose percents
        #[arg(long, value_delimiter = ',', required = true)]
        lose: Vec<Decimal>,
        /// Number of ranked rows to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            symbol,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, symbol.as_deref(), output.as_deref())
            }
        }
        Command::Sweep {
            config,
            symbol,
            win,
            lose,
            top,
        } => run_sweep(&config, symbol.as_deref(), &win, &lose, top),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = TrailtraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Everything a run needs, built from a validated config.
struct RunSetup {
    evaluator: RuleEvaluator,
    fees: CommissionFees,
    bt_config: BacktestConfig,
    data_port: CsvAdapter,
}

fn prepare(config_path: &Path) -> Result<(FileConfigAdapter, RunSetup), ExitCode> {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    // Stage 2: Validate
    let setup = validate_backtest_config(&adapter)
        .and_then(|()| validate_rule_config(&adapter))
        .and_then(|()| {
            // Stage 3: Build rule, fees and backtest settings
            Ok(RunSetup {
                evaluator: RuleEvaluator::new(build_rule_config(&adapter)?)?,
                fees: build_fees(&adapter)?,
                bt_config: build_backtest_config(&adapter)?,
                data_port: CsvAdapter::new(data_dir(&adapter)),
            })
        })
        .map_err(|e| {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        })?;
    Ok((adapter, setup))
}

fn run_backtest(config_path: &Path, symbol_override: Option<&str>, output_path: Option<&Path>) -> ExitCode {
    let (adapter, setup) = match prepare(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    // Stage 4: Resolve symbols and output
    let symbols = resolve_symbols(symbol_override, &adapter);
    if symbols.is_empty() {
        eprintln!("error: no symbols configured");
        return ExitCode::from(2);
    }
    let output = output_path
        .map(Path::to_path_buf)
        .or_else(|| {
            adapter
                .get_string("report", "output_path")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
        });

    // Stages 5-8: Data port dependent pipeline
    run_backtest_pipeline(
        &setup.data_port,
        &setup.evaluator,
        &setup.fees,
        &setup.bt_config,
        &symbols,
        output.as_deref(),
    )
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, TrailtraderError> {
    let begin_time = read_time(adapter, "backtest", "begin_time")?.ok_or_else(|| {
        TrailtraderError::ConfigMissing {
            section: "backtest".into(),
            key: "begin_time".into(),
        }
    })?;
    let initial_cash = read_decimal(adapter, "backtest", "initial_cash")?.ok_or_else(|| {
        TrailtraderError::ConfigMissing {
            section: "backtest".into(),
            key: "initial_cash".into(),
        }
    })?;

    Ok(BacktestConfig {
        begin_time,
        end_time: read_time(adapter, "backtest", "end_time")?,
        initial_cash,
        currency: adapter
            .get_string("backtest", "currency")
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        entry_fill: read_parsed(adapter, "backtest", "entry_fill")?.unwrap_or_default(),
        exit_fill: read_parsed(adapter, "backtest", "exit_fill")?.unwrap_or_default(),
        affordability: read_parsed(adapter, "backtest", "affordability")?.unwrap_or_default(),
    })
}

pub fn build_fees(adapter: &dyn ConfigPort) -> Result<CommissionFees, TrailtraderError> {
    Ok(CommissionFees {
        buy_per_order: read_decimal(adapter, "fees", "buy_per_order")?
            .unwrap_or(DEFAULT_PER_ORDER_FEE),
        sell_per_order: read_decimal(adapter, "fees", "sell_per_order")?
            .unwrap_or(DEFAULT_PER_ORDER_FEE),
        commission_pct: read_decimal(adapter, "fees", "commission_pct")?
            .unwrap_or(DEFAULT_COMMISSION_PCT),
    })
}

pub fn build_rule_config(adapter: &dyn ConfigPort) -> Result<RuleConfig, TrailtraderError> {
    let missing = |key: &str| TrailtraderError::ConfigMissing {
        section: "rule".into(),
        key: key.into(),
    };

    Ok(RuleConfig {
        observation_offsets: read_list(adapter, "rule", "observation_offsets")?,
        threshold_percents: read_list(adapter, "rule", "threshold_percents")?,
        directions: read_list(adapter, "rule", "directions")?,
        quorum: usize::try_from(adapter.get_int("rule", "quorum", 0)).unwrap_or(0),
        profit_gap: read_decimal(adapter, "rule", "profit_gap")?.unwrap_or_default(),
        win_percent: read_decimal(adapter, "rule", "win_percent")?
            .ok_or_else(|| missing("win_percent"))?,
        lose_percent: read_decimal(adapter, "rule", "lose_percent")?
            .ok_or_else(|| missing("lose_percent"))?,
        exit_mode: read_parsed(adapter, "rule", "exit_mode")?
            .unwrap_or(ExitMode::TrailingFromExtreme),
    })
}

pub fn data_dir(adapter: &dyn ConfigPort) -> PathBuf {
    adapter
        .get_string("backtest", "data_dir")
        .filter(|s| !s.trim().is_empty())
        .map(|s| PathBuf::from(s.trim()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn resolve_symbols(symbol_override: Option<&str>, config: &dyn ConfigPort) -> Vec<String> {
    if let Some(s) = symbol_override {
        return vec![s.trim().to_uppercase()];
    }

    config
        .get_string("backtest", "symbols")
        .map(|symbols| {
            symbols
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// All bars up to `end_time`, including the warm-up history before
/// `begin_time` the observation offsets look back into.
fn fetch_history(
    data_port: &dyn DataPort,
    symbol: &str,
    bt_config: &BacktestConfig,
) -> Result<Vec<Bar>, TrailtraderError> {
    data_port.fetch_bars(symbol, NaiveDateTime::MIN, bt_config.end_time)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    evaluator: &RuleEvaluator,
    fees: &dyn FeeModel,
    bt_config: &BacktestConfig,
    symbols: &[String],
    output_path: Option<&Path>,
) -> ExitCode {
    // Stage 5: Fetch bars and replay each symbol
    let mut results: Vec<BacktestResult> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let bars = match fetch_history(data_port, symbol, bt_config) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Skipping symbol");
                continue;
            }
        };

        eprintln!(
            "Running backtest: {} ({} bars) from {}",
            symbol,
            bars.len(),
            bt_config.begin_time
        );
        match backtest_engine::run_backtest(symbol, &bars, evaluator, fees, bt_config) {
            Ok(result) => results.push(result),
            Err(e) => {
                if e.is_configuration() {
                    eprintln!("error: {symbol} rejected before replay: {e}");
                } else {
                    eprintln!("error: {e}");
                }
                return (&e).into();
            }
        }
    }

    if results.is_empty() {
        eprintln!("error: no symbols with data to backtest");
        return ExitCode::from(5);
    }

    // Stage 6: Print console summary to stderr
    for result in &results {
        print_summary(result);
    }

    // Stage 7: Write trade ledger
    if let Some(output) = output_path {
        let Some(output_str) = output.to_str() else {
            eprintln!("error: output path is not valid UTF-8");
            return ExitCode::from(1);
        };
        if let Err(e) = CsvLedgerWriter::new().write_all(&results, output_str) {
            eprintln!("error: failed to write trade ledger: {e}");
            return (&e).into();
        }
        eprintln!("\nTrade ledger written to: {}", output.display());
    }

    ExitCode::SUCCESS
}

fn print_summary(result: &BacktestResult) {
    let metrics = Metrics::compute(result);
    let pnl_sign = if metrics.net_pnl >= Decimal::ZERO { "+" } else { "" };

    eprintln!("\n=== {} ===", result.symbol);
    eprintln!("Bars Evaluated:   {}", result.bars_evaluated);
    eprintln!("Final Cash:       {}", metrics.final_cash.round_dp(2));
    eprintln!("Net P&L:          {}{}", pnl_sign, metrics.net_pnl.round_dp(2));
    eprintln!(
        "Total Return:     {}%",
        (metrics.total_return * Decimal::ONE_HUNDRED).round_dp(2)
    );
    eprintln!(
        "Max Drawdown:     -{}%",
        (metrics.max_drawdown * Decimal::ONE_HUNDRED).round_dp(1)
    );
    eprintln!("Buys / Sells:     {} / {}", metrics.buys, metrics.sells);
    eprintln!(
        "Win Rate:         {}% ({} won, {} lost, {} even)",
        (metrics.win_rate * Decimal::ONE_HUNDRED).round_dp(1),
        metrics.trades_won,
        metrics.trades_lost,
        metrics.trades_breakeven
    );
    eprintln!("Total Fees:       {}", metrics.total_fees.round_dp(2));
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    let (adapter, setup) = match prepare(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    print_rule(setup.evaluator.config());

    let symbols = resolve_symbols(None, &adapter);
    eprintln!("\nBacktest:");
    eprintln!("  symbols:       {}", symbols.join(", "));
    eprintln!("  data dir:      {}", data_dir(&adapter).display());
    eprintln!("  begin:         {}", setup.bt_config.begin_time);
    match setup.bt_config.end_time {
        Some(end) => eprintln!("  end:           {end}"),
        None => eprintln!("  end:           (all data)"),
    }
    eprintln!(
        "  initial cash:  {} {}",
        setup.bt_config.initial_cash, setup.bt_config.currency
    );
    eprintln!(
        "  fees:          buy {} / sell {} per order + {}%",
        setup.fees.buy_per_order, setup.fees.sell_per_order, setup.fees.commission_pct
    );

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn print_rule(rule: &RuleConfig) {
    eprintln!("\nBuy rule (quorum {} of {}):", rule.quorum, rule.observation_offsets.len());
    for point in rule.observation_points() {
        let side = if point.direction.sign() > 0 { "above" } else { "below" };
        eprintln!(
            "  price {} {}% of mean OHLC {} bars back",
            side, point.percent, point.offset
        );
    }
    eprintln!(
        "Exit: {}, win {}%, lose {}%, profit gap {}",
        rule.exit_mode, rule.win_percent, rule.lose_percent, rule.profit_gap
    );
}

fn run_sweep(
    config_path: &Path,
    symbol_override: Option<&str>,
    win_percents: &[Decimal],
    lose_percents: &[Decimal],
    top: usize,
) -> ExitCode {
    let (adapter, setup) = match prepare(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let symbols = resolve_symbols(symbol_override, &adapter);
    let Some(symbol) = symbols.first() else {
        eprintln!("error: no symbols configured");
        return ExitCode::from(2);
    };
    if symbols.len() > 1 {
        eprintln!("Sweeping first configured symbol {symbol} (use --symbol to choose)");
    }

    let bars = match fetch_history(&setup.data_port, symbol, &setup.bt_config) {
        Ok(bars) => bars,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let configs = sweep::exit_grid(setup.evaluator.config(), win_percents, lose_percents);
    eprintln!(
        "Sweeping {} configurations over {} bars of {}",
        configs.len(),
        bars.len(),
        symbol
    );

    let results = match sweep::run_sweep(symbol, &bars, &configs, &setup.fees, &setup.bt_config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    println!("rank,win_percent,lose_percent,final_cash,trades");
    for (rank, sweep_result) in results.iter().take(top).enumerate() {
        println!(
            "{},{},{},{},{}",
            rank + 1,
            sweep_result.config.win_percent,
            sweep_result.config.lose_percent,
            sweep_result.result.final_cash().round_dp(2),
            sweep_result.result.state.trade_records.len()
        );
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    if let Err(e) = validate_rule_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let evaluator = match build_rule_config(&adapter).and_then(RuleEvaluator::new) {
        Ok(ev) => ev,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    print_rule(evaluator.config());

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, symbol: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let data_port = CsvAdapter::new(data_dir(&config));
    let symbols = match symbol {
        Some(_) => resolve_symbols(symbol, &config),
        None => match data_port.list_symbols() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        },
    };

    print_data_ranges(&data_port, &symbols);
    ExitCode::SUCCESS
}

pub fn print_data_ranges(data_port: &dyn DataPort, symbols: &[String]) {
    if symbols.is_empty() {
        eprintln!("No symbols found");
    }
    for s in symbols {
        match data_port.get_data_range(s) {
            Ok(Some((first, last, count))) => {
                println!("{}: {} bars, {} to {}", s, count, first, last);
            }
            Ok(None) => {
                eprintln!("{}: no data found", s);
            }
            Err(e) => {
                eprintln!("error querying {}: {}", s, e);
            }
        }
    }
}
