//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TrailtraderError;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), TrailtraderError>;

    /// Default implementation: writes each result to its own
    /// `<stem>_<symbol>.<ext>` path next to `output_path`.
    fn write_all(&self, results: &[BacktestResult], output_path: &str) -> Result<(), TrailtraderError> {
        if let [single] = results {
            return self.write(single, output_path);
        }
        for result in results {
            self.write(result, &per_symbol_path(output_path, &result.symbol))?;
        }
        Ok(())
    }
}

fn per_symbol_path(output_path: &str, symbol: &str) -> String {
    match output_path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
            format!("{stem}_{symbol}.{ext}")
        }
        _ => format!("{output_path}_{symbol}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_symbol_path_inserts_before_extension() {
        assert_eq!(per_symbol_path("out/trades.csv", "TSLL"), "out/trades_TSLL.csv");
        assert_eq!(per_symbol_path("trades", "TSLQ"), "trades_TSLQ");
        assert_eq!(per_symbol_path("./out/trades", "A"), "./out/trades_A");
    }
}
