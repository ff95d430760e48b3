//! Trade ledger export implementing ReportPort.
//!
//! One row per [`TradeRecord`](crate::domain::position::TradeRecord), in
//! execution order.

use crate::domain::backtest::BacktestResult;
use crate::domain::bar::TIMESTAMP_FORMAT;
use crate::domain::error::TrailtraderError;
use crate::ports::report_port::ReportPort;

const HEADER: [&str; 6] = ["time", "symbol", "direction", "price", "quantity", "fee"];

#[derive(Debug, Default)]
pub struct CsvLedgerWriter;

impl CsvLedgerWriter {
    pub fn new() -> Self {
        CsvLedgerWriter
    }
}

fn csv_error(output_path: &str, e: csv::Error) -> TrailtraderError {
    TrailtraderError::Io(std::io::Error::other(format!(
        "failed to write {output_path}: {e}"
    )))
}

impl ReportPort for CsvLedgerWriter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), TrailtraderError> {
        let mut wtr = csv::Writer::from_path(output_path).map_err(|e| csv_error(output_path, e))?;
        wtr.write_record(HEADER)
            .map_err(|e| csv_error(output_path, e))?;

        for record in &result.state.trade_records {
            wtr.write_record([
                record.time.format(TIMESTAMP_FORMAT).to_string(),
                record.symbol.clone(),
                record.direction.to_string(),
                record.price.to_string(),
                record.quantity.to_string(),
                record.fee.to_string(),
            ])
            .map_err(|e| csv_error(output_path, e))?;
        }

        wtr.flush()?;
        Ok(())
    }
}
