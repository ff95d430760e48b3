//! CSV file data adapter.
//!
//! One file per symbol, `<base_path>/<SYMBOL>.csv`. Columns are located by
//! header name so files exported with extra or reordered columns load
//! unchanged.

use crate::domain::bar::{parse_timestamp, Bar};
use crate::domain::error::TrailtraderError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;

const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "time", "datetime", "date"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

/// Header positions of the columns a [`Bar`] is built from.
struct ColumnMap {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, TrailtraderError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| TrailtraderError::DataRead {
                reason: format!("missing {name} column"),
            })
        };

        let timestamp = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|&name| find(name))
            .ok_or_else(|| TrailtraderError::DataRead {
                reason: "missing timestamp column".into(),
            })?;

        Ok(ColumnMap {
            timestamp,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find("volume"),
        })
    }

    fn bar(&self, record: &csv::StringRecord, line: u64) -> Result<Bar, TrailtraderError> {
        let raw = record.get(self.timestamp).unwrap_or("");
        let timestamp = parse_timestamp(raw).ok_or_else(|| TrailtraderError::DataRead {
            reason: format!("line {line}: invalid timestamp '{raw}'"),
        })?;
        let volume = match self.volume.and_then(|i| record.get(i)) {
            Some(v) if !v.trim().is_empty() => {
                v.trim().parse().map_err(|e| TrailtraderError::DataRead {
                    reason: format!("line {line}: invalid volume value: {e}"),
                })?
            }
            _ => 0,
        };

        Ok(Bar {
            timestamp,
            open: price(record, self.open, "open", line)?,
            high: price(record, self.high, "high", line)?,
            low: price(record, self.low, "low", line)?,
            close: price(record, self.close, "close", line)?,
            volume,
        })
    }
}

fn price(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: u64,
) -> Result<Decimal, TrailtraderError> {
    let raw = record.get(index).ok_or_else(|| TrailtraderError::DataRead {
        reason: format!("line {line}: missing {name} column"),
    })?;
    Decimal::from_str(raw.trim()).map_err(|e| TrailtraderError::DataRead {
        reason: format!("line {line}: invalid {name} value: {e}"),
    })
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Every bar in the symbol's file, ascending by timestamp. Duplicate
    /// timestamps are kept for the engine to reject.
    fn read_all(&self, symbol: &str) -> Result<Vec<Bar>, TrailtraderError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrailtraderError::DataUnavailable {
                symbol: symbol.to_string(),
            },
            _ => TrailtraderError::DataRead {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| TrailtraderError::DataRead {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?;
        let columns = ColumnMap::from_headers(headers)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| TrailtraderError::DataRead {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            bars.push(columns.bar(&record, line)?);
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, TrailtraderError> {
        let bars: Vec<Bar> = self
            .read_all(symbol)?
            .into_iter()
            .filter(|b| b.timestamp >= start && end.is_none_or(|end| b.timestamp < end))
            .collect();

        if bars.is_empty() {
            return Err(TrailtraderError::DataUnavailable {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrailtraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TrailtraderError::DataRead {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TrailtraderError::DataRead {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, TrailtraderError> {
        let bars = match self.read_all(symbol) {
            Ok(bars) => bars,
            Err(TrailtraderError::DataUnavailable { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, bars.len())),
            _ => None,
        })
    }
}
