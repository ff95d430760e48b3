//! Data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::TrailtraderError;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Bars for `symbol` with `start <= timestamp < end`, ascending.
    ///
    /// An empty range is `DataUnavailable`, never an empty vector.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, TrailtraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, TrailtraderError>;

    /// First and last timestamp plus bar count, or `None` when the symbol
    /// has no data.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, TrailtraderError>;
}
