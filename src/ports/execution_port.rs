//! Order execution port trait for live trading venues.

use crate::domain::error::TrailtraderError;
use crate::domain::position::{Position, Side, TradeRecord};
use rust_decimal::Decimal;

/// A brokerage or exchange accepting limit orders.
///
/// Implementations own their transport, timeouts and retries; failures
/// surface as [`TrailtraderError::Venue`].
pub trait ExecutionVenue {
    /// Submits a limit order and returns the venue's order id.
    fn submit_order(
        &self,
        symbol: &str,
        quantity: Decimal,
        limit_price: Decimal,
        side: Side,
    ) -> Result<String, TrailtraderError>;

    fn cancel_order(&self, order_id: &str) -> Result<(), TrailtraderError>;

    fn get_position(&self, symbol: &str) -> Result<Option<Position>, TrailtraderError>;

    /// Filled orders for `symbol` on `side`, oldest first.
    fn get_fill_history(&self, symbol: &str, side: Side) -> Result<Vec<TradeRecord>, TrailtraderError>;
}
