//! Single-step live decision against an [`ExecutionVenue`].
//!
//! Mirrors one bar of the backtest engine: a held position is checked for
//! exit first, and a buy is only considered when no sell was submitted.
//! Orders are limit orders offset from the last traded price by a
//! basis-point gap so they cross the spread.

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use super::bar::Bar;
use super::error::TrailtraderError;
use super::position::Side;
use super::rule_eval::{highest_high_since, RuleEvaluator};
use crate::ports::execution_port::ExecutionVenue;

const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

#[derive(Debug, Clone, PartialEq)]
pub struct LiveParams {
    pub buy_gap_bps: Decimal,
    pub sell_gap_bps: Decimal,
    pub min_buy_quantity: Decimal,
}

impl Default for LiveParams {
    fn default() -> Self {
        LiveParams {
            buy_gap_bps: Decimal::from(7),
            sell_gap_bps: Decimal::from(7),
            min_buy_quantity: Decimal::from(3),
        }
    }
}

/// Market view at decision time.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot<'a> {
    /// Completed bars, ascending. The bar being formed is not included.
    pub recent_bars: &'a [Bar],
    pub last_price: Decimal,
    pub now: NaiveDateTime,
    pub buying_power: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub order_id: String,
    pub side: Side,
    pub quantity: Decimal,
    pub limit_price: Decimal,
}

/// `last * (1 ± gap_bps / 10000)` rounded half-even to cents; buys go up,
/// sells go down.
pub fn limit_price(last_price: Decimal, gap_bps: Decimal, side: Side) -> Decimal {
    let ratio = gap_bps / BPS_DIVISOR;
    let factor = match side {
        Side::Buy => Decimal::ONE + ratio,
        Side::Sell => Decimal::ONE - ratio,
    };
    (last_price * factor).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Submits at most one order for `symbol` and returns it.
pub fn decide(
    evaluator: &RuleEvaluator,
    venue: &dyn ExecutionVenue,
    symbol: &str,
    market: MarketSnapshot<'_>,
    params: &LiveParams,
) -> Result<Option<SubmittedOrder>, TrailtraderError> {
    if let Some(order) = sell_if_needed(evaluator, venue, symbol, market, params)? {
        return Ok(Some(order));
    }
    buy_if_needed(evaluator, venue, symbol, market, params)
}

fn sell_if_needed(
    evaluator: &RuleEvaluator,
    venue: &dyn ExecutionVenue,
    symbol: &str,
    market: MarketSnapshot<'_>,
    params: &LiveParams,
) -> Result<Option<SubmittedOrder>, TrailtraderError> {
    let Some(position) = venue.get_position(symbol)? else {
        return Ok(None);
    };
    if position.quantity <= Decimal::ZERO {
        return Ok(None);
    }

    // without a recorded buy fill every bar counts as "since entry"
    let entry_time = venue
        .get_fill_history(symbol, Side::Buy)?
        .iter()
        .map(|fill| fill.time)
        .max()
        .or_else(|| market.recent_bars.first().map(|bar| bar.timestamp))
        .unwrap_or(market.now);

    // a fill inside the forming bar has no completed bar after it yet
    if let Err(TrailtraderError::InsufficientLookback { .. }) =
        highest_high_since(market.recent_bars, entry_time, market.now)
    {
        debug!(symbol, %entry_time, "Hold, no completed bar since entry");
        return Ok(None);
    }

    let sell = evaluator.should_sell(
        market.recent_bars,
        position.cost_price,
        entry_time,
        market.last_price,
        market.now,
        evaluator.config().exit_mode,
    )?;
    if !sell {
        return Ok(None);
    }

    let price = limit_price(market.last_price, params.sell_gap_bps, Side::Sell);
    submit(venue, symbol, position.quantity, price, Side::Sell).map(Some)
}

fn buy_if_needed(
    evaluator: &RuleEvaluator,
    venue: &dyn ExecutionVenue,
    symbol: &str,
    market: MarketSnapshot<'_>,
    params: &LiveParams,
) -> Result<Option<SubmittedOrder>, TrailtraderError> {
    let price = limit_price(market.last_price, params.buy_gap_bps, Side::Buy);
    if price <= Decimal::ZERO {
        return Ok(None);
    }
    let quantity = (market.buying_power / price).floor();
    if quantity <= Decimal::ZERO || quantity < params.min_buy_quantity {
        debug!(symbol, quantity = %quantity, "Buy skipped, quantity below minimum");
        return Ok(None);
    }

    let observation_index = market.recent_bars.len();
    if !evaluator.should_buy(market.recent_bars, market.last_price, observation_index)? {
        return Ok(None);
    }
    submit(venue, symbol, quantity, price, Side::Buy).map(Some)
}

fn submit(
    venue: &dyn ExecutionVenue,
    symbol: &str,
    quantity: Decimal,
    limit_price: Decimal,
    side: Side,
) -> Result<SubmittedOrder, TrailtraderError> {
    let order_id = venue.submit_order(symbol, quantity, limit_price, side)?;
    debug!(symbol, %side, quantity = %quantity, price = %limit_price, order_id = %order_id, "Order submitted");
    Ok(SubmittedOrder {
        order_id,
        side,
        quantity,
        limit_price,
    })
}
