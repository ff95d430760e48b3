//! Simulation cash/position ledger and its two mutators.
//!
//! `buy` and `sell` are the only operations that change a
//! [`SimulationState`]. Every change appends a [`TradeRecord`], so the cash
//! balance can always be recomputed from `initial_cash` and the records.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::debug;

use super::bar::round_price;
use super::error::TrailtraderError;
use super::fees::FeeModel;
use super::position::{Position, Side, TradeRecord};

/// How a buy's quantity is reconciled with the fee and available cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AffordabilityPolicy {
    /// Estimate the fee once on the requested quantity, derive the share
    /// count from the cash left after that fee, then charge the fee of the
    /// executed quantity.
    #[default]
    ResidualCash,
    /// Charge the requested quantity's fee and refuse the whole order when
    /// cash does not cover it.
    AllOrNothing,
}

impl FromStr for AffordabilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "residual_cash" => Ok(AffordabilityPolicy::ResidualCash),
            "all_or_nothing" => Ok(AffordabilityPolicy::AllOrNothing),
            other => Err(format!(
                "affordability must be residual_cash or all_or_nothing, got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub initial_cash: Decimal,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub trade_records: Vec<TradeRecord>,
    pub begin_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
}

impl SimulationState {
    /// Starts with `initial_cash` and a flat position for every symbol.
    pub fn new(
        symbols: &[String],
        currency: &str,
        initial_cash: Decimal,
        begin_time: NaiveDateTime,
        end_time: Option<NaiveDateTime>,
    ) -> Self {
        let positions = symbols
            .iter()
            .map(|s| (s.clone(), Position::flat(s, currency)))
            .collect();
        SimulationState {
            initial_cash,
            cash: initial_cash,
            positions,
            trade_records: Vec::new(),
            begin_time,
            end_time,
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn held_quantity(&self, symbol: &str) -> Decimal {
        self.position(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total_quantity(&self) -> Decimal {
        self.positions.values().map(|p| p.quantity).sum()
    }

    /// Time of the latest Buy record for `symbol`.
    pub fn recent_buy_time(&self, symbol: &str) -> Option<NaiveDateTime> {
        self.trade_records
            .iter()
            .rev()
            .find(|r| r.symbol == symbol && r.direction == Side::Buy)
            .map(|r| r.time)
    }

    /// Cash recomputed from `initial_cash` and the trade records alone.
    pub fn replay_cash(&self) -> Decimal {
        self.initial_cash
            + self
                .trade_records
                .iter()
                .map(TradeRecord::cash_delta)
                .sum::<Decimal>()
    }

    pub fn total_equity(&self, price_map: &HashMap<String, Decimal>) -> Decimal {
        let position_value: Decimal = self
            .positions
            .values()
            .filter_map(|pos| price_map.get(&pos.symbol).map(|&p| pos.market_value(p)))
            .sum();
        self.cash + position_value
    }

    /// Buys up to `requested` whole shares at `fill_price`.
    ///
    /// Returns the executed quantity; zero means no trade took place.
    pub fn buy(
        &mut self,
        symbol: &str,
        requested: Decimal,
        fill_price: Decimal,
        time: NaiveDateTime,
        fees: &dyn FeeModel,
        policy: AffordabilityPolicy,
    ) -> Result<Decimal, TrailtraderError> {
        let requested = requested.floor();
        if requested <= Decimal::ZERO || fill_price <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        if !self.positions.contains_key(symbol) {
            return Err(unknown_symbol(symbol));
        }

        let (quantity, fee) = match policy {
            AffordabilityPolicy::ResidualCash => {
                let estimated_fee = fees.buy_fee(requested, fill_price);
                let residual = self.cash - estimated_fee;
                if residual <= Decimal::ZERO {
                    (Decimal::ZERO, Decimal::ZERO)
                } else {
                    let mut quantity = (residual / fill_price).floor().min(requested);
                    let mut fee = fees.buy_fee(quantity, fill_price);
                    while quantity > Decimal::ZERO && quantity * fill_price + fee > self.cash {
                        quantity -= Decimal::ONE;
                        fee = fees.buy_fee(quantity, fill_price);
                    }
                    (quantity, fee)
                }
            }
            AffordabilityPolicy::AllOrNothing => {
                let fee = fees.buy_fee(requested, fill_price);
                if requested * fill_price + fee > self.cash {
                    (Decimal::ZERO, Decimal::ZERO)
                } else {
                    (requested, fee)
                }
            }
        };

        if quantity <= Decimal::ZERO {
            debug!(
                symbol,
                requested = %requested,
                price = %fill_price,
                cash = %self.cash,
                "Insufficient cash for buy"
            );
            return Ok(Decimal::ZERO);
        }

        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| unknown_symbol(symbol))?;
        let held = position.quantity;
        position.cost_price =
            round_price((position.cost_price * held + fill_price * quantity) / (held + quantity));
        position.quantity = held + quantity;

        self.cash -= quantity * fill_price + fee;
        self.trade_records.push(TradeRecord {
            time,
            price: fill_price,
            quantity,
            direction: Side::Buy,
            symbol: symbol.to_string(),
            fee,
            realized_pnl: Decimal::ZERO,
        });

        debug!(
            symbol,
            quantity = %quantity,
            price = %fill_price,
            fee = %fee,
            cash = %self.cash,
            %time,
            "Buy filled"
        );
        Ok(quantity)
    }

    /// Sells `quantity` shares at `fill_price`.
    ///
    /// Returns `Ok(false)` for a non-positive quantity. Selling more than is
    /// held is a caller bug and reported as a ledger violation.
    ///
    /// A zero cost price implies a flat position only after a full exit; a
    /// partial sell at a gain may floor the remaining cost price at zero.
    pub fn sell(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        fill_price: Decimal,
        time: NaiveDateTime,
        fees: &dyn FeeModel,
    ) -> Result<bool, TrailtraderError> {
        if quantity <= Decimal::ZERO {
            return Ok(false);
        }
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| unknown_symbol(symbol))?;
        let held = position.quantity;
        if quantity > held {
            return Err(TrailtraderError::LedgerViolation {
                reason: format!("sell of {quantity} {symbol} exceeds held quantity {held}"),
            });
        }

        let realized_pnl = (fill_price - position.cost_price) * quantity;
        position.cost_price = if quantity == held {
            Decimal::ZERO
        } else {
            // linear cost stripping, not a lot model
            round_price((position.cost_price * held - fill_price * quantity) / (held - quantity))
                .max(Decimal::ZERO)
        };
        position.quantity = held - quantity;

        let fee = fees.sell_fee(quantity, fill_price);
        self.cash += quantity * fill_price - fee;
        self.trade_records.push(TradeRecord {
            time,
            price: fill_price,
            quantity,
            direction: Side::Sell,
            symbol: symbol.to_string(),
            fee,
            realized_pnl,
        });

        debug!(
            symbol,
            quantity = %quantity,
            price = %fill_price,
            fee = %fee,
            pnl = %realized_pnl,
            cash = %self.cash,
            %time,
            "Sell filled"
        );
        Ok(true)
    }
}

fn unknown_symbol(symbol: &str) -> TrailtraderError {
    TrailtraderError::LedgerViolation {
        reason: format!("no position registered for {symbol}"),
    }
}
