//! Per-symbol holdings and the executed-fill records.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub currency: String,
    /// Quantity-weighted average purchase price of the shares still held,
    /// fees excluded. Zero exactly when `quantity` is zero.
    pub cost_price: Decimal,
}

impl Position {
    pub fn flat(symbol: &str, currency: &str) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity: Decimal::ZERO,
            currency: currency.to_string(),
            cost_price: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.quantity * (price - self.cost_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One executed fill. Never mutated after it is appended to a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub time: NaiveDateTime,
    pub price: Decimal,
    pub quantity: Decimal,
    pub direction: Side,
    pub symbol: String,
    pub fee: Decimal,
    /// `(price - cost_price) * quantity` for sells, zero for buys.
    pub realized_pnl: Decimal,
}

impl TradeRecord {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Signed cash movement caused by this fill, fee included.
    pub fn cash_delta(&self) -> Decimal {
        match self.direction {
            Side::Buy => -(self.notional() + self.fee),
            Side::Sell => self.notional() - self.fee,
        }
    }
}
