//! Transaction cost model.
//!
//! Fees are always charged on the quantity that was actually executed, never
//! on the quantity a caller asked for.

use rust_decimal::Decimal;

/// Maps an executed fill to its transaction cost.
pub trait FeeModel: Send + Sync {
    fn buy_fee(&self, quantity: Decimal, unit_price: Decimal) -> Decimal;
    fn sell_fee(&self, quantity: Decimal, unit_price: Decimal) -> Decimal;
}

/// Flat per-order commission plus a percentage of notional.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionFees {
    pub buy_per_order: Decimal,
    pub sell_per_order: Decimal,
    /// Percent of notional, e.g. `0.12` for 0.12 %.
    pub commission_pct: Decimal,
}

impl Default for CommissionFees {
    fn default() -> Self {
        CommissionFees {
            buy_per_order: Decimal::ZERO,
            sell_per_order: Decimal::ZERO,
            commission_pct: Decimal::ZERO,
        }
    }
}

impl CommissionFees {
    /// Same flat fee on both sides.
    pub fn symmetric(per_order: Decimal, commission_pct: Decimal) -> Self {
        CommissionFees {
            buy_per_order: per_order,
            sell_per_order: per_order,
            commission_pct,
        }
    }

    fn variable(&self, quantity: Decimal, unit_price: Decimal) -> Decimal {
        quantity * unit_price * self.commission_pct / Decimal::ONE_HUNDRED
    }
}

impl FeeModel for CommissionFees {
    fn buy_fee(&self, quantity: Decimal, unit_price: Decimal) -> Decimal {
        self.buy_per_order + self.variable(quantity, unit_price)
    }

    fn sell_fee(&self, quantity: Decimal, unit_price: Decimal) -> Decimal {
        self.sell_per_order + self.variable(quantity, unit_price)
    }
}
