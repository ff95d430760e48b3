//! Performance metrics and statistics for a finished backtest.

use rust_decimal::Decimal;

use super::backtest::{BacktestResult, EquityPoint};
use super::position::Side;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_cash: Decimal,
    pub net_pnl: Decimal,
    /// Fraction of initial cash, e.g. 0.05 for +5 %.
    pub total_return: Decimal,
    pub buys: usize,
    pub sells: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: Decimal,
    pub total_fees: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub max_drawdown: Decimal,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let state = &result.state;
        let initial_cash = state.initial_cash;
        let final_cash = state.cash;
        let net_pnl = final_cash - initial_cash;

        let total_return = if initial_cash > Decimal::ZERO {
            net_pnl / initial_cash
        } else {
            Decimal::ZERO
        };

        let mut buys = 0usize;
        let mut sells = 0usize;
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_fees = Decimal::ZERO;
        let mut largest_win = Decimal::ZERO;
        let mut largest_loss = Decimal::ZERO;

        for record in &state.trade_records {
            total_fees += record.fee;
            if record.direction == Side::Buy {
                buys += 1;
                continue;
            }
            sells += 1;

            let pnl = record.realized_pnl;
            if pnl > Decimal::ZERO {
                trades_won += 1;
                largest_win = largest_win.max(pnl);
            } else if pnl < Decimal::ZERO {
                trades_lost += 1;
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
        }

        let win_rate = if sells > 0 {
            Decimal::from(trades_won) / Decimal::from(sells)
        } else {
            Decimal::ZERO
        };

        Metrics {
            final_cash,
            net_pnl,
            total_return,
            buys,
            sells,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            total_fees,
            largest_win,
            largest_loss,
            max_drawdown: compute_drawdown(&result.equity_curve),
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> Decimal {
    let Some(first) = equity_curve.first() else {
        return Decimal::ZERO;
    };

    let mut peak = first.equity;
    let mut max_dd = Decimal::ZERO;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > Decimal::ZERO {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    max_dd
}
