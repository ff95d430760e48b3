//! Integration tests for the backtest core.
//!
//! Tests cover:
//! - Buy threshold, quorum boundary and trailing-exit scenarios
//! - Buy affordability under a fixed fee
//! - Full replay through a mock data port
//! - Determinism, finalization to cash and cash replay over generated series
//! - Parameter sweep ranking
//! - Live order decisions against a mock execution venue

mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trailtrader::domain::backtest::{run_backtest, EngineState};
use trailtrader::domain::fees::CommissionFees;
use trailtrader::domain::ledger::{AffordabilityPolicy, SimulationState};
use trailtrader::domain::metrics::Metrics;
use trailtrader::domain::position::Side;
use trailtrader::domain::rule_config::{Direction, ExitMode, RuleConfig};
use trailtrader::domain::rule_eval::RuleEvaluator;
use trailtrader::ports::data_port::DataPort;

mod scenarios {
    use super::*;

    #[test]
    fn buy_threshold_at_ninety_eight_percent() {
        let evaluator = RuleEvaluator::new(RuleConfig {
            observation_offsets: vec![5],
            threshold_percents: vec![dec!(98)],
            directions: vec![Direction::Below],
            quorum: 1,
            ..dip_rule_config()
        })
        .unwrap();
        // bar 0 averages to 100.00
        let mut bars = vec![make_bar(0, dec!(99), dec!(102), dec!(98), dec!(101))];
        bars.extend((1..6).map(|m| flat_bar(m, dec!(120))));

        assert!(evaluator.should_buy(&bars, dec!(97.50), 5).unwrap());
        assert!(!evaluator.should_buy(&bars, dec!(98.50), 5).unwrap());
    }

    #[test]
    fn quorum_boundary() {
        // boundaries 90, 95 and 99 over a flat 100 history
        let config = RuleConfig {
            observation_offsets: vec![1, 2, 3],
            threshold_percents: vec![dec!(90), dec!(95), dec!(99)],
            directions: vec![Direction::Below, Direction::Below, Direction::Below],
            quorum: 2,
            ..dip_rule_config()
        };
        let bars: Vec<Bar> = (0..4).map(|m| flat_bar(m, dec!(100))).collect();
        let evaluator = RuleEvaluator::new(config).unwrap();

        // below 99 only: one of three
        assert_eq!(evaluator.satisfied_conditions(&bars, dec!(96), 3).unwrap(), 1);
        assert!(!evaluator.should_buy(&bars, dec!(96), 3).unwrap());
        // below 99 and 95: two of three
        assert_eq!(evaluator.satisfied_conditions(&bars, dec!(94), 3).unwrap(), 2);
        assert!(evaluator.should_buy(&bars, dec!(94), 3).unwrap());
    }

    #[test]
    fn trailing_from_extreme_sell() {
        let evaluator = RuleEvaluator::new(RuleConfig {
            win_percent: dec!(97),
            lose_percent: dec!(99),
            ..dip_rule_config()
        })
        .unwrap();
        let bars = vec![
            flat_bar(0, dec!(100)),
            make_bar(1, dec!(104), dec!(110), dec!(103), dec!(108)),
            flat_bar(2, dec!(106)),
        ];

        // extreme 110 -> profit threshold 106.70
        let sell = evaluator
            .should_sell(&bars, dec!(100), minute(0), dec!(106), minute(2), ExitMode::TrailingFromExtreme)
            .unwrap();
        assert!(sell);
        let sell = evaluator
            .should_sell(&bars, dec!(100), minute(0), dec!(107), minute(2), ExitMode::TrailingFromExtreme)
            .unwrap();
        assert!(!sell);
    }

    #[test]
    fn buy_affordability_with_fixed_fee() {
        let mut state = SimulationState::new(&["TSLL".to_string()], "USD", dec!(1000), minute(0), None);
        let fees = CommissionFees::symmetric(dec!(1.5), Decimal::ZERO);

        let executed = state
            .buy("TSLL", dec!(25), dec!(50.25), minute(1), &fees, AffordabilityPolicy::ResidualCash)
            .unwrap();

        assert_eq!(executed, dec!(19));
        assert_eq!(state.cash, dec!(43.75));
        assert_eq!(state.trade_records[0].fee, dec!(1.5));
        assert_eq!(state.position("TSLL").unwrap().cost_price, dec!(50.25));
    }

    #[test]
    fn all_or_nothing_refuses_unaffordable_order() {
        let mut state = SimulationState::new(&["TSLL".to_string()], "USD", dec!(1000), minute(0), None);
        let fees = CommissionFees::symmetric(dec!(1.5), Decimal::ZERO);

        let executed = state
            .buy("TSLL", dec!(25), dec!(50.25), minute(1), &fees, AffordabilityPolicy::AllOrNothing)
            .unwrap();

        assert_eq!(executed, Decimal::ZERO);
        assert_eq!(state.cash, dec!(1000));
        assert!(state.trade_records.is_empty());
    }
}

mod full_backtest_pipeline {
    use super::*;

    #[test]
    fn replay_through_mock_data_port() {
        let port = MockDataPort::new().with_bars("TSLL", dip_and_pullback());
        let bars = port
            .fetch_bars("TSLL", chrono::NaiveDateTime::MIN, None)
            .unwrap();
        assert_eq!(bars.len(), 5);

        let result = run_backtest("TSLL", &bars, &dip_rule(), &CommissionFees::default(), &sample_config())
            .unwrap();

        assert_eq!(result.engine_state, EngineState::Finalized);
        assert_eq!(result.bars_evaluated, 3);
        let directions: Vec<Side> = result.state.trade_records.iter().map(|r| r.direction).collect();
        assert_eq!(directions, vec![Side::Buy, Side::Sell]);
        assert_eq!(result.final_cash(), dec!(960));

        let metrics = Metrics::compute(&result);
        assert_eq!(metrics.net_pnl, dec!(-40));
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.trades_won, 0);
    }

    #[test]
    fn fees_reduce_final_cash() {
        let fees = CommissionFees::symmetric(dec!(1), dec!(0.1));
        let result = run_backtest("TSLL", &dip_and_pullback(), &dip_rule(), &fees, &sample_config())
            .unwrap();

        let total_fees: Decimal = result.state.trade_records.iter().map(|r| r.fee).sum();
        assert!(total_fees > Decimal::ZERO);
        assert_eq!(result.state.replay_cash(), result.final_cash());
        assert!(result.final_cash() < dec!(960));
    }

    #[test]
    fn range_end_is_exclusive() {
        let port = MockDataPort::new().with_bars("TSLL", dip_and_pullback());
        let bars = port
            .fetch_bars("TSLL", chrono::NaiveDateTime::MIN, Some(minute(4)))
            .unwrap();
        assert_eq!(bars.len(), 4);

        // the pullback bar is cut off; the position is closed at 99
        let result = run_backtest("TSLL", &bars, &dip_rule(), &CommissionFees::default(), &sample_config())
            .unwrap();
        let last = result.state.trade_records.last().unwrap();
        assert_eq!(last.direction, Side::Sell);
        assert_eq!(last.price, dec!(99));
        assert_eq!(result.final_cash(), dec!(1015));
    }

    #[test]
    fn unknown_symbol_is_unavailable() {
        let port = MockDataPort::new();
        let err = port
            .fetch_bars("XYZ", chrono::NaiveDateTime::MIN, None)
            .unwrap_err();
        assert!(matches!(
            err,
            trailtrader::domain::error::TrailtraderError::DataUnavailable { .. }
        ));
    }
}

mod generated_series {
    use super::*;

    fn sweep_fees() -> CommissionFees {
        CommissionFees::symmetric(dec!(1.01), dec!(0.12))
    }

    #[test]
    fn runs_are_deterministic() {
        let bars = generate_bars(200, dec!(20), 7);
        let a = run_backtest("TSLL", &bars, &dip_rule(), &sweep_fees(), &sample_config()).unwrap();
        let b = run_backtest("TSLL", &bars, &dip_rule(), &sweep_fees(), &sample_config()).unwrap();

        assert_eq!(a.state.trade_records, b.state.trade_records);
        assert_eq!(a.final_cash(), b.final_cash());
        assert_eq!(a.equity_curve, b.equity_curve);
    }

    #[test]
    fn every_run_ends_flat_with_replayable_cash() {
        for period in [3, 5, 7, 11] {
            let bars = generate_bars(120, dec!(15), period);
            let result =
                run_backtest("TSLL", &bars, &dip_rule(), &sweep_fees(), &sample_config()).unwrap();

            assert!(!result.state.trade_records.is_empty(), "period {period} never traded");
            assert!(result.state.position("TSLL").unwrap().is_flat());
            assert_eq!(result.state.replay_cash(), result.final_cash());
            assert_eq!(result.equity_curve.last().unwrap().equity, result.final_cash());
        }
    }

    #[test]
    fn trailing_from_entry_also_ends_flat() {
        let evaluator = RuleEvaluator::new(RuleConfig {
            win_percent: dec!(101),
            lose_percent: dec!(97),
            exit_mode: ExitMode::TrailingFromEntry,
            ..dip_rule_config()
        })
        .unwrap();
        let bars = generate_bars(120, dec!(15), 6);
        let result = run_backtest("TSLL", &bars, &evaluator, &sweep_fees(), &sample_config()).unwrap();

        assert!(result.state.position("TSLL").unwrap().is_flat());
        assert_eq!(result.state.replay_cash(), result.final_cash());
    }
}

mod sweep {
    use super::*;
    use trailtrader::domain::sweep::{exit_grid, run_sweep};

    #[test]
    fn sweep_ranks_by_final_cash() {
        let bars = generate_bars(150, dec!(20), 9);
        let configs = exit_grid(&dip_rule_config(), &[dec!(96), dec!(98)], &[dec!(90), dec!(95)]);
        let fees = CommissionFees::default();

        let results = run_sweep("TSLL", &bars, &configs, &fees, &sample_config()).unwrap();

        assert_eq!(results.len(), 4);
        for pair in results.windows(2) {
            assert!(pair[0].result.final_cash() >= pair[1].result.final_cash());
        }
        for r in &results {
            let single = run_backtest(
                "TSLL",
                &bars,
                &RuleEvaluator::new(configs[r.config_index].clone()).unwrap(),
                &fees,
                &sample_config(),
            )
            .unwrap();
            assert_eq!(single.final_cash(), r.result.final_cash());
        }
    }
}

mod live {
    use super::*;
    use chrono::NaiveDateTime;
    use std::cell::RefCell;
    use trailtrader::domain::error::TrailtraderError;
    use trailtrader::domain::live::{decide, LiveParams, MarketSnapshot};
    use trailtrader::domain::position::{Position, TradeRecord};
    use trailtrader::ports::execution_port::ExecutionVenue;

    struct PaperVenue {
        position: Option<Position>,
        fills: Vec<TradeRecord>,
        submitted: RefCell<Vec<(Decimal, Decimal, Side)>>,
    }

    impl PaperVenue {
        fn flat() -> Self {
            PaperVenue {
                position: None,
                fills: Vec::new(),
                submitted: RefCell::new(Vec::new()),
            }
        }
    }

    impl ExecutionVenue for PaperVenue {
        fn submit_order(
            &self,
            _symbol: &str,
            quantity: Decimal,
            limit_price: Decimal,
            side: Side,
        ) -> Result<String, TrailtraderError> {
            let mut submitted = self.submitted.borrow_mut();
            submitted.push((quantity, limit_price, side));
            Ok(format!("paper-{}", submitted.len()))
        }

        fn cancel_order(&self, _order_id: &str) -> Result<(), TrailtraderError> {
            Ok(())
        }

        fn get_position(&self, _symbol: &str) -> Result<Option<Position>, TrailtraderError> {
            Ok(self.position.clone())
        }

        fn get_fill_history(&self, _symbol: &str, side: Side) -> Result<Vec<TradeRecord>, TrailtraderError> {
            Ok(self.fills.iter().filter(|f| f.direction == side).cloned().collect())
        }
    }

    fn snapshot(bars: &[Bar], last_price: Decimal, now: NaiveDateTime) -> MarketSnapshot<'_> {
        MarketSnapshot {
            recent_bars: bars,
            last_price,
            now,
            buying_power: dec!(1000),
        }
    }

    #[test]
    fn backtest_rule_drives_live_buy() {
        let bars: Vec<Bar> = (0..3).map(|m| flat_bar(m, dec!(100))).collect();
        let venue = PaperVenue::flat();

        let order = decide(
            &dip_rule(),
            &venue,
            "TSLL",
            snapshot(&bars, dec!(97), minute(3)),
            &LiveParams::default(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(order.side, Side::Buy);
        // 97 * 1.0007 = 97.0679 -> 97.07; floor(1000 / 97.07) = 10
        assert_eq!(order.limit_price, dec!(97.07));
        assert_eq!(order.quantity, dec!(10));
        assert_eq!(order.order_id, "paper-1");
        assert_eq!(venue.submitted.borrow().len(), 1);
    }

    #[test]
    fn held_position_sells_before_buying() {
        let bars = vec![
            flat_bar(0, dec!(100)),
            flat_bar(1, dec!(100)),
            make_bar(2, dec!(100), dec!(110), dec!(100), dec!(108)),
        ];
        let venue = PaperVenue {
            position: Some(Position {
                symbol: "TSLL".into(),
                quantity: dec!(5),
                currency: "USD".into(),
                cost_price: dec!(100),
            }),
            fills: vec![TradeRecord {
                time: minute(1),
                price: dec!(100),
                quantity: dec!(5),
                direction: Side::Buy,
                symbol: "TSLL".into(),
                fee: Decimal::ZERO,
                realized_pnl: Decimal::ZERO,
            }],
            submitted: RefCell::new(Vec::new()),
        };

        // not in profit: 95 % of extreme 110 is 104.50; 97 would also satisfy the buy rule
        let order = decide(
            &dip_rule(),
            &venue,
            "TSLL",
            snapshot(&bars, dec!(97), minute(3)),
            &LiveParams::default(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.quantity, dec!(5));
        assert_eq!(venue.submitted.borrow().len(), 1);
    }
}
