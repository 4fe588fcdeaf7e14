//! End-to-end settlement scenarios through the full session loop.
//!
//! Each test scripts a strategy, runs it over a handful of hand-built bars and
//! checks orders and cash in the result snapshot.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tplus_core::data::InMemoryMarketData;
use tplus_core::domain::{Bar, BarMap, OrderSide, OrderStatus, RejectReason};
use tplus_core::engine::{
    Backtest, BacktestResult, CostModel, ExecutionContext, RunSettings, END_OF_RUN_REASON,
};
use tplus_core::strategy::Strategy;

// ── Helpers ──────────────────────────────────────────────────────────

type Step = Box<dyn FnMut(&mut ExecutionContext, &BarMap, usize) -> anyhow::Result<()> + Send>;

/// Strategy driven by a closure receiving the session index.
struct Scripted {
    session: usize,
    step: Step,
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_bar(&mut self, ctx: &mut ExecutionContext, bars: &BarMap) -> anyhow::Result<()> {
        let index = self.session;
        self.session += 1;
        (self.step)(ctx, bars, index)
    }
}

fn scripted(
    step: impl FnMut(&mut ExecutionContext, &BarMap, usize) -> anyhow::Result<()> + Send + 'static,
) -> Scripted {
    Scripted {
        session: 0,
        step: Box::new(step),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn bar(symbol: &str, d: u32, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
    Bar {
        symbol: symbol.into(),
        date: day(d),
        open,
        high,
        low,
        close,
        volume: 1_000_000,
    }
}

/// Open and close at `price`, range ±5%.
fn normal(symbol: &str, d: u32, price: Decimal) -> Bar {
    bar(symbol, d, price, price * dec!(1.05), price * dec!(0.95), price)
}

fn run(settings: RunSettings, bars: Vec<Bar>, strategy: &mut Scripted) -> BacktestResult {
    let data = InMemoryMarketData::new().with_bars(bars);
    Backtest::new(settings, &data).run(strategy).unwrap()
}

fn settings(symbols: &[&str]) -> RunSettings {
    RunSettings::new(day(1), day(31), symbols.iter().copied())
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn simple_fill_settles_next_session_at_open() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order_target_value("A", dec!(100000), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10)), normal("A", 4, dec!(10))],
        &mut strategy,
    );

    assert_eq!(result.orders.len(), 1);
    let order = &result.orders[0];
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.order_date, day(2));
    assert_eq!(order.fill_date, Some(day(3)));
    assert_eq!(order.filled_price, Some(dec!(10)));
    assert_eq!(order.filled_quantity, dec!(10000));
    assert_eq!(order.commission, dec!(30));
    assert_eq!(order.slippage, dec!(100));
    assert_eq!(order.tax, Decimal::ZERO);
    // 1,000,000 - 100,000 - 30 - 100
    assert_eq!(result.final_cash, dec!(899870));
    assert_eq!(result.position("A").unwrap().quantity, dec!(10000));
}

#[test]
fn order_is_pending_during_creation_session() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(100), None);
        }
        if i == 0 {
            let open = ctx.open_orders();
            anyhow::ensure!(open.len() == 1, "expected one pending order");
            anyhow::ensure!(open[0].status == OrderStatus::Pending);
            anyhow::ensure!(ctx.cash() == dec!(1000000), "cash moved before settlement");
        }
        if i == 1 {
            anyhow::ensure!(ctx.open_orders().is_empty(), "order still pending");
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10))],
        &mut strategy,
    );
    assert!(result.strategy_failures.is_empty(), "{:?}", result.strategy_failures);
}

#[test]
fn limit_up_rejection_leaves_cash_untouched() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(1000), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            normal("A", 2, dec!(10)),
            // opens pinned at the session high
            bar("A", 3, dec!(11), dec!(11), dec!(10.8), dec!(11)),
        ],
        &mut strategy,
    );

    let order = &result.orders[0];
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.reject_reason, Some(RejectReason::LimitUp));
    assert_eq!(order.filled_quantity, Decimal::ZERO);
    assert_eq!(result.final_cash, dec!(1000000));
}

#[test]
fn limit_down_rejection_keeps_position() {
    let mut strategy = scripted(|ctx, _, i| {
        match i {
            0 => {
                ctx.order("A", dec!(1000), None);
            }
            1 => {
                ctx.order_target("A", Decimal::ZERO, None);
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            // opens pinned at the session low
            bar("A", 4, dec!(9), dec!(9.2), dec!(9), dec!(9)),
        ],
        &mut strategy,
    );

    let sell = &result.orders[1];
    assert_eq!(sell.side, OrderSide::Sell);
    assert_eq!(sell.reject_reason, Some(RejectReason::LimitDown));
    assert_eq!(result.position("A").unwrap().quantity, dec!(1000));
}

#[test]
fn insufficient_funds_downsizes_buy() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(2000), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]).with_initial_capital(dec!(10000)),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10))],
        &mut strategy,
    );

    let order = &result.orders[0];
    assert_eq!(order.status, OrderStatus::Filled);
    assert!(order.filled_quantity < order.quantity);
    assert!(order.filled_quantity > dec!(990));
    assert!(result.final_cash >= Decimal::ZERO);
    assert_eq!(result.final_cash, dec!(10000) - order.total_cost());
}

#[test]
fn insufficient_funds_below_epsilon_rejects() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(10), None);
        }
        Ok(())
    });
    // Not even the minimum commission is affordable.
    let result = run(
        settings(&["A"]).with_initial_capital(dec!(4)),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10))],
        &mut strategy,
    );

    let order = &result.orders[0];
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(
        order.reject_reason,
        Some(RejectReason::InsufficientFundsOrPosition)
    );
    assert_eq!(result.final_cash, dec!(4));
}

#[test]
fn extreme_quantities_and_prices_never_abort_the_run() {
    let tiny = dec!(0.0000000000000000000001);
    let mut strategy = scripted(move |ctx, _, i| {
        match i {
            0 => {
                assert_eq!(ctx.order("A", Decimal::MAX, None), None);
                assert_eq!(ctx.order_value("A", dec!(10000000000), Some(tiny)), None);
                assert_eq!(ctx.order_target_percent("A", Decimal::MAX, None), None);
                // representable notional, far beyond the cash on hand
                assert!(ctx.order("A", dec!(1000000000000000000000000), None).is_some());
            }
            1 => {
                // one share at a price that makes the remaining holding unpriceable
                let limit = dec!(70000000000000000000000000000);
                assert!(ctx.order("A", dec!(-1), Some(limit)).is_some());
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]).with_initial_capital(dec!(10000)),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10)), normal("A", 4, dec!(10))],
        &mut strategy,
    );

    assert_eq!(result.orders.len(), 2);
    let buy = &result.orders[0];
    assert_eq!(buy.status, OrderStatus::Filled);
    assert!(buy.filled_quantity > dec!(990) && buy.filled_quantity < dec!(1000));

    let sell = &result.orders[1];
    assert_eq!(sell.reject_reason, Some(RejectReason::OutOfRange));
    assert_eq!(sell.settled_date, Some(day(4)));
    assert_eq!(result.position("A").map(|p| p.quantity), Some(buy.filled_quantity));
    assert_eq!(result.final_cash, dec!(10000) - buy.total_cost());
    assert_eq!(result.equity_curve.len(), 3);
}

#[test]
fn suspended_symbol_is_rejected() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(100), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A", "B"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("B", 2, dec!(20)),
            // A halted on the 3rd
            normal("B", 3, dec!(20)),
        ],
        &mut strategy,
    );

    let order = &result.orders[0];
    assert_eq!(order.reject_reason, Some(RejectReason::Suspended));
    assert_eq!(order.fill_date, None);
    assert_eq!(order.settled_date, Some(day(3)));
    assert_eq!(result.final_cash, dec!(1000000));
    assert!(result.position("A").is_none());
}

#[test]
fn oversell_is_clipped_and_never_shorts() {
    let mut strategy = scripted(|ctx, _, i| {
        match i {
            0 => {
                ctx.order("A", dec!(300), None);
            }
            1 => {
                ctx.order("A", dec!(-1000), None);
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(10)),
        ],
        &mut strategy,
    );

    let sell = &result.orders[1];
    assert_eq!(sell.status, OrderStatus::Filled);
    assert_eq!(sell.filled_quantity, dec!(300));
    assert!(result.position("A").is_none());
}

#[test]
fn round_trip_without_fees_restores_cash() {
    let mut strategy = scripted(|ctx, _, i| {
        match i {
            0 => {
                ctx.order("A", dec!(1000), None);
            }
            1 => {
                ctx.order_target("A", Decimal::ZERO, None);
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]).with_costs(CostModel::frictionless()),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(10)),
        ],
        &mut strategy,
    );

    assert_eq!(result.filled_orders().count(), 2);
    assert_eq!(result.final_cash, dec!(1000000));
}

#[test]
fn round_trip_with_fees_costs_both_legs() {
    let mut strategy = scripted(|ctx, _, i| {
        match i {
            0 => {
                ctx.order("A", dec!(1000), None);
            }
            1 => {
                ctx.order_target("A", Decimal::ZERO, None);
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(10)),
        ],
        &mut strategy,
    );

    let fees: Decimal = result.orders.iter().map(|o| o.fees()).sum();
    // buy: 5 min commission + 10 slippage; sell: 5 + 10 tax + 10 slippage
    assert_eq!(fees, dec!(40));
    assert_eq!(result.final_cash, dec!(1000000) - fees);
    assert_eq!(result.total_commission, dec!(10));
    assert_eq!(result.total_tax, dec!(10));
    assert_eq!(result.total_slippage, dec!(20));
}

#[test]
fn limit_buy_pays_at_most_the_limit() {
    let mut strategy = scripted(|ctx, _, i| {
        match i {
            0 => {
                ctx.order("A", dec!(100), Some(dec!(9.8)));
            }
            1 => {
                ctx.order("A", dec!(100), Some(dec!(12)));
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(10)),
        ],
        &mut strategy,
    );

    assert_eq!(result.orders[0].filled_price, Some(dec!(9.8)));
    assert_eq!(result.orders[0].reference_price, Some(dec!(9.8)));
    // open 10 is better than the 12 limit
    assert_eq!(result.orders[1].filled_price, Some(dec!(10)));
}

#[test]
fn market_order_reference_price_is_creation_close() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(100), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            bar("A", 2, dec!(10), dec!(10.6), dec!(9.9), dec!(10.4)),
            normal("A", 3, dec!(10.2)),
        ],
        &mut strategy,
    );

    assert_eq!(result.orders[0].reference_price, Some(dec!(10.4)));
    assert_eq!(result.orders[0].filled_price, Some(dec!(10.2)));
}

#[test]
fn orders_settle_in_creation_order() {
    // Sell first, then buy with the proceeds: only works if the sell settles
    // before the buy on the same session.
    let mut strategy = scripted(|ctx, _, i| {
        match i {
            0 => {
                ctx.order_target_percent("A", dec!(0.99), None);
            }
            1 => {
                ctx.order_target("A", Decimal::ZERO, None);
                ctx.order_value("B", dec!(900000), None);
            }
            _ => {}
        }
        Ok(())
    });
    let result = run(
        settings(&["A", "B"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("B", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("B", 3, dec!(10)),
            normal("A", 4, dec!(10)),
            normal("B", 4, dec!(10)),
        ],
        &mut strategy,
    );

    let buy_b = &result.orders[2];
    assert_eq!(buy_b.symbol, "B");
    assert_eq!(buy_b.status, OrderStatus::Filled);
    assert_eq!(buy_b.filled_quantity, dec!(90000));
}

#[test]
fn leftover_orders_are_cancelled_at_end() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 1 {
            ctx.order("A", dec!(100), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10))],
        &mut strategy,
    );

    let order = &result.orders[0];
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.cancel_reason.as_deref(), Some(END_OF_RUN_REASON));
    assert!(result.orders.iter().all(|o| o.status.is_terminal()));
}

#[test]
fn strategy_can_cancel_pending_order() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            let id = ctx.order("A", dec!(100), None);
            anyhow::ensure!(id.is_some_and(|id| ctx.cancel(id)), "cancel failed");
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![normal("A", 2, dec!(10)), normal("A", 3, dec!(10))],
        &mut strategy,
    );

    assert!(result.strategy_failures.is_empty());
    assert_eq!(result.orders[0].status, OrderStatus::Cancelled);
    assert_eq!(result.final_cash, dec!(1000000));
}

#[test]
fn strategy_errors_are_recorded_and_the_run_continues() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 1 {
            anyhow::bail!("signal blew up");
        }
        if i == 2 {
            ctx.order("A", dec!(10), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(10)),
            normal("A", 5, dec!(10)),
        ],
        &mut strategy,
    );

    assert_eq!(result.strategy_failures.len(), 1);
    assert_eq!(result.strategy_failures[0].session, day(3));
    assert!(result.strategy_failures[0].message.contains("signal blew up"));
    assert_eq!(result.orders[0].status, OrderStatus::Filled);
    assert_eq!(result.session_count, 4);
}

#[test]
fn orders_outside_universe_are_ignored() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            anyhow::ensure!(ctx.order("Z", dec!(10), None).is_none());
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]),
        vec![normal("A", 2, dec!(10)), normal("Z", 2, dec!(10))],
        &mut strategy,
    );
    assert!(result.strategy_failures.is_empty());
    assert!(result.orders.is_empty());
}

#[test]
fn positions_keep_last_price_while_halted() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(100), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A", "B"]),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(12)),
            // A halted on the 5th
            normal("B", 5, dec!(5)),
        ],
        &mut strategy,
    );

    let a = result.position("A").unwrap();
    assert_eq!(a.current_price, dec!(12));
    assert_eq!(a.market_value, dec!(1200));
    assert_eq!(a.unrealized_pnl, dec!(200));
}

#[test]
fn equity_curve_tracks_each_session() {
    let mut strategy = scripted(|ctx, _, i| {
        if i == 0 {
            ctx.order("A", dec!(1000), None);
        }
        Ok(())
    });
    let result = run(
        settings(&["A"]).with_costs(CostModel::frictionless()),
        vec![
            normal("A", 2, dec!(10)),
            normal("A", 3, dec!(10)),
            normal("A", 4, dec!(11)),
        ],
        &mut strategy,
    );

    let values: Vec<Decimal> = result.equity_curve.iter().map(|e| e.total_value).collect();
    assert_eq!(values, vec![dec!(1000000), dec!(1000000), dec!(1001000)]);
    assert_eq!(result.equity_curve[1].cash, dec!(990000));
}
