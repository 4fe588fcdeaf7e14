//! Look-ahead contamination tests for the session loop.
//!
//! Invariants:
//! - An order never settles on the session that created it.
//! - Decisions made up to session t are identical whether or not the data
//!   continues past t. Any difference means something leaked future data.
//! - Strategies see only the current session's bars and never a daily-basic
//!   record dated after the current session.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use tplus_core::data::InMemoryMarketData;
use tplus_core::domain::{Bar, BarMap, DailyBasic, OrderSide};
use tplus_core::engine::{Backtest, BacktestResult, ExecutionContext, RunSettings};
use tplus_core::strategy::{LowPeRotation, MaCrossover, Strategy};

const SYMBOLS: [&str; 3] = ["600000.SH", "000001.SZ", "300750.SZ"];

/// Deterministic pseudo-random walk per symbol, in cents.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let base_date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut bars = Vec::with_capacity(n * SYMBOLS.len());
    for (s, symbol) in SYMBOLS.iter().enumerate() {
        let mut cents: i64 = 1_000 + 500 * s as i64;
        for i in 0..n {
            let seed = ((i + 31 * s) as u64)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let change = ((seed >> 33) % 61) as i64 - 30;
            cents = (cents + change).max(200);

            let open = Decimal::new(cents, 2);
            let close = Decimal::new(cents + change / 3, 2);
            bars.push(Bar {
                symbol: symbol.to_string(),
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + dec!(0.40),
                low: open.min(close) - dec!(0.40),
                close,
                volume: 100_000 + i as u64,
            });
        }
    }
    bars
}

fn make_daily_basic(bars: &[Bar]) -> Vec<DailyBasic> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let mut record = DailyBasic::new(bar.symbol.clone(), bar.date);
            record.pe_ttm = Some(5.0 + (i % 17) as f64);
            record
        })
        .collect()
}

fn settings(end: NaiveDate) -> RunSettings {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    RunSettings::new(start, end, SYMBOLS)
}

fn run(strategy: &mut dyn Strategy, settings: RunSettings, data: &InMemoryMarketData) -> BacktestResult {
    Backtest::new(settings, data).run(strategy).unwrap()
}

/// Order intents: what the strategy asked for, independent of outcome.
fn intents(result: &BacktestResult, before: NaiveDate) -> Vec<(NaiveDate, String, OrderSide, Decimal)> {
    result
        .orders
        .iter()
        .filter(|o| o.order_date < before)
        .map(|o| (o.order_date, o.symbol.clone(), o.side, o.quantity))
        .collect()
}

#[test]
fn fills_always_land_after_creation_session() {
    let data = InMemoryMarketData::new().with_bars(make_test_bars(200));
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    let result = run(&mut MaCrossover::new(3, 8, dec!(0.9)), settings(end), &data);

    assert!(result.filled_orders().count() > 0, "fixture produced no trades");
    for order in &result.orders {
        if let Some(fill_date) = order.fill_date {
            assert!(
                fill_date > order.order_date,
                "order {} settled on {} but was created on {}",
                order.id,
                fill_date,
                order.order_date
            );
        }
    }
}

#[test]
fn truncated_run_matches_full_run_prefix() {
    let data = InMemoryMarketData::new().with_bars(make_test_bars(200));
    let cutoff = NaiveDate::from_ymd_opt(2023, 4, 10).unwrap();
    let full_end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

    let truncated = run(&mut MaCrossover::new(3, 8, dec!(0.9)), settings(cutoff), &data);
    let full = run(&mut MaCrossover::new(3, 8, dec!(0.9)), settings(full_end), &data);

    assert!(!intents(&truncated, cutoff).is_empty());
    assert_eq!(intents(&truncated, cutoff), intents(&full, cutoff));

    let prefix = truncated.equity_curve.len();
    assert_eq!(
        &truncated.equity_curve[..],
        &full.equity_curve[..prefix],
        "equity diverged before the cutoff"
    );
}

#[test]
fn rotation_prefix_is_stable_with_daily_basic() {
    let bars = make_test_bars(120);
    let data = InMemoryMarketData::new()
        .with_daily_basic(make_daily_basic(&bars))
        .with_bars(bars);
    let cutoff = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
    let full_end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

    let truncated = run(
        &mut LowPeRotation::new(1, 5, dec!(0.9)),
        settings(cutoff).with_daily_basic(true),
        &data,
    );
    let full = run(
        &mut LowPeRotation::new(1, 5, dec!(0.9)),
        settings(full_end).with_daily_basic(true),
        &data,
    );

    assert!(!intents(&truncated, cutoff).is_empty());
    assert_eq!(intents(&truncated, cutoff), intents(&full, cutoff));
}

/// Records what the context exposes on every session.
#[derive(Default)]
struct ExposureLog {
    log: Arc<Mutex<Vec<String>>>,
}

impl Strategy for ExposureLog {
    fn name(&self) -> &str {
        "exposure_log"
    }

    fn on_bar(&mut self, ctx: &mut ExecutionContext, bars: &BarMap) -> anyhow::Result<()> {
        let now = ctx.now().ok_or_else(|| anyhow::anyhow!("no session"))?;
        let mut log = self.log.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;

        for bar in bars.values() {
            if bar.date != now {
                log.push(format!("{now}: saw bar dated {}", bar.date));
            }
        }
        for symbol in SYMBOLS {
            let tomorrow = now + chrono::Duration::days(1);
            if ctx.get_daily_basic(symbol, Some(tomorrow)).is_some() {
                log.push(format!("{now}: saw {symbol} daily basic for {tomorrow}"));
            }
            if let Some(record) = ctx.get_daily_basic(symbol, None) {
                if record.date != now {
                    log.push(format!("{now}: default lookup returned {}", record.date));
                }
            }
        }
        Ok(())
    }
}

#[test]
fn context_never_exposes_future_data() {
    let bars = make_test_bars(60);
    let data = InMemoryMarketData::new()
        .with_daily_basic(make_daily_basic(&bars))
        .with_bars(bars);
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut reader = ExposureLog { log: Arc::clone(&log) };
    let result = run(&mut reader, settings(end).with_daily_basic(true), &data);

    assert_eq!(result.session_count, 60);
    let violations = log.lock().unwrap();
    assert!(violations.is_empty(), "look-ahead: {violations:?}");
}

#[test]
fn past_daily_basic_is_reachable() {
    let bars = make_test_bars(10);
    let data = InMemoryMarketData::new()
        .with_daily_basic(make_daily_basic(&bars))
        .with_bars(bars);
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    let first = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();

    struct LooksBack {
        first: NaiveDate,
        misses: usize,
    }
    impl Strategy for LooksBack {
        fn name(&self) -> &str {
            "looks_back"
        }
        fn on_bar(&mut self, ctx: &mut ExecutionContext, _bars: &BarMap) -> anyhow::Result<()> {
            if ctx.get_daily_basic(SYMBOLS[0], Some(self.first)).is_none() {
                self.misses += 1;
            }
            Ok(())
        }
    }

    let mut strategy = LooksBack { first, misses: 0 };
    run(&mut strategy, settings(end).with_daily_basic(true), &data);
    assert_eq!(strategy.misses, 0);
}

#[test]
fn daily_basic_is_hidden_when_disabled() {
    let bars = make_test_bars(5);
    let data = InMemoryMarketData::new()
        .with_daily_basic(make_daily_basic(&bars))
        .with_bars(bars);
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    struct CountsRecords(Arc<Mutex<Vec<String>>>);
    impl Strategy for CountsRecords {
        fn name(&self) -> &str {
            "counts_records"
        }
        fn on_bar(&mut self, ctx: &mut ExecutionContext, _bars: &BarMap) -> anyhow::Result<()> {
            if ctx.get_daily_basic(SYMBOLS[0], None).is_some() {
                self.0.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push("seen".into());
            }
            Ok(())
        }
    }

    run(&mut CountsRecords(Arc::clone(&log)), settings(end), &data);
    assert!(log.lock().unwrap().is_empty());
}
