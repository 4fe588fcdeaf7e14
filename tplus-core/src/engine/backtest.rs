//! Session loop: drives a strategy across the trading calendar.
//!
//! Per session, strictly in this order:
//!
//! 1. Advance the context clock and install the session's bars
//! 2. Settle orders created on earlier sessions
//! 3. Mark positions at the session close
//! 4. Call `Strategy::on_bar`, only when at least one symbol has a bar
//! 5. Record the equity snapshot
//!
//! After the last session, leftover orders are cancelled and the result is
//! assembled. Positions already carry the last close they traded at.

use super::broker::{Broker, END_OF_RUN_REASON};
use super::context::{DailyBasicLookup, ExecutionContext};
use super::result::{BacktestResult, EquitySnapshot, StrategyFailure};
use super::settings::RunSettings;
use crate::data::MarketDataSource;
use crate::domain::bar::BarMap;
use crate::domain::daily_basic::DailyBasic;
use crate::strategy::Strategy;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal run errors. Anything that reaches here stops the run before or
/// instead of producing a result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no trading sessions between {start} and {end}")]
    EmptyCalendar { start: NaiveDate, end: NaiveDate },

    #[error("strategy '{strategy}' failed to initialize: {message}")]
    StrategyInit { strategy: String, message: String },
}

/// A preloaded, reusable backtest over one market-data snapshot.
pub struct Backtest {
    settings: Arc<RunSettings>,
    calendar: Vec<NaiveDate>,
    sessions: BTreeMap<NaiveDate, BarMap>,
    daily_basic: Option<DailyBasicLookup>,
}

impl Backtest {
    /// Load the calendar, every universe bar and (when enabled) the
    /// daily-basic records for the run window.
    pub fn new(settings: RunSettings, data: &dyn MarketDataSource) -> Self {
        let (start, end) = (settings.start_date, settings.end_date);
        let calendar = data.trading_calendar(start, end);

        let mut sessions: BTreeMap<NaiveDate, BarMap> = BTreeMap::new();
        for symbol in &settings.symbols {
            for bar in data.bars_for(symbol, start, end) {
                sessions
                    .entry(bar.date)
                    .or_default()
                    .insert(symbol.clone(), bar);
            }
        }

        let daily_basic = settings.use_daily_basic.then(|| {
            let mut store: BTreeMap<(String, NaiveDate), DailyBasic> = BTreeMap::new();
            for symbol in &settings.symbols {
                for date in &calendar {
                    if let Some(record) = data.daily_basic(symbol, *date) {
                        store.insert((symbol.clone(), *date), record);
                    }
                }
            }
            let store = Arc::new(store);
            let lookup: DailyBasicLookup = Arc::new(move |symbol: &str, date: NaiveDate| {
                store.get(&(symbol.to_string(), date)).cloned()
            });
            lookup
        });

        debug!(
            sessions = calendar.len(),
            bar_sessions = sessions.len(),
            daily_basic = daily_basic.is_some(),
            "backtest data preloaded"
        );

        Self {
            settings: Arc::new(settings),
            calendar,
            sessions,
            daily_basic,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    /// Run `strategy` over the whole calendar.
    pub fn run(&self, strategy: &mut dyn Strategy) -> Result<BacktestResult, EngineError> {
        let (Some(&first), Some(&last)) = (self.calendar.first(), self.calendar.last()) else {
            return Err(EngineError::EmptyCalendar {
                start: self.settings.start_date,
                end: self.settings.end_date,
            });
        };

        strategy
            .initialize(&self.settings)
            .map_err(|err| EngineError::StrategyInit {
                strategy: strategy.name().to_string(),
                message: format!("{err:#}"),
            })?;

        info!(
            strategy = strategy.name(),
            start = %first,
            end = %last,
            sessions = self.calendar.len(),
            symbols = self.settings.symbols.len(),
            "backtest started"
        );

        let broker = Broker::new(Arc::clone(&self.settings));
        let mut ctx = ExecutionContext::new(broker, Arc::clone(&self.settings));
        if let Some(lookup) = &self.daily_basic {
            ctx = ctx.with_daily_basic(Arc::clone(lookup));
        }

        let empty = BarMap::new();
        let mut equity_curve = Vec::with_capacity(self.calendar.len());
        let mut failures = Vec::new();

        for &session in &self.calendar {
            let bars = self.sessions.get(&session).unwrap_or(&empty);
            ctx.begin_session(session, bars.clone());
            ctx.sink_mut().settle(session, bars);
            ctx.sink_mut().refresh_valuations(bars);

            if bars.is_empty() {
                debug!(session = %session, "no bars this session, strategy skipped");
            } else if let Err(err) = strategy.on_bar(&mut ctx, bars) {
                let message = format!("{err:#}");
                warn!(session = %session, strategy = strategy.name(), error = %message, "strategy callback failed");
                failures.push(StrategyFailure { session, message });
            }

            let portfolio = ctx.portfolio();
            equity_curve.push(EquitySnapshot {
                session,
                cash: portfolio.cash,
                total_value: portfolio.total_value(),
            });
        }

        let mut broker = ctx.into_sink();
        let cancelled = broker.cancel_all(last, END_OF_RUN_REASON);

        let epsilon = self.settings.tolerances.fill_epsilon;
        let (portfolio, orders, audit_trail) = broker.into_parts();
        let result = BacktestResult::from_parts(
            strategy.name(),
            &portfolio,
            orders,
            audit_trail,
            equity_curve,
            failures,
            self.calendar.len(),
            epsilon,
        );

        info!(
            strategy = strategy.name(),
            total_value = %result.total_value,
            final_cash = %result.final_cash,
            orders = result.orders.len(),
            filled = result.filled_orders().count(),
            cancelled,
            strategy_failures = result.strategy_failures.len(),
            "backtest finished"
        );
        Ok(result)
    }
}
