//! Execution context: the strategy's only window onto the engine.
//!
//! Strategies never touch the broker or portfolio directly. Every trade
//! request goes through [`ExecutionContext`], which resolves prices and
//! quantities and forwards the result to the injected [`OrderSink`]. The sink
//! is fixed at construction; the orchestrator only advances the clock.
//!
//! Malformed requests (empty symbol, zero quantity, non-positive price, no
//! resolvable price) return `None` instead of erroring, so strategy code can
//! treat `None` as "did not execute".

use crate::domain::bar::{Bar, BarMap};
use crate::domain::daily_basic::DailyBasic;
use crate::domain::ids::OrderId;
use crate::domain::order::Order;
use crate::domain::portfolio::Portfolio;
use crate::domain::position::Position;
use crate::engine::broker::Broker;
use crate::engine::execution::cost_model::truncate_quantity;
use crate::engine::settings::RunSettings;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Read-only accessor for preloaded daily-basic records.
pub type DailyBasicLookup = Arc<dyn Fn(&str, NaiveDate) -> Option<DailyBasic> + Send + Sync>;

/// A validated order request handed to the sink.
#[derive(Debug, Clone, Copy)]
pub struct OrderRequest<'a> {
    pub symbol: &'a str,
    /// Signed: positive buys, negative sells.
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub session: NaiveDate,
    /// The symbol's bar in the requesting session, if it traded.
    pub bar: Option<&'a Bar>,
}

/// The order-creation capability the context is wired to.
pub trait OrderSink {
    /// Create an order. `None` means no order was created.
    fn submit(&mut self, request: OrderRequest<'_>) -> Option<OrderId>;

    /// Cancel a still-pending order. Returns whether anything was cancelled.
    fn cancel(&mut self, id: OrderId, session: NaiveDate, reason: &str) -> bool;

    fn portfolio(&self) -> &Portfolio;

    /// Orders awaiting settlement, in creation order.
    fn open_orders(&self) -> Vec<&Order>;
}

/// A sink that accepts nothing. Useful for exercising strategies without an
/// engine behind them.
#[derive(Debug, Clone)]
pub struct NullSink {
    portfolio: Portfolio,
}

impl NullSink {
    pub fn new(portfolio: Portfolio) -> Self {
        Self { portfolio }
    }
}

impl OrderSink for NullSink {
    fn submit(&mut self, _request: OrderRequest<'_>) -> Option<OrderId> {
        None
    }

    fn cancel(&mut self, _id: OrderId, _session: NaiveDate, _reason: &str) -> bool {
        false
    }

    fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    fn open_orders(&self) -> Vec<&Order> {
        Vec::new()
    }
}

/// Per-run facade handed to `Strategy::on_bar`.
pub struct ExecutionContext<S: OrderSink = Broker> {
    sink: S,
    settings: Arc<RunSettings>,
    daily_basic: Option<DailyBasicLookup>,
    now: Option<NaiveDate>,
    bars: BarMap,
}

impl<S: OrderSink> fmt::Debug for ExecutionContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("now", &self.now)
            .field("symbols_with_bars", &self.bars.len())
            .field("daily_basic", &self.daily_basic.is_some())
            .finish()
    }
}

impl<S: OrderSink> ExecutionContext<S> {
    pub fn new(sink: S, settings: Arc<RunSettings>) -> Self {
        Self {
            sink,
            settings,
            daily_basic: None,
            now: None,
            bars: BarMap::new(),
        }
    }

    pub fn with_daily_basic(mut self, lookup: DailyBasicLookup) -> Self {
        self.daily_basic = Some(lookup);
        self
    }

    // ── Orchestrator hooks ────────────────────────────────────────────

    /// Advance the clock and install the session's bar snapshot.
    pub(crate) fn begin_session(&mut self, session: NaiveDate, bars: BarMap) {
        self.now = Some(session);
        self.bars = bars;
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub(crate) fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub(crate) fn into_sink(self) -> S {
        self.sink
    }

    // ── Read surface ──────────────────────────────────────────────────

    /// Current session, `None` before the first session begins.
    pub fn now(&self) -> Option<NaiveDate> {
        self.now
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.sink.portfolio()
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.sink.portfolio().position(symbol)
    }

    pub fn cash(&self) -> Decimal {
        self.sink.portfolio().cash
    }

    pub fn total_value(&self) -> Decimal {
        self.sink.portfolio().total_value()
    }

    /// This session's bar for `symbol`, if it traded.
    pub fn bar(&self, symbol: &str) -> Option<&Bar> {
        self.bars.get(symbol)
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.sink.open_orders()
    }

    /// Daily-basic record for `symbol` on `date` (default: current session).
    ///
    /// Dates after the current session return `None`.
    pub fn get_daily_basic(&self, symbol: &str, date: Option<NaiveDate>) -> Option<DailyBasic> {
        let lookup = self.daily_basic.as_ref()?;
        let now = self.now?;
        let date = date.unwrap_or(now);
        if date > now {
            return None;
        }
        lookup(symbol, date)
    }

    // ── Order API ─────────────────────────────────────────────────────

    /// Request a trade of `quantity` (positive buys, negative sells).
    ///
    /// `price` makes it a limit order. Returns `None` when the notional
    /// `quantity * reference price` does not fit in a `Decimal`.
    pub fn order(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Option<OrderId> {
        if symbol.is_empty() || quantity.is_zero() {
            return None;
        }
        if price.is_some_and(|p| p <= Decimal::ZERO) {
            return None;
        }
        if let Some(reference) = self.resolve_price(symbol, price) {
            quantity.checked_mul(reference)?;
        }
        let session = self.now?;
        let request = OrderRequest {
            symbol,
            quantity,
            limit_price: price,
            session,
            bar: self.bars.get(symbol),
        };
        self.sink.submit(request)
    }

    /// Trade toward an absolute position size. Deltas inside the configured
    /// epsilon are dropped.
    pub fn order_target(
        &mut self,
        symbol: &str,
        target: Decimal,
        price: Option<Decimal>,
    ) -> Option<OrderId> {
        let delta = target.checked_sub(self.sink.portfolio().quantity_of(symbol))?;
        if delta.abs() < self.settings.tolerances.order_target_epsilon {
            return None;
        }
        self.order(symbol, delta, price)
    }

    /// Trade `value` worth of `symbol` (negative value sells).
    pub fn order_value(
        &mut self,
        symbol: &str,
        value: Decimal,
        price: Option<Decimal>,
    ) -> Option<OrderId> {
        let resolved = self.resolve_price(symbol, price)?;
        let quantity = truncate_quantity(value.checked_div(resolved)?);
        self.order(symbol, quantity, price)
    }

    /// Trade toward holding `target_value` worth of `symbol`.
    pub fn order_target_value(
        &mut self,
        symbol: &str,
        target_value: Decimal,
        price: Option<Decimal>,
    ) -> Option<OrderId> {
        let resolved = self.resolve_price(symbol, price)?;
        let target = truncate_quantity(target_value.checked_div(resolved)?);
        self.order_target(symbol, target, price)
    }

    /// Trade `fraction` of total portfolio value (0.1 = 10%).
    pub fn order_percent(
        &mut self,
        symbol: &str,
        fraction: Decimal,
        price: Option<Decimal>,
    ) -> Option<OrderId> {
        let value = self.total_value().checked_mul(fraction)?;
        self.order_value(symbol, value, price)
    }

    /// Trade toward holding `fraction` of total portfolio value.
    pub fn order_target_percent(
        &mut self,
        symbol: &str,
        fraction: Decimal,
        price: Option<Decimal>,
    ) -> Option<OrderId> {
        let value = self.total_value().checked_mul(fraction)?;
        self.order_target_value(symbol, value, price)
    }

    /// Cancel a pending order.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        match self.now {
            Some(session) => self.sink.cancel(id, session, "cancelled by strategy"),
            None => false,
        }
    }

    /// Explicit price, else the position's last known price, else this
    /// session's close. `None` if nothing positive is available.
    fn resolve_price(&self, symbol: &str, explicit: Option<Decimal>) -> Option<Decimal> {
        let price = explicit
            .or_else(|| {
                self.position(symbol)
                    .map(|p| p.current_price)
                    .filter(|p| *p > Decimal::ZERO)
            })
            .or_else(|| self.bar(symbol).map(|b| b.close))?;
        (price > Decimal::ZERO).then_some(price)
    }
}
