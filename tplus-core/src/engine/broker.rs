//! Broker: order creation, matching and settlement.
//!
//! The broker owns the portfolio and every order of a run. Orders enter
//! `Pending` through [`OrderSink::submit`] and leave the pending map exactly
//! once, as `Filled`, `Rejected` or `Cancelled`.
//!
//! Under [`SettlementPolicy::NextSession`] an order created on session T is
//! matched on the first session strictly after T, in creation order:
//!
//! 1. No bar for the symbol: rejected as suspended.
//! 2. Candidate price from the open (limit-adjusted).
//! 3. Price pinned at the session high (buy) or low (sell): rejected.
//! 4. Buys are sized down to what cash covers including fees; sells are
//!    clipped to the held quantity. Dust is rejected, and so is any fill
//!    that would leave cash negative.
//! 5. Fees are computed on the actual fill and booked into the portfolio.
//!
//! Under [`SettlementPolicy::Immediate`] the same steps run inside `submit`
//! against the current session's close, minus the price-limit check and the
//! holding clip, so shorts are possible.

use crate::domain::bar::{Bar, BarMap};
use crate::domain::ids::{IdGen, OrderId};
use crate::domain::order::{
    Order, OrderAuditEntry, OrderError, OrderSide, OrderStatus, RejectReason,
};
use crate::domain::portfolio::Portfolio;
use crate::domain::position::Position;
use crate::engine::context::{OrderRequest, OrderSink};
use crate::engine::execution::{candidate_price, limit_rejection, FeeSchedule, FillTiming};
use crate::engine::settings::{RunSettings, SettlementPolicy};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reason recorded on orders still pending when the run ends.
pub const END_OF_RUN_REASON: &str = "backtest ended";

/// Counts from one settlement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementSummary {
    pub filled: usize,
    pub rejected: usize,
}

impl SettlementSummary {
    pub fn settled(&self) -> usize {
        self.filled + self.rejected
    }

    fn count(&mut self, status: OrderStatus) {
        match status {
            OrderStatus::Filled => self.filled += 1,
            OrderStatus::Rejected => self.rejected += 1,
            _ => {}
        }
    }
}

/// Matching and settlement engine for one run.
#[derive(Debug)]
pub struct Broker {
    settings: Arc<RunSettings>,
    fees: FeeSchedule,
    portfolio: Portfolio,
    ids: IdGen,
    /// Orders awaiting settlement, keyed (and so ordered) by creation.
    pending: BTreeMap<OrderId, Order>,
    /// Terminal orders.
    completed: BTreeMap<OrderId, Order>,
    audit_trail: Vec<OrderAuditEntry>,
}

impl Broker {
    pub fn new(settings: Arc<RunSettings>) -> Self {
        Self {
            fees: settings.fee_schedule(),
            portfolio: Portfolio::new(settings.initial_capital),
            settings,
            ids: IdGen::default(),
            pending: BTreeMap::new(),
            completed: BTreeMap::new(),
            audit_trail: Vec::new(),
        }
    }

    // ── Public API ─────────────────────────────────────────────────────

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn pending(&self) -> impl Iterator<Item = &Order> + '_ {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Terminal orders in creation order.
    pub fn completed(&self) -> impl Iterator<Item = &Order> + '_ {
        self.completed.values()
    }

    /// Look up an order in either map.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.pending.get(&id).or_else(|| self.completed.get(&id))
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    pub fn orders_issued(&self) -> u64 {
        self.ids.issued()
    }

    /// Match every pending order created before `session` against that
    /// session's bars.
    pub fn settle(&mut self, session: NaiveDate, bars: &BarMap) -> SettlementSummary {
        let due: Vec<OrderId> = self
            .pending
            .iter()
            .filter(|(_, order)| order.order_date < session)
            .map(|(id, _)| *id)
            .collect();

        let mut summary = SettlementSummary::default();
        for id in due {
            let Some(order) = self.pending.remove(&id) else {
                continue;
            };
            let bar = bars.get(order.symbol.as_str());
            let status = self.execute(order, bar, session, FillTiming::NextOpen);
            summary.count(status);
        }
        if summary.settled() > 0 {
            debug!(
                session = %session,
                filled = summary.filled,
                rejected = summary.rejected,
                "settlement complete"
            );
        }
        summary
    }

    /// Mark every symbol that traded this session at its close. Symbols
    /// without a bar keep their last price.
    pub fn refresh_valuations(&mut self, bars: &BarMap) {
        for (symbol, bar) in bars {
            self.portfolio.refresh_valuation(symbol, bar.close);
        }
    }

    /// Cancel everything still pending.
    pub fn cancel_all(&mut self, session: NaiveDate, reason: &str) -> usize {
        let ids: Vec<OrderId> = self.pending.keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.cancel_pending(*id, session, reason))
            .count()
    }

    /// Consume the broker, returning the final portfolio, terminal orders and
    /// the audit trail.
    pub fn into_parts(self) -> (Portfolio, Vec<Order>, Vec<OrderAuditEntry>) {
        let mut orders: Vec<Order> = self.completed.into_values().collect();
        orders.extend(self.pending.into_values());
        orders.sort_by_key(|o| o.id);
        (self.portfolio, orders, self.audit_trail)
    }

    // ── Matching ───────────────────────────────────────────────────────

    /// Run one pending order to a terminal state and file it.
    fn execute(
        &mut self,
        mut order: Order,
        bar: Option<&Bar>,
        session: NaiveDate,
        timing: FillTiming,
    ) -> OrderStatus {
        if let Err(err) = self.match_order(&mut order, bar, session, timing) {
            warn!(order_id = %order.id, error = %err, "order transition refused");
        }
        let reason = match order.status {
            OrderStatus::Filled => format!(
                "filled {} @ {}",
                order.filled_quantity,
                order.filled_price.unwrap_or_default()
            ),
            OrderStatus::Rejected => order
                .reject_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        debug!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            status = %order.status,
            reason = %reason,
            "order settled"
        );
        let status = order.status;
        self.record_audit(order.id, session, OrderStatus::Pending, status, reason);
        self.completed.insert(order.id, order);
        status
    }

    fn match_order(
        &mut self,
        order: &mut Order,
        bar: Option<&Bar>,
        session: NaiveDate,
        timing: FillTiming,
    ) -> Result<(), OrderError> {
        let Some(bar) = bar else {
            return order.reject(RejectReason::Suspended, session);
        };

        let price = candidate_price(order.side, order.limit_price, timing.base_price(bar));
        if timing == FillTiming::NextOpen {
            if let Some(reason) =
                limit_rejection(order.side, price, bar, &self.settings.price_limits)
            {
                return order.reject(reason, session);
            }
        }

        let quantity = self.fillable_quantity(order, price, timing);
        if quantity < self.settings.tolerances.fill_epsilon {
            return order.reject(RejectReason::InsufficientFundsOrPosition, session);
        }
        let Some((gross, fees)) =
            self.fees.checked_costs(order.side, quantity, price, order.is_limit())
        else {
            return order.reject(RejectReason::OutOfRange, session);
        };
        let cash = self.portfolio.cash;
        let cash_after = fees.checked_total().and_then(|total| match order.side {
            OrderSide::Buy => cash.checked_sub(gross)?.checked_sub(total),
            // a tiny sell can cost more in minimum commission than it raises
            OrderSide::Sell => cash.checked_add(gross)?.checked_sub(total),
        });
        let signed = quantity * order.side.sign();
        let position_fits = match self.portfolio.position(&order.symbol) {
            Some(position) => position.can_trade(signed, price),
            None => Position::empty(order.symbol.as_str()).can_trade(signed, price),
        };
        let Some(cash_after) = cash_after.filter(|_| position_fits) else {
            return order.reject(RejectReason::OutOfRange, session);
        };
        if cash_after < Decimal::ZERO {
            return order.reject(RejectReason::InsufficientFundsOrPosition, session);
        }

        order.fill(quantity, price, session)?;
        order.set_fees(fees);
        self.portfolio.apply_fill(order);
        Ok(())
    }

    /// Quantity the order can actually trade at `price`.
    fn fillable_quantity(&self, order: &Order, price: Decimal, timing: FillTiming) -> Decimal {
        match order.side {
            OrderSide::Buy => {
                let cash = self.portfolio.cash;
                let requested = order.quantity;
                let fits = self
                    .fees
                    .checked_costs(order.side, requested, price, order.is_limit())
                    .and_then(|(gross, fees)| gross.checked_add(fees.checked_total()?))
                    .is_some_and(|cost| cost <= cash);
                if fits {
                    requested
                } else {
                    let affordable = self
                        .fees
                        .affordable_quantity(cash, price, order.is_limit());
                    requested.min(affordable)
                }
            }
            OrderSide::Sell => match timing {
                FillTiming::NextOpen => {
                    let held = self.portfolio.quantity_of(&order.symbol).max(Decimal::ZERO);
                    order.quantity.min(held)
                }
                FillTiming::SameClose => order.quantity,
            },
        }
    }

    fn cancel_pending(&mut self, id: OrderId, session: NaiveDate, reason: &str) -> bool {
        let Some(mut order) = self.pending.remove(&id) else {
            return false;
        };
        if let Err(err) = order.cancel(reason) {
            warn!(order_id = %id, error = %err, "cancel refused");
        }
        debug!(order_id = %id, symbol = %order.symbol, reason, "order cancelled");
        self.record_audit(id, session, OrderStatus::Pending, order.status, reason.to_string());
        self.completed.insert(id, order);
        true
    }

    fn record_audit(
        &mut self,
        order_id: OrderId,
        session: NaiveDate,
        from_status: OrderStatus,
        to_status: OrderStatus,
        reason: String,
    ) {
        self.audit_trail.push(OrderAuditEntry {
            order_id,
            session,
            from_status,
            to_status,
            reason,
        });
    }
}

impl OrderSink for Broker {
    fn submit(&mut self, request: OrderRequest<'_>) -> Option<OrderId> {
        if !self.settings.in_universe(request.symbol) {
            debug!(symbol = request.symbol, "order outside universe ignored");
            return None;
        }
        if request.limit_price.is_some_and(|p| p <= Decimal::ZERO) {
            return None;
        }
        let (side, quantity) = if request.quantity > Decimal::ZERO {
            (OrderSide::Buy, request.quantity)
        } else if request.quantity < Decimal::ZERO {
            (OrderSide::Sell, request.quantity.abs())
        } else {
            return None;
        };

        let id = self.ids.next_order_id();
        let mut order = Order::new(
            id,
            request.symbol,
            side,
            quantity,
            request.limit_price,
            request.session,
        );
        order.reference_price = request.limit_price.or(request.bar.map(|b| b.close));
        debug!(
            order_id = %id,
            symbol = request.symbol,
            side = %side,
            quantity = %quantity,
            session = %request.session,
            "order created"
        );

        match self.settings.settlement {
            SettlementPolicy::NextSession => {
                self.pending.insert(id, order);
            }
            SettlementPolicy::Immediate => {
                self.execute(order, request.bar, request.session, FillTiming::SameClose);
            }
        }
        Some(id)
    }

    fn cancel(&mut self, id: OrderId, session: NaiveDate, reason: &str) -> bool {
        self.cancel_pending(id, session, reason)
    }

    fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    fn open_orders(&self) -> Vec<&Order> {
        self.pending.values().collect()
    }
}
