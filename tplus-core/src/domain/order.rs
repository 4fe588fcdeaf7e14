//! Order value object and its status state machine.
//!
//! `Pending → Filled | Rejected | Cancelled`. Terminal states are immutable:
//! every transition method refuses to run on a terminal order.

use super::ids::OrderId;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which side of the market an order trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn is_sell(self) -> bool {
        self == OrderSide::Sell
    }

    /// +1 for buys, -1 for sells. Multiplying a quantity by this gives the
    /// signed position change.
    pub fn sign(self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why the matching engine refused an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No bar for the symbol on the settlement session (halted or delisted).
    Suspended,
    /// Buy price pinned at the session high.
    LimitUp,
    /// Sell price pinned at the session low.
    LimitDown,
    /// Nothing left to fill after sizing against cash or holdings.
    InsufficientFundsOrPosition,
    /// Trade value, fees or the resulting position do not fit in a `Decimal`.
    OutOfRange,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Suspended => "no data / suspended",
            RejectReason::LimitUp => "limit-up",
            RejectReason::LimitDown => "limit-down",
            RejectReason::InsufficientFundsOrPosition => "insufficient funds or position",
            RejectReason::OutOfRange => "quantity or price out of range",
        };
        f.write_str(s)
    }
}

/// Errors from order state transitions.
#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("invalid transition for order {0}: {1} → {2}")]
    InvalidTransition(OrderId, OrderStatus, OrderStatus),

    #[error("order {id} cannot fill {filled} of requested {requested}")]
    Overfill {
        id: OrderId,
        filled: Decimal,
        requested: Decimal,
    },
}

/// Commission, tax and slippage charged on one fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub commission: Decimal,
    pub tax: Decimal,
    pub slippage: Decimal,
}

impl FeeBreakdown {
    pub fn total(&self) -> Decimal {
        self.commission + self.tax + self.slippage
    }

    /// `None` when the sum overflows.
    pub fn checked_total(&self) -> Option<Decimal> {
        self.commission.checked_add(self.tax)?.checked_add(self.slippage)
    }
}

/// One simulated trade intent and, once settled, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    /// Requested quantity, always positive.
    pub quantity: Decimal,
    /// `None` means a market order.
    pub limit_price: Option<Decimal>,
    /// Close at creation, or the limit. A valuation placeholder only; the
    /// execution price is decided at settlement.
    pub reference_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub filled_price: Option<Decimal>,
    pub commission: Decimal,
    pub tax: Decimal,
    pub slippage: Decimal,
    pub order_date: NaiveDate,
    /// Set on fills only.
    pub fill_date: Option<NaiveDate>,
    /// Session the matching engine filled or rejected the order.
    #[serde(default)]
    pub settled_date: Option<NaiveDate>,
    pub reject_reason: Option<RejectReason>,
    pub cancel_reason: Option<String>,
}

impl Order {
    /// A fresh pending order.
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        order_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            quantity,
            limit_price,
            reference_price: limit_price,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            filled_price: None,
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
            slippage: Decimal::ZERO,
            order_date,
            fill_date: None,
            settled_date: None,
            reject_reason: None,
            cancel_reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_limit(&self) -> bool {
        self.limit_price.is_some()
    }

    /// `filled_quantity * filled_price`, zero when unfilled.
    pub fn gross_value(&self) -> Decimal {
        self.filled_price
            .map(|price| self.filled_quantity * price)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn fees(&self) -> Decimal {
        self.commission + self.tax + self.slippage
    }

    /// Gross traded value plus every fee charged on it.
    pub fn total_cost(&self) -> Decimal {
        self.gross_value() + self.fees()
    }

    /// Signed position change this order produced.
    pub fn signed_filled_quantity(&self) -> Decimal {
        self.filled_quantity * self.side.sign()
    }

    /// Transition to `Filled`. Fees are set separately via the cost model.
    pub fn fill(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        session: NaiveDate,
    ) -> Result<(), OrderError> {
        self.ensure_pending(OrderStatus::Filled)?;
        if quantity > self.quantity {
            return Err(OrderError::Overfill {
                id: self.id,
                filled: quantity,
                requested: self.quantity,
            });
        }
        self.filled_quantity = quantity;
        self.filled_price = Some(price);
        self.fill_date = Some(session);
        self.settled_date = Some(session);
        self.status = OrderStatus::Filled;
        Ok(())
    }

    /// Record fees on a filled order. Only valid before the order leaves the
    /// matching engine, which is the only caller.
    pub fn set_fees(&mut self, fees: FeeBreakdown) {
        self.commission = fees.commission;
        self.tax = fees.tax;
        self.slippage = fees.slippage;
    }

    /// Transition to `Rejected`.
    pub fn reject(&mut self, reason: RejectReason, session: NaiveDate) -> Result<(), OrderError> {
        self.ensure_pending(OrderStatus::Rejected)?;
        self.status = OrderStatus::Rejected;
        self.reject_reason = Some(reason);
        self.settled_date = Some(session);
        Ok(())
    }

    /// Transition to `Cancelled`.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.ensure_pending(OrderStatus::Cancelled)?;
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = Some(reason.into());
        Ok(())
    }

    fn ensure_pending(&self, to: OrderStatus) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::InvalidTransition(self.id, self.status, to));
        }
        Ok(())
    }
}

/// Audit trail entry for an order state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub session: NaiveDate,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub reason: String,
}
