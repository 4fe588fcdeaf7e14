//! Result snapshot handed to downstream analysis.

use crate::domain::order::{Order, OrderAuditEntry, OrderStatus};
use crate::domain::portfolio::Portfolio;
use crate::domain::position::Position;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closing state of one held position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
}

impl From<&Position> for PositionSnapshot {
    fn from(pos: &Position) -> Self {
        Self {
            symbol: pos.symbol.clone(),
            quantity: pos.quantity,
            avg_cost: pos.avg_cost,
            current_price: pos.current_price,
            market_value: pos.market_value,
            unrealized_pnl: pos.unrealized_pnl(),
            unrealized_pnl_pct: pos.unrealized_pnl_pct(),
        }
    }
}

/// Portfolio value at the end of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub session: NaiveDate,
    pub cash: Decimal,
    pub total_value: Decimal,
}

/// A strategy callback that returned an error. The run continued past it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyFailure {
    pub session: NaiveDate,
    pub message: String,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub initial_cash: Decimal,
    pub final_cash: Decimal,
    pub total_value: Decimal,
    pub total_commission: Decimal,
    pub total_tax: Decimal,
    pub total_slippage: Decimal,
    pub session_count: usize,
    pub positions: Vec<PositionSnapshot>,
    /// Every order of the run, terminal, in creation order.
    pub orders: Vec<Order>,
    pub equity_curve: Vec<EquitySnapshot>,
    pub strategy_failures: Vec<StrategyFailure>,
    #[serde(default)]
    pub audit_trail: Vec<OrderAuditEntry>,
}

impl BacktestResult {
    /// Assemble the snapshot from the final ledger. Positions at or below
    /// `epsilon` are omitted.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        strategy: &str,
        portfolio: &Portfolio,
        orders: Vec<Order>,
        audit_trail: Vec<OrderAuditEntry>,
        equity_curve: Vec<EquitySnapshot>,
        strategy_failures: Vec<StrategyFailure>,
        session_count: usize,
        epsilon: Decimal,
    ) -> Self {
        Self {
            strategy: strategy.to_string(),
            initial_cash: portfolio.initial_cash,
            final_cash: portfolio.cash,
            total_value: portfolio.total_value(),
            total_commission: portfolio.total_commission,
            total_tax: portfolio.total_tax,
            total_slippage: portfolio.total_slippage,
            session_count,
            positions: portfolio.holdings(epsilon).map(PositionSnapshot::from).collect(),
            orders,
            equity_curve,
            strategy_failures,
            audit_trail,
        }
    }

    pub fn filled_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Filled)
    }

    pub fn rejected_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Rejected)
    }

    /// Total value relative to initial cash, e.g. `0.05` for +5%.
    pub fn total_return(&self) -> Decimal {
        if self.initial_cash.is_zero() {
            return Decimal::ZERO;
        }
        (self.total_value - self.initial_cash) / self.initial_cash
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionSnapshot> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }
}
