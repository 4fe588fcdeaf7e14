//! Portfolio: cash plus every per-symbol position.

use super::order::{Order, OrderSide};
use super::position::Position;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate ledger state.
///
/// `total_value == cash + Σ market_value` holds at every point. Only the
/// settlement path mutates it through [`Portfolio::apply_fill`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub initial_cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub total_commission: Decimal,
    pub total_tax: Decimal,
    pub total_slippage: Decimal,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            initial_cash,
            positions: BTreeMap::new(),
            total_commission: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            total_slippage: Decimal::ZERO,
        }
    }

    /// Existing position, or a new flat one. Positions are never removed.
    pub fn get_or_create_position(&mut self, symbol: &str) -> &mut Position {
        self.positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::empty(symbol))
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Signed held quantity, zero for unknown symbols.
    pub fn quantity_of(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn refresh_valuation(&mut self, symbol: &str, price: Decimal) {
        self.get_or_create_position(symbol).refresh_valuation(price);
    }

    /// Book a filled order into cash and the position.
    ///
    /// Buys debit `gross + fees`; sells credit `gross - fees`. Sizing and
    /// range checks have already happened, so nothing is validated here.
    pub fn apply_fill(&mut self, order: &Order) {
        let Some(price) = order.filled_price else {
            return;
        };
        let gross = order.filled_quantity * price;
        let fees = order.fees();

        match order.side {
            OrderSide::Buy => self.cash -= gross + fees,
            OrderSide::Sell => self.cash += gross - fees,
        }
        self.total_commission += order.commission;
        self.total_tax += order.tax;
        self.total_slippage += order.slippage;

        self.get_or_create_position(&order.symbol)
            .apply_trade(order.signed_filled_quantity(), price);
    }

    /// Sum of position market values, saturating like the valuations
    /// themselves.
    pub fn market_value(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.market_value))
    }

    pub fn total_value(&self) -> Decimal {
        self.cash.saturating_add(self.market_value())
    }

    pub fn total_fees(&self) -> Decimal {
        self.total_commission + self.total_tax + self.total_slippage
    }

    /// Positions whose absolute quantity exceeds `epsilon`.
    pub fn holdings(&self, epsilon: Decimal) -> impl Iterator<Item = &Position> + '_ {
        self.positions
            .values()
            .filter(move |p| p.quantity.abs() > epsilon)
    }
}
