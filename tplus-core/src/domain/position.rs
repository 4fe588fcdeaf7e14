use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol holding.
///
/// `quantity` is signed: positive is long, negative is short. The equities
/// settlement path never lets it go below zero; the immediate policy may.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    /// Last known price. Symbols without a bar in a session keep the previous
    /// value.
    pub current_price: Decimal,
    pub market_value: Decimal,
}

impl Position {
    /// A flat position with no cost basis and no known price.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            current_price: Decimal::ZERO,
            market_value: Decimal::ZERO,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Apply a signed trade at `price`.
    ///
    /// Average cost is recomputed only when the trade grows the position in
    /// its current direction. Reducing trades leave it alone. A trade that
    /// crosses through zero opens the remainder at `price`. A trade that
    /// [`can_trade`](Self::can_trade) refuses leaves the position untouched.
    pub fn apply_trade(&mut self, signed_quantity: Decimal, price: Decimal) {
        if let Some((quantity, avg_cost, market_value)) = self.traded(signed_quantity, price) {
            self.quantity = quantity;
            self.avg_cost = avg_cost;
            self.market_value = market_value;
        }
    }

    /// Whether the trade's resulting quantity, cost basis and value at
    /// `price` are all representable.
    pub fn can_trade(&self, signed_quantity: Decimal, price: Decimal) -> bool {
        self.traded(signed_quantity, price)
            .is_some_and(|(quantity, _, _)| quantity.checked_mul(price).is_some())
    }

    fn traded(&self, signed_quantity: Decimal, price: Decimal) -> Option<(Decimal, Decimal, Decimal)> {
        let old = self.quantity;
        let new = old.checked_add(signed_quantity)?;
        let same_direction = old.is_zero() || old.is_sign_positive() == signed_quantity.is_sign_positive();

        let avg_cost = if signed_quantity.is_zero() {
            self.avg_cost
        } else if same_direction {
            let old_abs = old.abs();
            let add_abs = signed_quantity.abs();
            let basis = self
                .avg_cost
                .checked_mul(old_abs)?
                .checked_add(price.checked_mul(add_abs)?)?;
            basis.checked_div(old_abs.checked_add(add_abs)?)?
        } else if !new.is_zero() && new.is_sign_positive() != old.is_sign_positive() {
            // crossed through zero
            price
        } else {
            self.avg_cost
        };

        Some((new, avg_cost, new.checked_mul(self.current_price)?))
    }

    /// Set the last known price and recompute market value. Saturates
    /// rather than overflowing on an extreme price move.
    pub fn refresh_valuation(&mut self, price: Decimal) {
        self.current_price = price;
        self.market_value = self.quantity.saturating_mul(price);
    }

    pub fn cost_basis(&self) -> Decimal {
        self.avg_cost.saturating_mul(self.quantity)
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.current_price
            .saturating_sub(self.avg_cost)
            .saturating_mul(self.quantity)
    }

    /// Unrealized P&L as a percent of the absolute cost basis. Zero when there
    /// is no basis or the ratio does not fit.
    pub fn unrealized_pnl_pct(&self) -> Decimal {
        let basis = self.cost_basis().abs();
        if basis.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl()
            .checked_div(basis)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO)
    }
}
