//! Cost model: commission, stamp tax and slippage.
//!
//! All functions are pure conversions from trade value to fees. Equities pay
//! `max(value * commission_rate, min_commission)` per side, tax on sells only,
//! and slippage proportional to value. The immediate (crypto) policy charges a
//! single maker or taker fee instead, booked as commission.

use crate::domain::order::{FeeBreakdown, Order, OrderSide};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Decimal places kept on computed quantities. Affordable quantities are
/// truncated toward zero at this scale so rounding never overspends cash.
pub const QUANTITY_SCALE: u32 = 8;

/// Truncate a quantity toward zero at [`QUANTITY_SCALE`].
pub fn truncate_quantity(quantity: Decimal) -> Decimal {
    quantity.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::ToZero)
}

/// Equities fee configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub commission_rate: Decimal,
    pub min_commission: Decimal,
    /// Stamp tax, charged on sells only.
    pub tax_rate: Decimal,
    pub slippage_rate: Decimal,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            commission_rate: dec!(0.0003),
            min_commission: dec!(5),
            tax_rate: dec!(0.001),
            slippage_rate: dec!(0.001),
        }
    }
}

impl CostModel {
    pub fn new(
        commission_rate: Decimal,
        min_commission: Decimal,
        tax_rate: Decimal,
        slippage_rate: Decimal,
    ) -> Self {
        Self {
            commission_rate,
            min_commission,
            tax_rate,
            slippage_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    }

    pub fn commission(&self, value: Decimal) -> Decimal {
        (value * self.commission_rate).max(self.min_commission)
    }

    pub fn tax(&self, value: Decimal, is_sell: bool) -> Decimal {
        if is_sell {
            value * self.tax_rate
        } else {
            Decimal::ZERO
        }
    }

    pub fn slippage(&self, value: Decimal) -> Decimal {
        value * self.slippage_rate
    }

    pub fn breakdown(&self, quantity: Decimal, price: Decimal, is_sell: bool) -> FeeBreakdown {
        let value = quantity * price;
        FeeBreakdown {
            commission: self.commission(value),
            tax: self.tax(value, is_sell),
            slippage: self.slippage(value),
        }
    }

    /// Commission + tax + slippage on `quantity * price`.
    pub fn total_cost(&self, quantity: Decimal, price: Decimal, is_sell: bool) -> Decimal {
        self.breakdown(quantity, price, is_sell).total()
    }

    /// Set an order's fee fields from its filled quantity and price.
    pub fn apply_costs(&self, order: &mut Order) {
        let price = order.filled_price.unwrap_or(Decimal::ZERO);
        order.set_fees(self.breakdown(order.filled_quantity, price, order.side.is_sell()));
    }

    /// Fees on a trade value, `None` if any component overflows.
    fn checked_fees(&self, value: Decimal, is_sell: bool) -> Option<FeeBreakdown> {
        let tax = if is_sell {
            value.checked_mul(self.tax_rate)?
        } else {
            Decimal::ZERO
        };
        Some(FeeBreakdown {
            commission: value.checked_mul(self.commission_rate)?.max(self.min_commission),
            tax,
            slippage: value.checked_mul(self.slippage_rate)?,
        })
    }

    /// Largest buy quantity whose gross value plus fees fits in `cash`.
    fn affordable_buy(&self, cash: Decimal, price: Decimal) -> Option<Decimal> {
        let per_unit = price.checked_mul(Decimal::ONE + self.commission_rate + self.slippage_rate)?;
        let proportional = truncate_quantity(cash.checked_div(per_unit)?);
        let fits = |q: Decimal| {
            let value = q.checked_mul(price)?;
            let fees = self.checked_fees(value, false)?.checked_total()?;
            Some(value.checked_add(fees)? <= cash)
        };
        if fits(proportional)? {
            return Some(proportional);
        }
        // The minimum commission dominates at this size.
        let after_floor = cash - self.min_commission;
        if after_floor <= Decimal::ZERO {
            return Some(Decimal::ZERO);
        }
        let per_unit = price.checked_mul(Decimal::ONE + self.slippage_rate)?;
        let floored = truncate_quantity(after_floor.checked_div(per_unit)?);
        Some(floored.min(proportional))
    }
}

/// Crypto fee configuration: limit orders pay maker, market orders pay taker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakerTakerFees {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl Default for MakerTakerFees {
    fn default() -> Self {
        Self {
            maker_rate: dec!(0.0002),
            taker_rate: dec!(0.0005),
        }
    }
}

impl MakerTakerFees {
    pub fn rate(&self, is_maker: bool) -> Decimal {
        if is_maker {
            self.maker_rate
        } else {
            self.taker_rate
        }
    }

    pub fn fee(&self, value: Decimal, is_maker: bool) -> Decimal {
        value * self.rate(is_maker)
    }

    pub fn breakdown(&self, quantity: Decimal, price: Decimal, is_maker: bool) -> FeeBreakdown {
        FeeBreakdown {
            commission: self.fee(quantity * price, is_maker),
            ..FeeBreakdown::default()
        }
    }
}

/// The fee schedule in force for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum FeeSchedule {
    Equity(CostModel),
    MakerTaker(MakerTakerFees),
}

impl FeeSchedule {
    /// Fees for a trade. `is_limit` selects maker vs taker under the
    /// maker/taker schedule and is ignored for equities.
    pub fn breakdown(
        &self,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        is_limit: bool,
    ) -> FeeBreakdown {
        match self {
            FeeSchedule::Equity(model) => model.breakdown(quantity, price, side.is_sell()),
            FeeSchedule::MakerTaker(fees) => fees.breakdown(quantity, price, is_limit),
        }
    }

    /// Gross value and fees of a trade, or `None` when either does not fit
    /// in a `Decimal`. The matching engine sizes and books through this so
    /// an absurd quantity or price is refused instead of overflowing.
    pub fn checked_costs(
        &self,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        is_limit: bool,
    ) -> Option<(Decimal, FeeBreakdown)> {
        let gross = quantity.checked_mul(price)?;
        let fees = match self {
            FeeSchedule::Equity(model) => model.checked_fees(gross, side.is_sell())?,
            FeeSchedule::MakerTaker(fees) => FeeBreakdown {
                commission: gross.checked_mul(fees.rate(is_limit))?,
                ..FeeBreakdown::default()
            },
        };
        fees.checked_total()?;
        Some((gross, fees))
    }

    /// Maximum buy quantity at `price` whose gross value plus fees does not
    /// exceed `cash`. Zero when nothing is affordable or the answer is not
    /// representable.
    pub fn affordable_quantity(&self, cash: Decimal, price: Decimal, is_limit: bool) -> Decimal {
        if cash <= Decimal::ZERO || price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let affordable = match self {
            FeeSchedule::Equity(model) => model.affordable_buy(cash, price),
            FeeSchedule::MakerTaker(fees) => price
                .checked_mul(Decimal::ONE + fees.rate(is_limit))
                .and_then(|per_unit| cash.checked_div(per_unit))
                .map(truncate_quantity),
        };
        affordable.unwrap_or(Decimal::ZERO)
    }
}
