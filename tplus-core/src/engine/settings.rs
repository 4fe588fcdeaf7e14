//! Run settings: the immutable, engine-facing view of a run configuration.
//!
//! Built once per run (usually by `tplus-runner` from a TOML file) and shared
//! read-only through an `Arc` between the broker, the execution context and
//! the strategy.

use super::execution::cost_model::{CostModel, FeeSchedule, MakerTakerFees};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// When pending orders are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// T+1 equities: orders settle on the next session at its open, subject
    /// to price limits and cash/holding constraints. No short selling.
    #[default]
    NextSession,
    /// T+0: orders fill inside the `order` call at the current session's
    /// close. Short selling allowed, maker/taker fees.
    Immediate,
}

/// Epsilon thresholds that suppress rounding-noise orders and degenerate
/// fills.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// `order_target` deltas below this are dropped.
    pub order_target_epsilon: Decimal,
    /// Fill quantities below this are rejected instead of filled.
    pub fill_epsilon: Decimal,
}

impl Tolerances {
    pub fn equities() -> Self {
        Self {
            order_target_epsilon: dec!(0.000001),
            fill_epsilon: dec!(0.000001),
        }
    }

    pub fn crypto() -> Self {
        Self {
            order_target_epsilon: dec!(0.00000001),
            fill_epsilon: dec!(0.000001),
        }
    }

    /// Default tolerances for a settlement policy.
    pub fn for_policy(policy: SettlementPolicy) -> Self {
        match policy {
            SettlementPolicy::NextSession => Self::equities(),
            SettlementPolicy::Immediate => Self::crypto(),
        }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::equities()
    }
}

/// Price-limit heuristic ratios.
///
/// A buy whose fill price is at or above `high * up_ratio` is treated as
/// pinned at limit-up; a sell at or below `low * down_ratio` as limit-down.
/// This approximates exchange price limits from the same session's range, not
/// from the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLimits {
    pub up_ratio: Decimal,
    pub down_ratio: Decimal,
}

impl Default for PriceLimits {
    fn default() -> Self {
        Self {
            up_ratio: dec!(0.999),
            down_ratio: dec!(1.001),
        }
    }
}

/// Everything the engine needs to know about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    /// Tradable universe. Orders for any other symbol are refused.
    pub symbols: Vec<String>,
    /// Informational only.
    pub frequency: String,
    pub costs: CostModel,
    pub maker_taker: MakerTakerFees,
    pub settlement: SettlementPolicy,
    pub tolerances: Tolerances,
    pub price_limits: PriceLimits,
    pub use_daily_basic: bool,
}

impl RunSettings {
    /// Settings with every option at its default.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        symbols: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            start_date,
            end_date,
            initial_capital: dec!(1000000),
            symbols: symbols.into_iter().map(Into::into).collect(),
            frequency: "1d".to_string(),
            costs: CostModel::default(),
            maker_taker: MakerTakerFees::default(),
            settlement: SettlementPolicy::NextSession,
            tolerances: Tolerances::equities(),
            price_limits: PriceLimits::default(),
            use_daily_basic: false,
        }
    }

    pub fn with_initial_capital(mut self, capital: Decimal) -> Self {
        self.initial_capital = capital;
        self
    }

    pub fn with_costs(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    /// Switch settlement policy, resetting tolerances to that policy's
    /// defaults.
    pub fn with_settlement(mut self, policy: SettlementPolicy) -> Self {
        self.settlement = policy;
        self.tolerances = Tolerances::for_policy(policy);
        self
    }

    pub fn with_daily_basic(mut self, enabled: bool) -> Self {
        self.use_daily_basic = enabled;
        self
    }

    /// The fee schedule implied by the settlement policy.
    pub fn fee_schedule(&self) -> FeeSchedule {
        match self.settlement {
            SettlementPolicy::NextSession => FeeSchedule::Equity(self.costs.clone()),
            SettlementPolicy::Immediate => FeeSchedule::MakerTaker(self.maker_taker.clone()),
        }
    }

    pub fn in_universe(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}
