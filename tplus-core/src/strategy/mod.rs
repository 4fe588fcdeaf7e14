//! Strategy contract and the built-in strategies.
//!
//! A strategy sees the world only through the [`ExecutionContext`] and the
//! session's bar map. It never mutates the portfolio; it requests orders and
//! the broker decides what happens to them on a later session.

pub mod buy_and_hold;
pub mod factory;
pub mod low_pe;
pub mod ma_crossover;

use crate::domain::bar::BarMap;
use crate::engine::context::ExecutionContext;
use crate::engine::settings::RunSettings;
use std::collections::BTreeMap;

pub use buy_and_hold::BuyAndHold;
pub use factory::{create_strategy, FactoryError, STRATEGY_NAMES};
pub use low_pe::LowPeRotation;
pub use ma_crossover::MaCrossover;

/// Construction parameters, as parsed from run configuration.
pub type StrategyParams = BTreeMap<String, serde_json::Value>;

/// User trading logic.
///
/// `initialize` runs once before the first session; an error there aborts the
/// run. `on_bar` runs once per session; an error there is logged and recorded
/// and the run continues with the strategy's state as it was left.
pub trait Strategy: Send {
    /// Human-readable name (e.g., "ma_crossover").
    fn name(&self) -> &str;

    fn initialize(&mut self, _settings: &RunSettings) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_bar(&mut self, ctx: &mut ExecutionContext, bars: &BarMap) -> anyhow::Result<()>;
}
