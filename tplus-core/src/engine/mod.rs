//! Backtesting engine: T+1 matching and settlement, the strategy-facing
//! execution context and the session loop that ties them together.
//!
//! Per session the loop runs:
//!
//! 1. Settlement: pending orders from earlier sessions fill or reject
//! 2. Valuation: positions with a bar are marked at the close
//! 3. Strategy: `on_bar` requests new orders through the context
//! 4. Snapshot: cash and total value are recorded

pub mod backtest;
pub mod broker;
pub mod context;
pub mod execution;
pub mod result;
pub mod settings;

pub use backtest::{Backtest, EngineError};
pub use broker::{Broker, SettlementSummary, END_OF_RUN_REASON};
pub use context::{DailyBasicLookup, ExecutionContext, NullSink, OrderRequest, OrderSink};
pub use execution::{CostModel, FeeSchedule, MakerTakerFees};
pub use result::{BacktestResult, EquitySnapshot, PositionSnapshot, StrategyFailure};
pub use settings::{PriceLimits, RunSettings, SettlementPolicy, Tolerances};
