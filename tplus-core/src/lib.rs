//! tplus core: domain types, cost model, T+1 matching and settlement, the
//! execution context and the session loop.
//!
//! This crate contains the heart of the backtesting engine:
//! - Domain types (bars, orders, positions, portfolio, daily basics)
//! - Fee schedules (equities commission/tax/slippage, maker/taker)
//! - Broker: order state machine, settlement, price limits, cash sizing
//! - Execution context exposed to strategies
//! - Session loop orchestrator and result snapshot
//! - Strategy trait plus built-in strategies

pub mod data;
pub mod domain;
pub mod engine;
pub mod strategy;

pub use data::{InMemoryMarketData, MarketDataSource};
pub use domain::{Bar, BarMap, DailyBasic, Order, OrderId, OrderSide, OrderStatus, RejectReason};
pub use engine::{Backtest, BacktestResult, EngineError, ExecutionContext, RunSettings};
pub use strategy::{create_strategy, Strategy, StrategyParams};
