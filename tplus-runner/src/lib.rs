//! tplus runner: run configuration, CSV data loading, single and batch runs, export.
//!
//! This crate builds on `tplus-core` to provide:
//! - TOML run configs with a content-addressed run id
//! - CSV market-data loading (bars, calendar, daily fundamentals)
//! - Single and parallel batch backtests
//! - JSON and CSV result artifacts

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;

pub use config::{ConfigError, RunConfig, RunId};
pub use data_loader::{load_market_data, LoadError, LoadedData};
pub use export::{export_json, import_json, load_artifacts, save_artifacts, summary};
pub use runner::{run_backtest, run_backtest_from_data, run_batch, RunError, RunReport};
