//! Backtest runner: wires config, data and the strategy factory into the engine.
//!
//! Entry points:
//! - `run_backtest()`: loads CSV data from the config's data dir, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded data. Used by tests and batch runs
//!   that share one dataset.
//! - `run_batch()`: independent configs in parallel, one engine per config.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tplus_core::engine::{Backtest, BacktestResult, EngineError};
use tplus_core::strategy::{create_strategy, FactoryError};

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::{load_market_data, LoadError, LoadedData};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("strategy error: {0}")]
    Strategy(#[from] FactoryError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A finished run: the engine result plus what produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy: String,
    pub dataset_hash: String,
    /// Universe symbols that had no data at all.
    #[serde(default)]
    pub missing_symbols: Vec<String>,
    pub config: RunConfig,
    pub result: BacktestResult,
}

/// Run a single backtest, loading data from `config.data.dir`.
pub fn run_backtest(config: &RunConfig) -> Result<RunReport, RunError> {
    config.validate()?;
    let loaded = load_market_data(&config.data.dir, &config.symbols, config.use_daily_basic)?;
    run_backtest_from_data(config, &loaded)
}

/// Run a backtest on pre-loaded data. No I/O.
pub fn run_backtest_from_data(
    config: &RunConfig,
    loaded: &LoadedData,
) -> Result<RunReport, RunError> {
    let settings = config.to_settings()?;
    let run_id = config.run_id()?;
    let mut strategy = create_strategy(&config.strategy.name, &config.strategy.params)?;

    info!(
        run_id = %run_id,
        strategy = %config.strategy.name,
        dataset = %loaded.dataset_hash,
        "run starting"
    );
    if !loaded.missing_symbols.is_empty() {
        warn!(symbols = ?loaded.missing_symbols, "universe symbols without data");
    }

    let backtest = Backtest::new(settings, &loaded.data);
    let result = backtest.run(strategy.as_mut())?;

    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        strategy: result.strategy.clone(),
        dataset_hash: loaded.dataset_hash.clone(),
        missing_symbols: loaded.missing_symbols.clone(),
        config: config.clone(),
        result,
    })
}

/// Run independent configurations in parallel. Results keep input order.
pub fn run_batch(configs: &[RunConfig]) -> Vec<Result<RunReport, RunError>> {
    configs.par_iter().map(run_backtest).collect()
}
