//! Serializable run configuration (TOML).
//!
//! Every option has a serde default except the date window, the universe and
//! the strategy name. Rates are written as plain floats and converted to
//! exact decimals by [`RunConfig::to_settings`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tplus_core::engine::{
    CostModel, MakerTakerFees, PriceLimits, RunSettings, SettlementPolicy, Tolerances,
};
use tplus_core::strategy::{StrategyParams, STRATEGY_NAMES};

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

/// Errors from reading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("end_date {end} is before start_date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("initial_capital must be positive, got {0}")]
    NonPositiveCapital(f64),

    #[error("{name} must not be negative, got {value}")]
    NegativeRate { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositiveTolerance { name: &'static str, value: f64 },

    #[error("{name} is not a representable decimal: {value}")]
    InvalidNumber { name: &'static str, value: f64 },

    #[error("symbols must not be empty")]
    EmptyUniverse,

    #[error("unknown settlement '{0}' (expected next_session or immediate)")]
    UnknownSettlement(String),

    #[error("unknown strategy '{name}' (expected one of: {known})")]
    UnknownStrategy { name: String, known: String },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ─── Defaults ────────────────────────────────────────────────────────

fn default_initial_capital() -> f64 {
    1_000_000.0
}
fn default_frequency() -> String {
    "1d".to_string()
}
fn default_commission_rate() -> f64 {
    0.0003
}
fn default_min_commission() -> f64 {
    5.0
}
fn default_tax_rate() -> f64 {
    0.001
}
fn default_slippage_rate() -> f64 {
    0.001
}
fn default_settlement() -> String {
    "next_session".to_string()
}
fn default_maker_rate() -> f64 {
    0.0002
}
fn default_taker_rate() -> f64 {
    0.0005
}
fn default_up_ratio() -> f64 {
    0.999
}
fn default_down_ratio() -> f64 {
    1.001
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

// ─── Sections ────────────────────────────────────────────────────────

/// `[tolerances]`. Missing values fall back to the settlement policy's
/// defaults (1e-6 for equities, 1e-8 order-target epsilon for crypto).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToleranceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_target_epsilon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_epsilon: Option<f64>,
}

/// `[price_limits]`: the limit-up / limit-down detection ratios.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceLimitConfig {
    #[serde(default = "default_up_ratio")]
    pub up_ratio: f64,
    #[serde(default = "default_down_ratio")]
    pub down_ratio: f64,
}

impl Default for PriceLimitConfig {
    fn default() -> Self {
        Self {
            up_ratio: default_up_ratio(),
            down_ratio: default_down_ratio(),
        }
    }
}

/// `[strategy]`: factory name plus free-form parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub params: StrategyParams,
}

/// `[data]`: where the CSV files live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

/// Everything needed to reproduce one backtest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    pub symbols: Vec<String>,
    /// Informational only; the engine is driven by the trading calendar.
    #[serde(default = "default_frequency")]
    pub frequency: String,

    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,
    #[serde(default = "default_min_commission")]
    pub min_commission: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default = "default_slippage_rate")]
    pub slippage_rate: f64,

    #[serde(default)]
    pub use_daily_basic: bool,
    /// `next_session` (T+1 equities) or `immediate` (T+0 crypto).
    #[serde(default = "default_settlement")]
    pub settlement: String,
    #[serde(default = "default_maker_rate")]
    pub maker_rate: f64,
    #[serde(default = "default_taker_rate")]
    pub taker_rate: f64,

    #[serde(default)]
    pub tolerances: ToleranceConfig,
    #[serde(default)]
    pub price_limits: PriceLimitConfig,

    pub strategy: StrategyConfig,
    #[serde(default)]
    pub data: DataConfig,
}

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a run id.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn settlement_policy(&self) -> Result<SettlementPolicy, ConfigError> {
        match self.settlement.as_str() {
            "next_session" => Ok(SettlementPolicy::NextSession),
            "immediate" => Ok(SettlementPolicy::Immediate),
            other => Err(ConfigError::UnknownSettlement(other.to_string())),
        }
    }

    /// Check every constraint that does not need market data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_date < self.start_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.initial_capital.is_nan() || self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if self.symbols.is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        for (name, value) in self.rates() {
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::NegativeRate { name, value });
            }
        }
        for (name, value) in [
            ("tolerances.order_target_epsilon", self.tolerances.order_target_epsilon),
            ("tolerances.fill_epsilon", self.tolerances.fill_epsilon),
        ] {
            if let Some(value) = value.filter(|v| v.is_nan() || *v <= 0.0) {
                return Err(ConfigError::NonPositiveTolerance { name, value });
            }
        }
        self.settlement_policy()?;
        if !STRATEGY_NAMES.contains(&self.strategy.name.as_str()) {
            return Err(ConfigError::UnknownStrategy {
                name: self.strategy.name.clone(),
                known: STRATEGY_NAMES.join(", "),
            });
        }
        Ok(())
    }

    /// Validate and convert into engine settings.
    pub fn to_settings(&self) -> Result<RunSettings, ConfigError> {
        self.validate()?;
        let policy = self.settlement_policy()?;

        let defaults = Tolerances::for_policy(policy);
        let tolerances = Tolerances {
            order_target_epsilon: match self.tolerances.order_target_epsilon {
                Some(v) => decimal("tolerances.order_target_epsilon", v)?,
                None => defaults.order_target_epsilon,
            },
            fill_epsilon: match self.tolerances.fill_epsilon {
                Some(v) => decimal("tolerances.fill_epsilon", v)?,
                None => defaults.fill_epsilon,
            },
        };

        let mut settings = RunSettings::new(self.start_date, self.end_date, self.symbols.clone())
            .with_initial_capital(decimal("initial_capital", self.initial_capital)?)
            .with_costs(CostModel::new(
                decimal("commission_rate", self.commission_rate)?,
                decimal("min_commission", self.min_commission)?,
                decimal("tax_rate", self.tax_rate)?,
                decimal("slippage_rate", self.slippage_rate)?,
            ))
            .with_settlement(policy)
            .with_daily_basic(self.use_daily_basic);
        settings.frequency = self.frequency.clone();
        settings.maker_taker = MakerTakerFees {
            maker_rate: decimal("maker_rate", self.maker_rate)?,
            taker_rate: decimal("taker_rate", self.taker_rate)?,
        };
        settings.tolerances = tolerances;
        settings.price_limits = PriceLimits {
            up_ratio: decimal("price_limits.up_ratio", self.price_limits.up_ratio)?,
            down_ratio: decimal("price_limits.down_ratio", self.price_limits.down_ratio)?,
        };
        Ok(settings)
    }

    fn rates(&self) -> [(&'static str, f64); 8] {
        [
            ("commission_rate", self.commission_rate),
            ("min_commission", self.min_commission),
            ("tax_rate", self.tax_rate),
            ("slippage_rate", self.slippage_rate),
            ("maker_rate", self.maker_rate),
            ("taker_rate", self.taker_rate),
            ("price_limits.up_ratio", self.price_limits.up_ratio),
            ("price_limits.down_ratio", self.price_limits.down_ratio),
        ]
    }
}

/// Exact decimal from the float's shortest round-trip text, so `0.0003` in
/// TOML becomes `0.0003` and not the nearest binary fraction.
fn decimal(name: &'static str, value: f64) -> Result<Decimal, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::InvalidNumber { name, value });
    }
    Decimal::from_str(&value.to_string()).map_err(|_| ConfigError::InvalidNumber { name, value })
}
