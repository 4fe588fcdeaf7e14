//! Factory: builds a boxed [`Strategy`] from a name and a parameter map.

use super::{BuyAndHold, LowPeRotation, MaCrossover, Strategy, StrategyParams};
use rust_decimal::Decimal;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that can occur during strategy construction.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
}

/// Names accepted by [`create_strategy`].
pub const STRATEGY_NAMES: &[&str] = &["buy_and_hold", "ma_crossover", "low_pe_rotation"];

// ─── Helpers ─────────────────────────────────────────────────────────

/// Extract a named decimal parameter, falling back to `default`.
fn param_decimal(
    params: &StrategyParams,
    name: &str,
    default: Decimal,
) -> Result<Decimal, FactoryError> {
    let Some(value) = params.get(name) else {
        return Ok(default);
    };
    let invalid = |reason: &str| FactoryError::InvalidParam {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    match value {
        serde_json::Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|_| invalid("not a decimal number")),
        serde_json::Value::String(s) => s
            .parse::<Decimal>()
            .map_err(|_| invalid("not a decimal number")),
        _ => Err(invalid("expected a number")),
    }
}

/// Extract a named positive integer parameter, falling back to `default`.
fn param_usize(params: &StrategyParams, name: &str, default: usize) -> Result<usize, FactoryError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value
            .as_u64()
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .ok_or_else(|| FactoryError::InvalidParam {
                name: name.to_string(),
                reason: "expected a positive integer".to_string(),
            }),
    }
}

fn fraction(name: &str, value: Decimal) -> Result<Decimal, FactoryError> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(FactoryError::InvalidParam {
            name: name.to_string(),
            reason: format!("{value} is outside (0, 1]"),
        });
    }
    Ok(value)
}

// ─── Strategy factory ────────────────────────────────────────────────

/// Create a strategy by name.
pub fn create_strategy(
    name: &str,
    params: &StrategyParams,
) -> Result<Box<dyn Strategy>, FactoryError> {
    match name {
        "buy_and_hold" => {
            let allocation = fraction(
                "allocation",
                param_decimal(params, "allocation", BuyAndHold::DEFAULT_ALLOCATION)?,
            )?;
            Ok(Box::new(BuyAndHold::new(allocation)))
        }
        "ma_crossover" => {
            let fast = param_usize(params, "fast", 5)?;
            let slow = param_usize(params, "slow", 20)?;
            if fast >= slow {
                return Err(FactoryError::InvalidParam {
                    name: "fast".to_string(),
                    reason: format!("fast ({fast}) must be shorter than slow ({slow})"),
                });
            }
            let allocation = fraction(
                "allocation",
                param_decimal(params, "allocation", MaCrossover::DEFAULT_ALLOCATION)?,
            )?;
            Ok(Box::new(MaCrossover::new(fast, slow, allocation)))
        }
        "low_pe_rotation" => {
            let top_n = param_usize(params, "top_n", 2)?;
            let rebalance_every = param_usize(params, "rebalance_every", 20)?;
            let allocation = fraction(
                "allocation",
                param_decimal(params, "allocation", LowPeRotation::DEFAULT_ALLOCATION)?,
            )?;
            Ok(Box::new(LowPeRotation::new(top_n, rebalance_every, allocation)))
        }
        other => Err(FactoryError::UnknownStrategy(other.to_string())),
    }
}
