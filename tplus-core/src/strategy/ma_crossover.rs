//! Moving-average crossover on session closes.
//!
//! Goes long when the fast SMA rises above the slow SMA and flattens when it
//! falls back below. Each symbol gets `allocation / universe size` of
//! portfolio value.

use super::Strategy;
use crate::domain::bar::BarMap;
use crate::engine::context::ExecutionContext;
use crate::engine::settings::RunSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone)]
pub struct MaCrossover {
    fast: usize,
    slow: usize,
    allocation: Decimal,
    weight: Decimal,
    closes: BTreeMap<String, VecDeque<Decimal>>,
    /// Last observed regime per symbol: `true` while fast > slow.
    above: BTreeMap<String, bool>,
}

impl MaCrossover {
    pub const DEFAULT_ALLOCATION: Decimal = dec!(0.95);

    pub fn new(fast: usize, slow: usize, allocation: Decimal) -> Self {
        Self {
            fast,
            slow,
            allocation,
            weight: allocation,
            closes: BTreeMap::new(),
            above: BTreeMap::new(),
        }
    }

    /// Record a close and return `(fast_sma, slow_sma)` once enough history
    /// exists.
    fn push_close(&mut self, symbol: &str, close: Decimal) -> Option<(Decimal, Decimal)> {
        let history = self.closes.entry(symbol.to_string()).or_default();
        history.push_back(close);
        while history.len() > self.slow {
            history.pop_front();
        }
        if history.len() < self.slow {
            return None;
        }
        Some((sma(history, self.fast), sma(history, self.slow)))
    }
}

/// Mean of the last `n` values.
fn sma(history: &VecDeque<Decimal>, n: usize) -> Decimal {
    let sum: Decimal = history.iter().rev().take(n).sum();
    sum / Decimal::from(n)
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn initialize(&mut self, settings: &RunSettings) -> anyhow::Result<()> {
        anyhow::ensure!(!settings.symbols.is_empty(), "ma_crossover needs at least one symbol");
        self.weight = self.allocation / Decimal::from(settings.symbols.len());
        self.closes.clear();
        self.above.clear();
        Ok(())
    }

    fn on_bar(&mut self, ctx: &mut ExecutionContext, bars: &BarMap) -> anyhow::Result<()> {
        for (symbol, bar) in bars {
            let Some((fast, slow)) = self.push_close(symbol, bar.close) else {
                continue;
            };
            let now_above = fast > slow;
            let was_above = self.above.insert(symbol.clone(), now_above);
            match (was_above, now_above) {
                (Some(true), true) | (Some(false) | None, false) => {}
                (Some(false) | None, true) => {
                    ctx.order_target_percent(symbol, self.weight, None);
                }
                (Some(true), false) => {
                    ctx.order_target(symbol, Decimal::ZERO, None);
                }
            }
        }
        Ok(())
    }
}
