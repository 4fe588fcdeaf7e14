//! Low P/E rotation.
//!
//! Every `rebalance_every` sessions, rank the symbols that traded today by
//! trailing P/E (positive values only), hold the `top_n` cheapest at equal
//! weight and exit everything else. Requires daily-basic data.

use super::Strategy;
use crate::domain::bar::BarMap;
use crate::engine::context::ExecutionContext;
use crate::engine::settings::RunSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LowPeRotation {
    top_n: usize,
    rebalance_every: usize,
    allocation: Decimal,
    sessions_seen: usize,
}

impl LowPeRotation {
    pub const DEFAULT_ALLOCATION: Decimal = dec!(0.95);

    pub fn new(top_n: usize, rebalance_every: usize, allocation: Decimal) -> Self {
        Self {
            top_n,
            rebalance_every,
            allocation,
            sessions_seen: 0,
        }
    }

    /// The `top_n` cheapest symbols by trailing P/E, ties broken by symbol.
    fn pick(&self, ctx: &ExecutionContext, bars: &BarMap) -> Vec<String> {
        let mut ranked: Vec<(f64, &String)> = bars
            .keys()
            .filter_map(|symbol| {
                ctx.get_daily_basic(symbol, None)
                    .and_then(|basic| basic.positive_pe_ttm())
                    .map(|pe| (pe, symbol))
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        ranked
            .into_iter()
            .take(self.top_n)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

impl Strategy for LowPeRotation {
    fn name(&self) -> &str {
        "low_pe_rotation"
    }

    fn initialize(&mut self, settings: &RunSettings) -> anyhow::Result<()> {
        anyhow::ensure!(
            settings.use_daily_basic,
            "low_pe_rotation requires use_daily_basic = true"
        );
        self.sessions_seen = 0;
        Ok(())
    }

    fn on_bar(&mut self, ctx: &mut ExecutionContext, bars: &BarMap) -> anyhow::Result<()> {
        let due = self.sessions_seen % self.rebalance_every == 0;
        self.sessions_seen += 1;
        if !due {
            return Ok(());
        }

        let picks = self.pick(ctx, bars);
        if picks.is_empty() {
            debug!(session = ?ctx.now(), "no symbol with a usable P/E, skipping rebalance");
            return Ok(());
        }
        let chosen: BTreeSet<&str> = picks.iter().map(String::as_str).collect();
        let epsilon = ctx.settings().tolerances.fill_epsilon;

        let exits: Vec<String> = ctx
            .portfolio()
            .holdings(epsilon)
            .filter(|p| !chosen.contains(p.symbol.as_str()))
            .map(|p| p.symbol.clone())
            .collect();
        for symbol in exits {
            ctx.order_target(&symbol, Decimal::ZERO, None);
        }

        let weight = self.allocation / Decimal::from(picks.len());
        for symbol in &picks {
            ctx.order_target_percent(symbol, weight, None);
        }
        Ok(())
    }
}
