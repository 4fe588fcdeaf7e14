use super::Strategy;
use crate::domain::bar::BarMap;
use crate::engine::context::ExecutionContext;
use crate::engine::settings::RunSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

/// Equal-weight buy and hold.
///
/// Each universe symbol is bought once, the first session it trades, sized
/// to `allocation / universe size` of portfolio value.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    allocation: Decimal,
    weight: Decimal,
    entered: BTreeSet<String>,
}

impl BuyAndHold {
    pub const DEFAULT_ALLOCATION: Decimal = dec!(0.98);

    pub fn new(allocation: Decimal) -> Self {
        Self {
            allocation,
            weight: allocation,
            entered: BTreeSet::new(),
        }
    }
}

impl Default for BuyAndHold {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALLOCATION)
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn initialize(&mut self, settings: &RunSettings) -> anyhow::Result<()> {
        anyhow::ensure!(!settings.symbols.is_empty(), "buy_and_hold needs at least one symbol");
        self.weight = self.allocation / Decimal::from(settings.symbols.len());
        self.entered.clear();
        Ok(())
    }

    fn on_bar(&mut self, ctx: &mut ExecutionContext, bars: &BarMap) -> anyhow::Result<()> {
        let universe = ctx.settings().symbols.clone();
        for symbol in universe {
            if self.entered.contains(&symbol) || !bars.contains_key(&symbol) {
                continue;
            }
            let value = ctx.total_value() * self.weight;
            if ctx.order_target_value(&symbol, value, None).is_some() {
                self.entered.insert(symbol);
            }
        }
        Ok(())
    }
}
