//! Bar, the fundamental market data unit.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OHLCV bar for a single symbol on a single session.
///
/// A missing bar means the symbol did not trade that session (halted or
/// delisted). Bars are never zero-filled to represent that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Bars available in one session, keyed by symbol. Only symbols that traded
/// appear in the map.
pub type BarMap = BTreeMap<String, Bar>;

impl Bar {
    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close,
    /// and strictly positive prices.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > Decimal::ZERO
            && self.close > Decimal::ZERO
    }

    /// A flat bar traded at a single price all session (open == high == low == close).
    pub fn is_flat(&self) -> bool {
        self.open == self.high && self.high == self.low && self.low == self.close
    }
}
