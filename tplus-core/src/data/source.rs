//! Market data source trait and the in-memory implementation.
//!
//! The engine never fetches data itself. Whatever produces bars (CSV files,
//! a database, a test fixture) implements [`MarketDataSource`], and the
//! orchestrator preloads everything it needs before the session loop starts.

use crate::domain::bar::Bar;
use crate::domain::daily_basic::DailyBasic;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Read access to sessions, bars and daily-basic records.
pub trait MarketDataSource {
    /// Trading sessions within `[start, end]`, ascending, no duplicates.
    fn trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;

    /// Bars for `symbol` within `[start, end]`, ascending by date. A session
    /// without a bar means the symbol did not trade.
    fn bars_for(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar>;

    /// Daily-basic record for `symbol` on `date`, if any.
    fn daily_basic(&self, symbol: &str, date: NaiveDate) -> Option<DailyBasic>;
}

/// Market data held in memory.
///
/// Without an explicit calendar, the calendar is the union of all bar dates.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    calendar: Option<BTreeSet<NaiveDate>>,
    bars: BTreeMap<String, BTreeMap<NaiveDate, Bar>>,
    daily_basic: BTreeMap<String, BTreeMap<NaiveDate, DailyBasic>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit trading calendar instead of the bar-date union.
    pub fn with_calendar(mut self, sessions: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.calendar = Some(sessions.into_iter().collect());
        self
    }

    pub fn with_bars(mut self, bars: impl IntoIterator<Item = Bar>) -> Self {
        for bar in bars {
            self.insert_bar(bar);
        }
        self
    }

    pub fn with_daily_basic(mut self, records: impl IntoIterator<Item = DailyBasic>) -> Self {
        for record in records {
            self.insert_daily_basic(record);
        }
        self
    }

    /// Insert a bar, replacing any existing bar for the same symbol and date.
    pub fn insert_bar(&mut self, bar: Bar) {
        self.bars
            .entry(bar.symbol.clone())
            .or_default()
            .insert(bar.date, bar);
    }

    pub fn insert_daily_basic(&mut self, record: DailyBasic) {
        self.daily_basic
            .entry(record.symbol.clone())
            .or_default()
            .insert(record.date, record);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> + '_ {
        self.bars.keys().map(String::as_str)
    }

    pub fn bar_count(&self) -> usize {
        self.bars.values().map(BTreeMap::len).sum()
    }
}

impl MarketDataSource for InMemoryMarketData {
    fn trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        match &self.calendar {
            Some(sessions) => sessions.range(start..=end).copied().collect(),
            None => {
                let union: BTreeSet<NaiveDate> = self
                    .bars
                    .values()
                    .flat_map(|series| series.range(start..=end).map(|(d, _)| *d))
                    .collect();
                union.into_iter().collect()
            }
        }
    }

    fn bars_for(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
        self.bars
            .get(symbol)
            .map(|series| series.range(start..=end).map(|(_, b)| b.clone()).collect())
            .unwrap_or_default()
    }

    fn daily_basic(&self, symbol: &str, date: NaiveDate) -> Option<DailyBasic> {
        self.daily_basic.get(symbol)?.get(&date).cloned()
    }
}
