//! Market data access

pub mod source;

pub use source::{InMemoryMarketData, MarketDataSource};
