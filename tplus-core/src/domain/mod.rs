//! Domain types: bars, orders, positions and the portfolio ledger.

pub mod bar;
pub mod daily_basic;
pub mod ids;
pub mod order;
pub mod portfolio;
pub mod position;

pub use bar::{Bar, BarMap};
pub use daily_basic::DailyBasic;
pub use ids::{IdGen, OrderId};
pub use order::{
    FeeBreakdown, Order, OrderAuditEntry, OrderError, OrderSide, OrderStatus, RejectReason,
};
pub use portfolio::Portfolio;
pub use position::Position;

/// Symbol type alias
pub type Symbol = String;
