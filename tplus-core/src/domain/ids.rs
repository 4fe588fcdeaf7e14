use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, unique within a single backtest run.
///
/// Assigned sequentially by [`IdGen`], so ordering by ID is ordering by
/// creation time. Settlement walks pending orders in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ORD-{:06}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Sequential ID generator owned by one engine instance.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next_order: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(self.next_order)
    }

    /// Number of order IDs handed out so far.
    pub fn issued(&self) -> u64 {
        self.next_order
    }
}
