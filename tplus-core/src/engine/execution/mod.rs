//! Execution primitives: fee schedules and fill price rules.
//!
//! Stateless. The broker borrows these to turn a pending order and a bar into
//! a fill or a rejection.

pub mod cost_model;
pub mod fill_price;

pub use cost_model::{
    truncate_quantity, CostModel, FeeSchedule, MakerTakerFees, QUANTITY_SCALE,
};
pub use fill_price::{candidate_price, limit_rejection, FillTiming};
