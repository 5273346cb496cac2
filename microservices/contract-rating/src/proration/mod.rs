//! Proration
//!
//! Temporal partitioning of the billing window and per-period fee
//! calculation.

mod engine;
mod partitioner;

pub use engine::ProrationEngine;
pub use partitioner::{build_prorated_periods, ProratedPeriod};
