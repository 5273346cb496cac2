//! Discounts
//!
//! Contract-level discount matching and offset line generation.

mod engine;

pub use engine::DiscountEngine;
