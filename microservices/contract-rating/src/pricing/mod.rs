//! Pricing policies
//!
//! Pure strategies from billing factors to a base monetary amount.

mod policy;

pub use policy::{BillingFactors, PricingPolicy};
