//! VAT
//!
//! Revenue-master cache and VAT line derivation.

mod cache;
mod engine;

pub use cache::RevenueMasterCache;
pub use engine::{VatEngine, DEFAULT_VAT_RATE};
