//! Rating Core - Shared infrastructure for the contract rating platform
//!
//! This crate provides:
//! - Error handling utilities shared by all rating crates
//! - Configuration management

pub mod config;
pub mod error;

pub use config::RuntimeConfig;
pub use error::{RatingError, Result};
