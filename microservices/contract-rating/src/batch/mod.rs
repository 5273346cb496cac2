//! Partitioned batch execution
//!
//! Job parameter parsing from the environment and the executor that
//! fans a calculation run out over hash partitions.

mod executor;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use rating_core::{RatingError, Result};
use rust_decimal::Decimal;

use crate::types::{
    CalculationContext, CalculationPeriod, CalculationType, CleanupMode, ContractId,
};
use crate::vat::DEFAULT_VAT_RATE;

pub use executor::PartitionedBatchExecutor;
#[cfg(test)]
pub use executor::BatchSummary;

const DEFAULT_THREAD_COUNT: usize = 4;
const DEFAULT_CHUNK_SIZE: usize = 100;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// One run's parameters, resolved before any work starts. Parse
/// failures abort the run; nothing is defaulted from an unknown code.
#[derive(Debug, Clone)]
pub struct JobParameters {
    pub billing_start_date: NaiveDate,
    pub billing_end_date: NaiveDate,
    pub calculation_type: CalculationType,
    pub calculation_period: CalculationPeriod,
    /// Restricts the run to these contracts; `None` rates everything.
    pub contract_ids: Option<Vec<ContractId>>,
    pub thread_count: usize,
    pub chunk_size: usize,
    pub cleanup_mode: CleanupMode,
    pub skip_cleanup: bool,
    pub vat_rate: Decimal,
    pub vat_enabled: bool,
    pub shutdown_grace: Duration,
}

impl JobParameters {
    pub fn from_env() -> Result<Self> {
        let params = Self {
            billing_start_date: required_date("BILLING_START_DATE")?,
            billing_end_date: required_date("BILLING_END_DATE")?,
            calculation_type: CalculationType::from_code(&required("CALCULATION_TYPE")?)?,
            calculation_period: CalculationPeriod::from_code(&required("CALCULATION_PERIOD")?)?,
            contract_ids: contract_ids_from_env()?,
            thread_count: optional_parsed("THREAD_COUNT", DEFAULT_THREAD_COUNT)?,
            chunk_size: optional_parsed("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            cleanup_mode: match env::var("CLEANUP_MODE") {
                Ok(code) => CleanupMode::from_code(&code)?,
                Err(_) => CleanupMode::Range,
            },
            skip_cleanup: flag_from_env("SKIP_CLEANUP", false)?,
            vat_rate: optional_parsed("VAT_RATE", DEFAULT_VAT_RATE)?,
            vat_enabled: flag_from_env("VAT_ENABLED", true)?,
            shutdown_grace: Duration::from_secs(optional_parsed(
                "SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(RatingError::Validation(
                "THREAD_COUNT must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(RatingError::Validation(
                "CHUNK_SIZE must be at least 1".to_string(),
            ));
        }
        if self.billing_start_date > self.billing_end_date {
            return Err(RatingError::Validation(format!(
                "billing start {} is after billing end {}",
                self.billing_start_date, self.billing_end_date
            )));
        }
        Ok(())
    }

    pub fn context(&self) -> CalculationContext {
        CalculationContext {
            billing_start_date: self.billing_start_date,
            billing_end_date: self.billing_end_date,
            calculation_type: self.calculation_type,
            calculation_period: self.calculation_period,
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| RatingError::Config(format!("{} is not set", key)))
}

fn required_date(key: &str) -> Result<NaiveDate> {
    let raw = required(key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| RatingError::Config(format!("{}: invalid date {:?}: {}", key, raw, e)))
}

fn optional_parsed<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| RatingError::Config(format!("{}: invalid value {:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

fn flag_from_env(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(RatingError::Config(format!(
                "{}: invalid flag {:?}",
                key, raw
            ))),
        },
        Err(_) => Ok(default),
    }
}

/// Comma-separated ids; unset or empty means the whole contract base.
fn contract_ids_from_env() -> Result<Option<Vec<ContractId>>> {
    let raw = match env::var("CONTRACT_IDS") {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .split(',')
        .map(|part| {
            part.trim().parse::<ContractId>().map_err(|e| {
                RatingError::Config(format!("CONTRACT_IDS: invalid id {:?}: {}", part, e))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
