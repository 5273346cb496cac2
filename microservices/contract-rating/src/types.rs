//! Rating domain types

use std::collections::HashMap;

use chrono::NaiveDate;
use rating_core::{RatingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::PricingPolicy;
use crate::temporal::{Effective, TemporalRange, OPEN_END};

pub type ContractId = i64;

/// Charge-item code under which discount offset lines are emitted.
pub const DISCOUNT_CHARGE_ITEM_ID: &str = "CI-DISCOUNT";

/// Decimal scale for all persisted fees.
pub const FEE_SCALE: u32 = 5;

/// What a calculation run is for. Each type carries fixed derived flags;
/// unknown codes are rejected at the boundary, never defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationType {
    RealtimeChargeInquiry,
    FutureChargeInquiry,
    RevenueConfirmation,
    RevenueEstimation,
    ExpectationPenaltyCreation,
    ExpectationPenaltyInquiry,
    TerminationInquiry,
    PreviewInquiry,
    BfSaleInquiry,
}

impl CalculationType {
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "REALTIME_CHARGE_INQUIRY" => Ok(Self::RealtimeChargeInquiry),
            "FUTURE_CHARGE_INQUIRY" => Ok(Self::FutureChargeInquiry),
            "REVENUE_CONFIRMATION" => Ok(Self::RevenueConfirmation),
            "REVENUE_ESTIMATION" => Ok(Self::RevenueEstimation),
            "EXPECTATION_PENALTY_CREATION" => Ok(Self::ExpectationPenaltyCreation),
            "EXPECTATION_PENALTY_INQUIRY" => Ok(Self::ExpectationPenaltyInquiry),
            "TERMINATION_INQUIRY" => Ok(Self::TerminationInquiry),
            "PREVIEW_INQUIRY" => Ok(Self::PreviewInquiry),
            "BF_SALE_INQUIRY" => Ok(Self::BfSaleInquiry),
            _ => Err(RatingError::NotFound(format!(
                "unknown calculation type code: {}",
                code
            ))),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::RealtimeChargeInquiry => "REALTIME_CHARGE_INQUIRY",
            Self::FutureChargeInquiry => "FUTURE_CHARGE_INQUIRY",
            Self::RevenueConfirmation => "REVENUE_CONFIRMATION",
            Self::RevenueEstimation => "REVENUE_ESTIMATION",
            Self::ExpectationPenaltyCreation => "EXPECTATION_PENALTY_CREATION",
            Self::ExpectationPenaltyInquiry => "EXPECTATION_PENALTY_INQUIRY",
            Self::TerminationInquiry => "TERMINATION_INQUIRY",
            Self::PreviewInquiry => "PREVIEW_INQUIRY",
            Self::BfSaleInquiry => "BF_SALE_INQUIRY",
        }
    }

    /// Whether the raw billing end date itself is billed (the window is
    /// extended by one day before partitioning).
    pub fn includes_billing_end_date(&self) -> bool {
        matches!(
            self,
            Self::FutureChargeInquiry
                | Self::RevenueConfirmation
                | Self::RevenueEstimation
                | Self::ExpectationPenaltyCreation
                | Self::ExpectationPenaltyInquiry
        )
    }

    /// Whether the preferred termination date bounds the contract.
    pub fn is_termination_assumed(&self) -> bool {
        matches!(
            self,
            Self::TerminationInquiry
                | Self::ExpectationPenaltyCreation
                | Self::ExpectationPenaltyInquiry
        )
    }

    /// Only confirmed revenue runs may mutate discount/charge state.
    pub fn is_postable(&self) -> bool {
        matches!(self, Self::RevenueConfirmation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationPeriod {
    PreBillingPreviousMonth,
    PreBillingCurrentMonth,
    PostBillingCurrentMonth,
}

impl CalculationPeriod {
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "PRE_BILLING_PREVIOUS_MONTH" => Ok(Self::PreBillingPreviousMonth),
            "PRE_BILLING_CURRENT_MONTH" => Ok(Self::PreBillingCurrentMonth),
            "POST_BILLING_CURRENT_MONTH" => Ok(Self::PostBillingCurrentMonth),
            _ => Err(RatingError::NotFound(format!(
                "unknown calculation period code: {}",
                code
            ))),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::PreBillingPreviousMonth => "PRE_BILLING_PREVIOUS_MONTH",
            Self::PreBillingCurrentMonth => "PRE_BILLING_CURRENT_MONTH",
            Self::PostBillingCurrentMonth => "POST_BILLING_CURRENT_MONTH",
        }
    }
}

/// Context shared by every component of one calculation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculationContext {
    pub billing_start_date: NaiveDate,
    pub billing_end_date: NaiveDate,
    pub calculation_type: CalculationType,
    pub calculation_period: CalculationPeriod,
}

impl CalculationContext {
    /// The inclusive billing window all charges are partitioned against.
    ///
    /// When the calculation type includes the billing end date, or the
    /// period is pre-billing previous month, the effective end is
    /// `billing_end_date + 1 day`; the effective end is an exclusive
    /// bound, so the inclusive window runs to the day before it.
    pub fn billing_window(&self) -> Result<TemporalRange> {
        let include = self.calculation_type.includes_billing_end_date()
            || self.calculation_period == CalculationPeriod::PreBillingPreviousMonth;
        let end = if include {
            self.billing_end_date
        } else {
            self.billing_end_date
                .pred_opt()
                .ok_or_else(|| RatingError::Validation("billing end date underflow".to_string()))?
        };
        TemporalRange::new(self.billing_start_date, end)
    }

    pub fn is_postable(&self) -> bool {
        self.calculation_type.is_postable()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspensionType {
    /// Customer-requested pause; charged at the item's suspension ratio.
    Temporary,
    /// Non-payment cutoff; charged at zero.
    NonPayment,
}

impl SuspensionType {
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "TEMPORARY_SUSPENSION" => Ok(Self::Temporary),
            "NON_PAYMENT_SUSPENSION" => Ok(Self::NonPayment),
            _ => Err(RatingError::NotFound(format!(
                "unknown suspension type code: {}",
                code
            ))),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Temporary => "TEMPORARY_SUSPENSION",
            Self::NonPayment => "NON_PAYMENT_SUSPENSION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationMethod {
    FlatRate,
    MatchingFactor,
    RangeFactor,
    StepFactor,
    TierFactor,
    UnitPrice,
}

impl CalculationMethod {
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "FLAT_RATE" => Ok(Self::FlatRate),
            "MATCHING_FACTOR" => Ok(Self::MatchingFactor),
            "RANGE_FACTOR" => Ok(Self::RangeFactor),
            "STEP_FACTOR" => Ok(Self::StepFactor),
            "TIER_FACTOR" => Ok(Self::TierFactor),
            "UNIT_PRICE" => Ok(Self::UnitPrice),
            _ => Err(RatingError::NotFound(format!(
                "unknown calculation method code: {}",
                code
            ))),
        }
    }
}

/// A contract with all billing inputs loaded for one calculation call.
/// Children are read-only views assembled fresh per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    /// First-ever subscription date, carried for reporting. Charging is
    /// bounded by the current cycle's `subscribed_on` only.
    pub first_subscribed_on: NaiveDate,
    pub subscribed_on: NaiveDate,
    pub terminated_on: Option<NaiveDate>,
    pub preferred_terminated_on: Option<NaiveDate>,
    pub products: Vec<Product>,
    pub suspensions: Vec<Suspension>,
    pub billing_factors: Vec<AdditionalBillingFactor>,
}

impl Contract {
    /// Contract-level bounds. Not a charge target itself, but clips the
    /// billing window for every child entity.
    pub fn effective_range(&self, ctx: &CalculationContext) -> (NaiveDate, NaiveDate) {
        let end = if ctx.calculation_type.is_termination_assumed() {
            self.preferred_terminated_on.or(self.terminated_on)
        } else {
            self.terminated_on
        };
        (self.subscribed_on, end.unwrap_or(OPEN_END))
    }
}

/// One subscription of a product offering under a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub offering: ProductOffering,
    pub subscribed_on: NaiveDate,
    pub activated_on: Option<NaiveDate>,
    pub terminated_on: Option<NaiveDate>,
}

impl Effective for Product {
    fn effective_start(&self) -> NaiveDate {
        self.activated_on.unwrap_or(self.subscribed_on)
    }

    fn effective_end(&self) -> NaiveDate {
        self.terminated_on.unwrap_or(OPEN_END)
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOffering {
    pub id: String,
    pub name: String,
    pub charge_items: Vec<ChargeItem>,
}

/// A billable line within an offering, bound to one pricing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeItem {
    pub id: String,
    pub name: String,
    pub revenue_item_id: Option<String>,
    /// Charge ratio in `0..=1` applied under a temporary suspension.
    pub suspension_charge_ratio: Decimal,
    pub policy: PricingPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub suspension_type: SuspensionType,
    pub started_on: NaiveDate,
    pub ended_on: Option<NaiveDate>,
}

impl Effective for Suspension {
    fn effective_start(&self) -> NaiveDate {
        self.started_on
    }

    fn effective_end(&self) -> NaiveDate {
        self.ended_on.unwrap_or(OPEN_END)
    }
}

/// A key-value factor map (line count, speed tier, ...) valid over an
/// interval; supplies pricing policy inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalBillingFactor {
    pub factors: HashMap<String, String>,
    pub started_on: NaiveDate,
    pub ended_on: Option<NaiveDate>,
}

impl Effective for AdditionalBillingFactor {
    fn effective_start(&self) -> NaiveDate {
        self.started_on
    }

    fn effective_end(&self) -> NaiveDate {
        self.ended_on.unwrap_or(OPEN_END)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyUnit {
    Rate,
    Amount,
}

/// A contract-level discount targeting one product offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub discount_id: i64,
    pub contract_id: ContractId,
    pub product_offering_id: String,
    pub apply_unit: ApplyUnit,
    /// Percentage for [`ApplyUnit::Rate`], money for [`ApplyUnit::Amount`].
    pub value: Decimal,
    pub started_on: NaiveDate,
    pub ended_on: Option<NaiveDate>,
}

impl Effective for Discount {
    fn effective_start(&self) -> NaiveDate {
        self.started_on
    }

    fn effective_end(&self) -> NaiveDate {
        self.ended_on.unwrap_or(OPEN_END)
    }
}

impl Discount {
    /// A discount applies only to results for its offering whose billing
    /// window overlaps the discount's validity.
    pub fn is_target(&self, result: &CalculationResult) -> bool {
        result.product_offering_id.as_deref() == Some(self.product_offering_id.as_str())
            && self.effective_start() <= result.billing_window.end()
            && result.billing_window.start() <= self.effective_end()
    }
}

/// Revenue catalog row; maps a revenue item to its VAT counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueMasterData {
    pub revenue_item_id: String,
    pub name: String,
    pub effective_start: NaiveDate,
    pub effective_end: Option<NaiveDate>,
    pub overdue_revenue_item_id: Option<String>,
    pub vat_revenue_item_id: Option<String>,
}

/// An installation work order billed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationHistory {
    pub id: i64,
    pub contract_id: ContractId,
    pub installed_on: NaiveDate,
    pub fee: Decimal,
    pub revenue_item_id: Option<String>,
    pub billed: bool,
}

/// A device paid off in monthly rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInstallment {
    pub id: i64,
    pub contract_id: ContractId,
    pub started_on: NaiveDate,
    pub monthly_amount: Decimal,
    pub total_rounds: u32,
    pub billed_rounds: u32,
    pub revenue_item_id: Option<String>,
}

/// State transition owed after a postable run persists its results.
/// Plain data, executed by the post phase; inquiry runs never dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAction {
    None,
    MarkInstallationBilled(i64),
    MarkInstallmentBilled(i64),
    ApplyDiscount(i64),
}

/// One calculated charge line. Immutable once written; the discount
/// engine produces updated copies rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub id: Uuid,
    pub contract_id: ContractId,
    pub billing_window: TemporalRange,
    pub product_offering_id: Option<String>,
    pub charge_item_id: String,
    pub revenue_item_id: Option<String>,
    pub effective: TemporalRange,
    pub suspension_type: Option<SuspensionType>,
    /// Policy output after proration; never changed after creation.
    pub fee: Decimal,
    /// Running amount still billable; debited by discounts.
    pub balance: Decimal,
    pub pending_action: PendingAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    Range,
    All,
}

impl CleanupMode {
    pub fn from_code(code: &str) -> Result<Self> {
        match code.to_ascii_uppercase().as_str() {
            "RANGE" => Ok(Self::Range),
            "ALL" => Ok(Self::All),
            _ => Err(RatingError::NotFound(format!(
                "unknown cleanup mode: {}",
                code
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculation_type_codes_round_trip() {
        for code in [
            "REALTIME_CHARGE_INQUIRY",
            "FUTURE_CHARGE_INQUIRY",
            "REVENUE_CONFIRMATION",
            "REVENUE_ESTIMATION",
            "EXPECTATION_PENALTY_CREATION",
            "EXPECTATION_PENALTY_INQUIRY",
            "TERMINATION_INQUIRY",
            "PREVIEW_INQUIRY",
            "BF_SALE_INQUIRY",
        ] {
            let parsed = CalculationType::from_code(code).expect("known code");
            assert_eq!(parsed.as_code(), code);
        }
    }

    #[test]
    fn test_unknown_codes_fail_fast() {
        assert!(CalculationType::from_code("NOPE").is_err());
        assert!(CalculationPeriod::from_code("NOPE").is_err());
        assert!(SuspensionType::from_code("NOPE").is_err());
        assert!(CalculationMethod::from_code("NOPE").is_err());
        assert!(CleanupMode::from_code("NOPE").is_err());
    }

    #[test]
    fn test_only_revenue_confirmation_is_postable() {
        for code in [
            "REALTIME_CHARGE_INQUIRY",
            "FUTURE_CHARGE_INQUIRY",
            "REVENUE_ESTIMATION",
            "TERMINATION_INQUIRY",
            "PREVIEW_INQUIRY",
            "BF_SALE_INQUIRY",
        ] {
            assert!(!CalculationType::from_code(code).expect("known").is_postable());
        }
        assert!(CalculationType::RevenueConfirmation.is_postable());
    }

    #[test]
    fn test_billing_window_includes_end_date() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).expect("valid date");
        let ctx = CalculationContext {
            billing_start_date: d(2025, 5, 1),
            billing_end_date: d(2025, 5, 31),
            calculation_type: CalculationType::RevenueConfirmation,
            calculation_period: CalculationPeriod::PostBillingCurrentMonth,
        };
        let window = ctx.billing_window().expect("valid window");
        assert_eq!(window.end(), d(2025, 5, 31));

        // Inquiry types treat the end date as exclusive...
        let inquiry = CalculationContext {
            calculation_type: CalculationType::RealtimeChargeInquiry,
            ..ctx
        };
        assert_eq!(inquiry.billing_window().expect("valid window").end(), d(2025, 5, 30));

        // ...unless the period is pre-billing previous month.
        let previous = CalculationContext {
            calculation_type: CalculationType::RealtimeChargeInquiry,
            calculation_period: CalculationPeriod::PreBillingPreviousMonth,
            ..ctx
        };
        assert_eq!(previous.billing_window().expect("valid window").end(), d(2025, 5, 31));
    }
}
