//! Proration engine
//!
//! Prices one prorated period: policy output, suspension ratio, day
//! proration against the calendar month, half-up rounding at the fee
//! scale. Bit-for-bit reproducible for billing compliance.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::trace;
use uuid::Uuid;

use crate::proration::ProratedPeriod;
use crate::temporal::TemporalRange;
use crate::types::{
    CalculationResult, ContractId, PendingAction, SuspensionType, FEE_SCALE,
};

#[derive(Debug, Clone, Default)]
pub struct ProrationEngine;

impl ProrationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Calculates one result for one period.
    ///
    /// `prorated_fee = base_price x usage_days x suspension_ratio / days_in_month`,
    /// where `days_in_month` is the length of the calendar month holding
    /// the period start, not the period's own length.
    pub fn calculate(
        &self,
        contract_id: ContractId,
        billing_window: TemporalRange,
        period: &ProratedPeriod,
    ) -> CalculationResult {
        let suspension_ratio = match period.suspension_type {
            Some(SuspensionType::Temporary) => period.charge_item.suspension_charge_ratio,
            Some(SuspensionType::NonPayment) => Decimal::ZERO,
            None => Decimal::ONE,
        };

        let base_price = period.charge_item.policy.price(&period.factors);
        let usage_days = Decimal::from(period.range.inclusive_days());
        let days_in_month = Decimal::from(period.range.days_in_start_month());

        let prorated_fee = (base_price * usage_days * suspension_ratio / days_in_month)
            .round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointAwayFromZero);

        trace!(
            contract_id,
            charge_item_id = %period.charge_item.id,
            method = ?period.charge_item.policy.method(),
            fee = %prorated_fee,
            "Prorated period priced"
        );

        CalculationResult {
            id: Uuid::new_v4(),
            contract_id,
            billing_window,
            product_offering_id: Some(period.product_offering_id.clone()),
            charge_item_id: period.charge_item.id.clone(),
            revenue_item_id: period.charge_item.revenue_item_id.clone(),
            effective: period.range,
            suspension_type: period.suspension_type,
            fee: prorated_fee,
            balance: prorated_fee,
            pending_action: PendingAction::None,
        }
    }
}
