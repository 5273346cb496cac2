//! Discount engine
//!
//! Matches contract discounts to prorated base results and emits
//! negative offset lines. Base results are consumed and returned with
//! debited balances; nothing is mutated in place.

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::types::{
    ApplyUnit, CalculationResult, Discount, PendingAction, DISCOUNT_CHARGE_ITEM_ID, FEE_SCALE,
};

#[derive(Debug, Clone, Default)]
pub struct DiscountEngine;

impl DiscountEngine {
    pub fn new() -> Self {
        Self
    }

    /// Applies `discounts` to the base results.
    ///
    /// Returns the base results with debited balances together with the
    /// generated discount lines. A discount with no matching base result
    /// contributes nothing; a computed amount of zero emits no line.
    pub fn apply(
        &self,
        mut base_results: Vec<CalculationResult>,
        discounts: &[Discount],
    ) -> (Vec<CalculationResult>, Vec<CalculationResult>) {
        let mut discount_lines = Vec::new();

        for discount in discounts {
            for base in base_results.iter_mut() {
                if !discount.is_target(base) {
                    continue;
                }

                let amount = discount_amount(discount, base.balance);
                if amount == Decimal::ZERO {
                    continue;
                }

                base.balance -= amount;
                discount_lines.push(offset_line(base, discount, amount));
            }
        }

        (base_results, discount_lines)
    }
}

/// RATE discounts take a percentage of the running balance; AMOUNT
/// discounts are capped at the balance so it never goes below zero.
fn discount_amount(discount: &Discount, balance: Decimal) -> Decimal {
    match discount.apply_unit {
        ApplyUnit::Rate => (balance * discount.value / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointAwayFromZero),
        ApplyUnit::Amount => discount.value.min(balance),
    }
}

fn offset_line(
    base: &CalculationResult,
    discount: &Discount,
    amount: Decimal,
) -> CalculationResult {
    CalculationResult {
        id: Uuid::new_v4(),
        contract_id: base.contract_id,
        billing_window: base.billing_window,
        product_offering_id: base.product_offering_id.clone(),
        charge_item_id: DISCOUNT_CHARGE_ITEM_ID.to_string(),
        revenue_item_id: None,
        effective: base.effective,
        suspension_type: None,
        fee: -amount,
        balance: -amount,
        pending_action: PendingAction::ApplyDiscount(discount.discount_id),
    }
}
