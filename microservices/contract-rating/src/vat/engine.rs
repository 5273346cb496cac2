//! VAT engine
//!
//! Derives VAT lines from calculated results via the revenue master
//! mapping. Unmapped revenue items and disabled VAT are no-ops, never
//! errors.

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::types::{CalculationResult, PendingAction, FEE_SCALE};
use crate::vat::RevenueMasterCache;

/// Statutory default VAT rate (10%).
pub const DEFAULT_VAT_RATE: Decimal = dec!(0.10);

#[derive(Clone)]
pub struct VatEngine {
    cache: Arc<RevenueMasterCache>,
    vat_rate: Decimal,
    enabled: bool,
}

impl VatEngine {
    pub fn new(cache: Arc<RevenueMasterCache>, vat_rate: Decimal, enabled: bool) -> Self {
        Self { cache, vat_rate, enabled }
    }

    /// Emits one VAT line per result whose revenue item maps to a VAT
    /// revenue item. VAT lines carry zero balance: they are never
    /// discount targets.
    pub fn calculate_vat(&self, results: &[CalculationResult]) -> Vec<CalculationResult> {
        if !self.enabled {
            return Vec::new();
        }

        let catalog = self.cache.snapshot();
        results
            .iter()
            .filter_map(|result| {
                let revenue_item_id = result.revenue_item_id.as_deref()?;
                let vat_revenue_item_id = catalog
                    .get(revenue_item_id)?
                    .vat_revenue_item_id
                    .clone()?;

                let vat_amount = (result.fee * self.vat_rate)
                    .round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointAwayFromZero);

                Some(CalculationResult {
                    id: Uuid::new_v4(),
                    contract_id: result.contract_id,
                    billing_window: result.billing_window,
                    product_offering_id: result.product_offering_id.clone(),
                    charge_item_id: result.charge_item_id.clone(),
                    revenue_item_id: Some(vat_revenue_item_id),
                    effective: result.effective,
                    suspension_type: result.suspension_type,
                    fee: vat_amount,
                    balance: Decimal::ZERO,
                    pending_action: PendingAction::None,
                })
            })
            .collect()
    }
}
