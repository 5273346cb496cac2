//! Monthly base fee family
//!
//! The core rating path: partition the billing window per contract,
//! prorate every charge item, overlay discounts, then derive VAT over
//! the combined set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rating_core::Result;

use crate::charge::ChargePipeline;
use crate::discount::DiscountEngine;
use crate::ports::{
    CalculationResultSavePort, ContractDiscountCommandPort, ContractDiscountQueryPort,
    ContractQueryPort,
};
use crate::proration::{build_prorated_periods, ProrationEngine};
use crate::temporal::TemporalRange;
use crate::types::{
    CalculationContext, CalculationResult, Contract, ContractId, Discount, PendingAction,
};
use crate::vat::VatEngine;

pub struct MonthlyChargeInput {
    pub contract: Contract,
    pub discounts: Vec<Discount>,
}

pub struct MonthlyFeeCalculator {
    contracts: Arc<dyn ContractQueryPort>,
    discounts: Arc<dyn ContractDiscountQueryPort>,
    save: Arc<dyn CalculationResultSavePort>,
    discount_commands: Arc<dyn ContractDiscountCommandPort>,
    proration: ProrationEngine,
    discount_engine: DiscountEngine,
    vat: VatEngine,
}

impl MonthlyFeeCalculator {
    pub fn new(
        contracts: Arc<dyn ContractQueryPort>,
        discounts: Arc<dyn ContractDiscountQueryPort>,
        save: Arc<dyn CalculationResultSavePort>,
        discount_commands: Arc<dyn ContractDiscountCommandPort>,
        vat: VatEngine,
    ) -> Self {
        Self {
            contracts,
            discounts,
            save,
            discount_commands,
            proration: ProrationEngine::new(),
            discount_engine: DiscountEngine::new(),
            vat,
        }
    }

    /// The billing window clipped to the contract's own bounds. The
    /// contract is not a charge target, but it limits every child.
    fn contract_bounds(
        ctx: &CalculationContext,
        window: &TemporalRange,
        contract: &Contract,
    ) -> Option<TemporalRange> {
        let (start, end) = contract.effective_range(ctx);
        if start > end {
            return None;
        }
        TemporalRange::new(start, end).ok()?.clip_to(window)
    }
}

#[async_trait]
impl ChargePipeline for MonthlyFeeCalculator {
    type Input = MonthlyChargeInput;

    fn family(&self) -> &'static str {
        "monthly-fee"
    }

    fn contract_id(&self, input: &Self::Input) -> ContractId {
        input.contract.id
    }

    async fn read(
        &self,
        ctx: &CalculationContext,
        contract_ids: &[ContractId],
    ) -> Result<Vec<Self::Input>> {
        let window = ctx.billing_window()?;
        let contracts = self
            .contracts
            .find_contracts_with_inventories(contract_ids, &window)
            .await?;
        let discounts = self
            .discounts
            .find_contract_discounts(contract_ids, &window)
            .await?;

        let mut by_contract: HashMap<ContractId, Vec<Discount>> = HashMap::new();
        for discount in discounts {
            by_contract.entry(discount.contract_id).or_default().push(discount);
        }

        Ok(contracts
            .into_iter()
            .map(|contract| {
                let discounts = by_contract.remove(&contract.id).unwrap_or_default();
                MonthlyChargeInput { contract, discounts }
            })
            .collect())
    }

    fn process(
        &self,
        ctx: &CalculationContext,
        input: &Self::Input,
    ) -> Result<Vec<CalculationResult>> {
        let window = ctx.billing_window()?;
        let Some(bounds) = Self::contract_bounds(ctx, &window, &input.contract) else {
            return Ok(Vec::new());
        };

        let periods = build_prorated_periods(
            &bounds,
            &input.contract.products,
            &input.contract.suspensions,
            &input.contract.billing_factors,
        );

        let base: Vec<CalculationResult> = periods
            .iter()
            .map(|period| self.proration.calculate(input.contract.id, window, period))
            .collect();

        let (base, discount_lines) = self.discount_engine.apply(base, &input.discounts);

        let mut results = base;
        results.extend(discount_lines);
        let vat_lines = self.vat.calculate_vat(&results);
        results.extend(vat_lines);
        Ok(results)
    }

    async fn write(&self, ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        self.save.save(ctx, results).await
    }

    async fn post(&self, _ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        for result in results {
            if let PendingAction::ApplyDiscount(discount_id) = result.pending_action {
                self.discount_commands
                    .apply_discount(result.contract_id, discount_id)
                    .await?;
            }
        }
        Ok(())
    }
}
