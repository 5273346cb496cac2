//! Charge calculation pipelines
//!
//! The generic read -> process -> write -> post contract, instantiated
//! once per charge family (base monthly fee, installation one-time fee,
//! device installment fee). Composition order and postability gating
//! are shared; each family supplies its own phases.

mod monthly;
mod onetime;

use async_trait::async_trait;
use rating_core::Result;
use tracing::{debug, error};

use crate::types::{CalculationContext, CalculationResult, ContractId};

pub use monthly::MonthlyFeeCalculator;
pub use onetime::{DeviceInstallmentCalculator, InstallationFeeCalculator};
#[cfg(test)]
pub use onetime::{DEVICE_INSTALLMENT_CHARGE_ITEM_ID, INSTALLATION_CHARGE_ITEM_ID};

/// The four phases of one charge family. `process` is pure; reads and
/// writes go through ports.
#[async_trait]
pub trait ChargePipeline: Send + Sync {
    type Input: Send + Sync;

    fn family(&self) -> &'static str;

    fn contract_id(&self, input: &Self::Input) -> ContractId;

    /// Loads the family's inputs for a chunk of contracts in one
    /// batched call.
    async fn read(
        &self,
        ctx: &CalculationContext,
        contract_ids: &[ContractId],
    ) -> Result<Vec<Self::Input>>;

    fn process(
        &self,
        ctx: &CalculationContext,
        input: &Self::Input,
    ) -> Result<Vec<CalculationResult>>;

    async fn write(&self, ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()>;

    /// Side-effecting state transitions; invoked only for postable runs.
    async fn post(&self, ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()>;
}

/// Object-safe execution surface the batch executor drives.
#[async_trait]
pub trait ChargeCalculator: Send + Sync {
    fn family(&self) -> &'static str;

    async fn execute(
        &self,
        ctx: &CalculationContext,
        contract_ids: &[ContractId],
    ) -> Result<Vec<CalculationResult>>;
}

#[async_trait]
impl<P: ChargePipeline> ChargeCalculator for P {
    fn family(&self) -> &'static str {
        ChargePipeline::family(self)
    }

    /// read -> process -> write -> post, identical across families.
    async fn execute(
        &self,
        ctx: &CalculationContext,
        contract_ids: &[ContractId],
    ) -> Result<Vec<CalculationResult>> {
        let inputs = self.read(ctx, contract_ids).await?;

        let mut results = Vec::new();
        for input in &inputs {
            let contract_id = self.contract_id(input);
            let processed = self.process(ctx, input).map_err(|err| {
                error!(
                    contract_id,
                    family = ChargePipeline::family(self),
                    error = %err,
                    "Contract calculation failed"
                );
                err
            })?;
            results.extend(processed);
        }

        self.write(ctx, &results).await?;
        if ctx.is_postable() {
            self.post(ctx, &results).await?;
        }

        debug!(
            family = ChargePipeline::family(self),
            contracts = inputs.len(),
            results = results.len(),
            "Charge family executed"
        );
        Ok(results)
    }
}
