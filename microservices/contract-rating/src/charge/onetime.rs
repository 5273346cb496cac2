//! One-time charge families
//!
//! Installation fees are billed once on their work-order date; device
//! installments bill one round per billing month until paid off.
//! Neither is prorated, but both feed the VAT overlay and flow through
//! the same pipeline phases as the monthly family.

use std::sync::Arc;

use async_trait::async_trait;
use rating_core::Result;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::charge::ChargePipeline;
use crate::ports::{
    CalculationResultSavePort, DeviceInstallmentCommandPort, DeviceInstallmentQueryPort,
    InstallationCommandPort, InstallationQueryPort,
};
use crate::temporal::TemporalRange;
use crate::types::{
    CalculationContext, CalculationResult, ContractId, DeviceInstallment, InstallationHistory,
    PendingAction,
};
use crate::vat::VatEngine;

pub const INSTALLATION_CHARGE_ITEM_ID: &str = "CI-INSTALL";
pub const DEVICE_INSTALLMENT_CHARGE_ITEM_ID: &str = "CI-INSTALLMENT";

pub struct InstallationFeeCalculator {
    installations: Arc<dyn InstallationQueryPort>,
    save: Arc<dyn CalculationResultSavePort>,
    commands: Arc<dyn InstallationCommandPort>,
    vat: VatEngine,
}

impl InstallationFeeCalculator {
    pub fn new(
        installations: Arc<dyn InstallationQueryPort>,
        save: Arc<dyn CalculationResultSavePort>,
        commands: Arc<dyn InstallationCommandPort>,
        vat: VatEngine,
    ) -> Self {
        Self { installations, save, commands, vat }
    }
}

#[async_trait]
impl ChargePipeline for InstallationFeeCalculator {
    type Input = InstallationHistory;

    fn family(&self) -> &'static str {
        "installation-fee"
    }

    fn contract_id(&self, input: &Self::Input) -> ContractId {
        input.contract_id
    }

    async fn read(
        &self,
        ctx: &CalculationContext,
        contract_ids: &[ContractId],
    ) -> Result<Vec<Self::Input>> {
        let window = ctx.billing_window()?;
        let installations = self
            .installations
            .find_installations(contract_ids, &window)
            .await?;
        Ok(installations.into_iter().filter(|i| !i.billed).collect())
    }

    fn process(
        &self,
        ctx: &CalculationContext,
        input: &Self::Input,
    ) -> Result<Vec<CalculationResult>> {
        let effective = TemporalRange::new(input.installed_on, input.installed_on)?;
        let result = CalculationResult {
            id: Uuid::new_v4(),
            contract_id: input.contract_id,
            billing_window: ctx.billing_window()?,
            product_offering_id: None,
            charge_item_id: INSTALLATION_CHARGE_ITEM_ID.to_string(),
            revenue_item_id: input.revenue_item_id.clone(),
            effective,
            suspension_type: None,
            fee: input.fee,
            balance: input.fee,
            pending_action: PendingAction::MarkInstallationBilled(input.id),
        };

        let mut results = vec![result];
        let vat_lines = self.vat.calculate_vat(&results);
        results.extend(vat_lines);
        Ok(results)
    }

    async fn write(&self, ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        self.save.save(ctx, results).await
    }

    async fn post(&self, _ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        for result in results {
            if let PendingAction::MarkInstallationBilled(id) = result.pending_action {
                self.commands.mark_billed(id).await?;
            }
        }
        Ok(())
    }
}

pub struct DeviceInstallmentCalculator {
    installments: Arc<dyn DeviceInstallmentQueryPort>,
    save: Arc<dyn CalculationResultSavePort>,
    commands: Arc<dyn DeviceInstallmentCommandPort>,
    vat: VatEngine,
}

impl DeviceInstallmentCalculator {
    pub fn new(
        installments: Arc<dyn DeviceInstallmentQueryPort>,
        save: Arc<dyn CalculationResultSavePort>,
        commands: Arc<dyn DeviceInstallmentCommandPort>,
        vat: VatEngine,
    ) -> Self {
        Self { installments, save, commands, vat }
    }
}

#[async_trait]
impl ChargePipeline for DeviceInstallmentCalculator {
    type Input = DeviceInstallment;

    fn family(&self) -> &'static str {
        "device-installment"
    }

    fn contract_id(&self, input: &Self::Input) -> ContractId {
        input.contract_id
    }

    async fn read(
        &self,
        ctx: &CalculationContext,
        contract_ids: &[ContractId],
    ) -> Result<Vec<Self::Input>> {
        let window = ctx.billing_window()?;
        let installments = self
            .installments
            .find_device_installments(contract_ids, &window)
            .await?;
        Ok(installments
            .into_iter()
            .filter(|i| i.billed_rounds < i.total_rounds)
            .collect())
    }

    fn process(
        &self,
        ctx: &CalculationContext,
        input: &Self::Input,
    ) -> Result<Vec<CalculationResult>> {
        let window = ctx.billing_window()?;
        // One round per billing month, full amount, no proration.
        let fee: Decimal = input.monthly_amount;
        let result = CalculationResult {
            id: Uuid::new_v4(),
            contract_id: input.contract_id,
            billing_window: window,
            product_offering_id: None,
            charge_item_id: DEVICE_INSTALLMENT_CHARGE_ITEM_ID.to_string(),
            revenue_item_id: input.revenue_item_id.clone(),
            effective: window,
            suspension_type: None,
            fee,
            balance: fee,
            pending_action: PendingAction::MarkInstallmentBilled(input.id),
        };

        let mut results = vec![result];
        let vat_lines = self.vat.calculate_vat(&results);
        results.extend(vat_lines);
        Ok(results)
    }

    async fn write(&self, ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        self.save.save(ctx, results).await
    }

    async fn post(&self, _ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        for result in results {
            if let PendingAction::MarkInstallmentBilled(id) = result.pending_action {
                self.commands.mark_billed(id).await?;
            }
        }
        Ok(())
    }
}
