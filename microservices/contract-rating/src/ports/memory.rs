//! In-memory port adapters
//!
//! DashMap-backed implementations of every port, used by the binary
//! and the test suite pending the real persistence layer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rating_core::{RatingError, Result};

use crate::ports::{
    CalculationResultSavePort, ContractDiscountCommandPort, ContractDiscountQueryPort,
    ContractIdCursor, ContractIdSourcePort, ContractQueryPort, DeviceInstallmentCommandPort,
    DeviceInstallmentQueryPort, InstallationCommandPort, InstallationQueryPort,
    RevenueMasterQueryPort,
};
use crate::temporal::{Effective, TemporalRange};
use crate::types::{
    CalculationContext, CalculationResult, Contract, ContractId, DeviceInstallment, Discount,
    InstallationHistory, RevenueMasterData,
};

#[derive(Default)]
pub struct InMemoryStore {
    contracts: DashMap<ContractId, Contract>,
    discounts: DashMap<ContractId, Vec<Discount>>,
    installations: DashMap<i64, InstallationHistory>,
    installments: DashMap<i64, DeviceInstallment>,
    revenue_items: DashMap<String, RevenueMasterData>,
    results: Mutex<Vec<CalculationResult>>,
    applied_discounts: Mutex<Vec<(ContractId, i64)>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_contract(&self, contract: Contract) {
        self.contracts.insert(contract.id, contract);
    }

    pub fn insert_discount(&self, discount: Discount) {
        self.discounts
            .entry(discount.contract_id)
            .or_default()
            .push(discount);
    }

    pub fn insert_installation(&self, installation: InstallationHistory) {
        self.installations.insert(installation.id, installation);
    }

    pub fn insert_installment(&self, installment: DeviceInstallment) {
        self.installments.insert(installment.id, installment);
    }

    pub fn insert_revenue_item(&self, item: RevenueMasterData) {
        self.revenue_items.insert(item.revenue_item_id.clone(), item);
    }

    pub fn saved_results(&self) -> Vec<CalculationResult> {
        self.results.lock().clone()
    }

    pub fn applied_discounts(&self) -> Vec<(ContractId, i64)> {
        self.applied_discounts.lock().clone()
    }

    pub fn installation(&self, id: i64) -> Option<InstallationHistory> {
        self.installations.get(&id).map(|i| i.clone())
    }

    pub fn installment(&self, id: i64) -> Option<DeviceInstallment> {
        self.installments.get(&id).map(|i| i.clone())
    }
}

#[async_trait]
impl ContractQueryPort for InMemoryStore {
    async fn find_contracts_with_inventories(
        &self,
        contract_ids: &[ContractId],
        _window: &TemporalRange,
    ) -> Result<Vec<Contract>> {
        Ok(contract_ids
            .iter()
            .filter_map(|id| self.contracts.get(id).map(|c| c.clone()))
            .collect())
    }
}

#[async_trait]
impl ContractDiscountQueryPort for InMemoryStore {
    async fn find_contract_discounts(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<Discount>> {
        Ok(contract_ids
            .iter()
            .filter_map(|id| self.discounts.get(id))
            .flat_map(|entry| entry.clone())
            .filter(|d| d.effective_range_within(window).is_some())
            .collect())
    }
}

#[async_trait]
impl InstallationQueryPort for InMemoryStore {
    async fn find_installations(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<InstallationHistory>> {
        Ok(self
            .installations
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|i| contract_ids.contains(&i.contract_id) && window.contains(i.installed_on))
            .collect())
    }
}

#[async_trait]
impl DeviceInstallmentQueryPort for InMemoryStore {
    async fn find_device_installments(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<DeviceInstallment>> {
        Ok(self
            .installments
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|i| contract_ids.contains(&i.contract_id) && i.started_on <= window.end())
            .collect())
    }
}

#[async_trait]
impl RevenueMasterQueryPort for InMemoryStore {
    async fn find_by_base_date(
        &self,
        base_date: NaiveDate,
    ) -> Result<HashMap<String, RevenueMasterData>> {
        Ok(self
            .revenue_items
            .iter()
            .filter(|entry| {
                let item = entry.value();
                item.effective_start <= base_date
                    && item.effective_end.map_or(true, |end| base_date <= end)
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

#[async_trait]
impl CalculationResultSavePort for InMemoryStore {
    async fn save(&self, _ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()> {
        self.results.lock().extend_from_slice(results);
        Ok(())
    }

    async fn delete_in_window(&self, ctx: &CalculationContext) -> Result<usize> {
        let window = ctx.billing_window()?;
        let mut results = self.results.lock();
        let before = results.len();
        results.retain(|r| r.billing_window != window);
        Ok(before - results.len())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut results = self.results.lock();
        let count = results.len();
        results.clear();
        Ok(count)
    }
}

#[async_trait]
impl ContractDiscountCommandPort for InMemoryStore {
    async fn apply_discount(&self, contract_id: ContractId, discount_id: i64) -> Result<()> {
        self.applied_discounts.lock().push((contract_id, discount_id));
        Ok(())
    }
}

#[async_trait]
impl InstallationCommandPort for InMemoryStore {
    async fn mark_billed(&self, installation_id: i64) -> Result<()> {
        let mut installation = self
            .installations
            .get_mut(&installation_id)
            .ok_or_else(|| RatingError::NotFound(format!("installation {}", installation_id)))?;
        installation.billed = true;
        Ok(())
    }
}

#[async_trait]
impl DeviceInstallmentCommandPort for InMemoryStore {
    async fn mark_billed(&self, installment_id: i64) -> Result<()> {
        let mut installment = self
            .installments
            .get_mut(&installment_id)
            .ok_or_else(|| RatingError::NotFound(format!("installment {}", installment_id)))?;
        installment.billed_rounds += 1;
        Ok(())
    }
}

#[async_trait]
impl ContractIdSourcePort for InMemoryStore {
    async fn open_cursor(
        &self,
        partition: usize,
        partition_count: usize,
        explicit_ids: Option<&[ContractId]>,
    ) -> Result<Box<dyn ContractIdCursor>> {
        let mut ids: Vec<ContractId> = match explicit_ids {
            Some(ids) => ids.to_vec(),
            None => self.contracts.iter().map(|entry| *entry.key()).collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        ids.retain(|id| id.rem_euclid(partition_count as ContractId) as usize == partition);
        Ok(Box::new(InMemoryIdCursor { ids, position: 0 }))
    }
}

struct InMemoryIdCursor {
    ids: Vec<ContractId>,
    position: usize,
}

#[async_trait]
impl ContractIdCursor for InMemoryIdCursor {
    async fn next_chunk(&mut self, chunk_size: usize) -> Result<Vec<ContractId>> {
        let end = (self.position + chunk_size).min(self.ids.len());
        let chunk = self.ids[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}
