//! Ports
//!
//! Async boundaries to the persistence layer. Query ports assemble
//! read-only input aggregates; command ports apply post-run state
//! transitions and are invoked only by postable runs.

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rating_core::Result;

use crate::temporal::TemporalRange;
use crate::types::{
    CalculationContext, CalculationResult, Contract, ContractId, DeviceInstallment, Discount,
    InstallationHistory, RevenueMasterData,
};

pub use memory::InMemoryStore;

#[async_trait]
pub trait ContractQueryPort: Send + Sync {
    /// Loads contracts with their product inventories, suspensions and
    /// billing factors in one batched call.
    async fn find_contracts_with_inventories(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<Contract>>;
}

#[async_trait]
pub trait ContractDiscountQueryPort: Send + Sync {
    async fn find_contract_discounts(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<Discount>>;
}

#[async_trait]
pub trait InstallationQueryPort: Send + Sync {
    async fn find_installations(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<InstallationHistory>>;
}

#[async_trait]
pub trait DeviceInstallmentQueryPort: Send + Sync {
    async fn find_device_installments(
        &self,
        contract_ids: &[ContractId],
        window: &TemporalRange,
    ) -> Result<Vec<DeviceInstallment>>;
}

#[async_trait]
pub trait RevenueMasterQueryPort: Send + Sync {
    async fn find_by_base_date(
        &self,
        base_date: NaiveDate,
    ) -> Result<HashMap<String, RevenueMasterData>>;
}

#[async_trait]
pub trait CalculationResultSavePort: Send + Sync {
    /// Persists one chunk's results. The implementation is the
    /// transaction boundary: the batch either fully commits or fails.
    async fn save(&self, ctx: &CalculationContext, results: &[CalculationResult]) -> Result<()>;

    /// Removes prior results for the context's billing window.
    async fn delete_in_window(&self, ctx: &CalculationContext) -> Result<usize>;

    /// Removes all prior results regardless of window.
    async fn delete_all(&self) -> Result<usize>;
}

#[async_trait]
pub trait ContractDiscountCommandPort: Send + Sync {
    async fn apply_discount(&self, contract_id: ContractId, discount_id: i64) -> Result<()>;
}

#[async_trait]
pub trait InstallationCommandPort: Send + Sync {
    async fn mark_billed(&self, installation_id: i64) -> Result<()>;
}

#[async_trait]
pub trait DeviceInstallmentCommandPort: Send + Sync {
    async fn mark_billed(&self, installment_id: i64) -> Result<()>;
}

/// Forward-only reader over one partition's contract ids.
#[async_trait]
pub trait ContractIdCursor: Send {
    /// Next batch of at most `chunk_size` ids; empty means exhausted.
    async fn next_chunk(&mut self, chunk_size: usize) -> Result<Vec<ContractId>>;
}

#[async_trait]
pub trait ContractIdSourcePort: Send + Sync {
    /// Opens a cursor over the ids assigned to `partition` by the
    /// `contract_id % partition_count` rule. When `explicit_ids` is
    /// given, only those ids are considered, filtered by the same rule.
    async fn open_cursor(
        &self,
        partition: usize,
        partition_count: usize,
        explicit_ids: Option<&[ContractId]>,
    ) -> Result<Box<dyn ContractIdCursor>>;
}
