//! Batch executor
//!
//! Drives one calculation run: cleanup of prior results, then one
//! worker task per partition chunking through its contract ids and
//! executing every charge family. A watch flag stops workers between
//! chunks; a bounded grace period aborts stragglers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rating_core::{RatingError, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::batch::JobParameters;
use crate::charge::ChargeCalculator;
use crate::ports::{CalculationResultSavePort, ContractIdSourcePort};
use crate::types::{CalculationContext, CleanupMode, ContractId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Init,
    Cleanup,
    Partition,
    Execute,
    Done,
    Failed,
}

impl RunState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Cleanup => "CLEANUP",
            Self::Partition => "PARTITION",
            Self::Execute => "EXECUTE",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    fn advance(&mut self, next: RunState) {
        info!(from = self.as_str(), to = next.as_str(), "Run state transition");
        *self = next;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PartitionSummary {
    pub partition: usize,
    pub contracts: usize,
    pub results: usize,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub contracts: usize,
    pub results: usize,
    pub cleanup_deleted: usize,
    pub partitions: Vec<PartitionSummary>,
    pub elapsed: Duration,
    pub stopped_early: bool,
}

pub struct PartitionedBatchExecutor {
    id_source: Arc<dyn ContractIdSourcePort>,
    save: Arc<dyn CalculationResultSavePort>,
    calculators: Vec<Arc<dyn ChargeCalculator>>,
}

impl PartitionedBatchExecutor {
    pub fn new(
        id_source: Arc<dyn ContractIdSourcePort>,
        save: Arc<dyn CalculationResultSavePort>,
        calculators: Vec<Arc<dyn ChargeCalculator>>,
    ) -> Self {
        Self { id_source, save, calculators }
    }

    pub async fn run(
        &self,
        params: &JobParameters,
        stop: watch::Receiver<bool>,
    ) -> Result<BatchSummary> {
        let started = Instant::now();
        let ctx = params.context();
        let mut state = RunState::Init;

        info!(
            calculation_type = ctx.calculation_type.as_code(),
            calculation_period = ctx.calculation_period.as_code(),
            billing_start = %ctx.billing_start_date,
            billing_end = %ctx.billing_end_date,
            partitions = params.thread_count,
            chunk_size = params.chunk_size,
            "Batch run starting"
        );

        state.advance(RunState::Cleanup);
        let cleanup_deleted = match self.cleanup(params, &ctx).await {
            Ok(deleted) => deleted,
            Err(err) => {
                state.advance(RunState::Failed);
                return Err(err);
            }
        };

        state.advance(RunState::Partition);
        match self.execute_partitions(params, ctx, stop, &mut state).await {
            Ok((partitions, stopped_early)) => {
                state.advance(RunState::Done);
                let summary = BatchSummary {
                    contracts: partitions.iter().map(|p| p.contracts).sum(),
                    results: partitions.iter().map(|p| p.results).sum(),
                    cleanup_deleted,
                    partitions,
                    elapsed: started.elapsed(),
                    stopped_early,
                };
                info!(
                    contracts = summary.contracts,
                    results = summary.results,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    stopped_early = summary.stopped_early,
                    "Batch run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                state.advance(RunState::Failed);
                error!(error = %err, "Batch run failed");
                Err(err)
            }
        }
    }

    async fn cleanup(&self, params: &JobParameters, ctx: &CalculationContext) -> Result<usize> {
        if params.skip_cleanup {
            info!("Cleanup skipped by job parameter");
            return Ok(0);
        }
        let deleted = match params.cleanup_mode {
            CleanupMode::Range => self.save.delete_in_window(ctx).await?,
            CleanupMode::All => self.save.delete_all().await?,
        };
        info!(deleted, "Prior results cleaned up");
        Ok(deleted)
    }

    async fn execute_partitions(
        &self,
        params: &JobParameters,
        ctx: CalculationContext,
        mut stop: watch::Receiver<bool>,
        state: &mut RunState,
    ) -> Result<(Vec<PartitionSummary>, bool)> {
        let partition_count = params.thread_count;
        let mut tasks: JoinSet<Result<PartitionSummary>> = JoinSet::new();

        for partition in 0..partition_count {
            let id_source = Arc::clone(&self.id_source);
            let calculators = self.calculators.clone();
            let explicit_ids = params.contract_ids.clone();
            let chunk_size = params.chunk_size;
            let stop = stop.clone();
            tasks.spawn(async move {
                run_partition(
                    partition,
                    partition_count,
                    chunk_size,
                    ctx,
                    id_source,
                    calculators,
                    explicit_ids,
                    stop,
                )
                .await
            });
        }
        state.advance(RunState::Execute);

        let mut partitions = Vec::with_capacity(partition_count);
        let mut grace_deadline: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;
        let mut stop_closed = false;
        let mut aborted = false;
        let mut first_error: Option<RatingError> = None;

        loop {
            if grace_deadline.is_none() && *stop.borrow() {
                grace_deadline = Some(Box::pin(tokio::time::sleep(params.shutdown_grace)));
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok(Ok(summary))) => {
                            info!(
                                partition = summary.partition,
                                contracts = summary.contracts,
                                results = summary.results,
                                "Partition finished"
                            );
                            partitions.push(summary);
                        }
                        Some(Ok(Err(err))) => {
                            // Partitions are independent; survivors keep
                            // their committed chunks and finish their work.
                            warn!(error = %err, "Partition failed, draining remaining partitions");
                            first_error.get_or_insert(err);
                        }
                        Some(Err(join_err)) if join_err.is_cancelled() => {
                            aborted = true;
                        }
                        Some(Err(join_err)) => {
                            first_error.get_or_insert(RatingError::Internal(format!(
                                "partition worker panicked: {}",
                                join_err
                            )));
                        }
                    }
                }
                changed = stop.changed(), if grace_deadline.is_none() && !stop_closed => {
                    // Sender dropped means no stop will ever arrive.
                    stop_closed = changed.is_err();
                }
                _ = async { grace_deadline.as_mut().expect("deadline armed").await },
                    if grace_deadline.is_some() => {
                    warn!(
                        grace_secs = params.shutdown_grace.as_secs(),
                        "Shutdown grace elapsed, aborting remaining partitions"
                    );
                    tasks.abort_all();
                    aborted = true;
                    grace_deadline = None;
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        partitions.sort_by_key(|p| p.partition);
        let stopped_early = aborted || *stop.borrow();
        Ok((partitions, stopped_early))
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_partition(
    partition: usize,
    partition_count: usize,
    chunk_size: usize,
    ctx: CalculationContext,
    id_source: Arc<dyn ContractIdSourcePort>,
    calculators: Vec<Arc<dyn ChargeCalculator>>,
    explicit_ids: Option<Vec<ContractId>>,
    stop: watch::Receiver<bool>,
) -> Result<PartitionSummary> {
    let mut cursor = id_source
        .open_cursor(partition, partition_count, explicit_ids.as_deref())
        .await?;

    let mut contracts = 0;
    let mut results = 0;
    loop {
        if *stop.borrow() {
            info!(partition, "Stop requested, partition winding down");
            break;
        }
        let chunk = cursor.next_chunk(chunk_size).await?;
        if chunk.is_empty() {
            break;
        }
        for calculator in &calculators {
            results += calculator.execute(&ctx, &chunk).await?.len();
        }
        contracts += chunk.len();
    }

    Ok(PartitionSummary { partition, contracts, results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::JobParameters;
    use crate::charge::MonthlyFeeCalculator;
    use crate::ports::{
        ContractDiscountCommandPort, ContractDiscountQueryPort, ContractQueryPort, InMemoryStore,
    };
    use crate::pricing::PricingPolicy;
    use crate::types::{
        CalculationPeriod, CalculationResult, CalculationType, ChargeItem, CleanupMode, Contract,
        Product, ProductOffering,
    };
    use crate::vat::{RevenueMasterCache, VatEngine, DEFAULT_VAT_RATE};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn contract(id: i64) -> Contract {
        Contract {
            id,
            first_subscribed_on: d(2024, 1, 1),
            subscribed_on: d(2024, 1, 1),
            terminated_on: None,
            preferred_terminated_on: None,
            products: vec![Product {
                id: id * 10,
                offering: ProductOffering {
                    id: "PO-100".to_string(),
                    name: "Fiber 1G".to_string(),
                    charge_items: vec![ChargeItem {
                        id: "CI-BASE".to_string(),
                        name: "Base monthly fee".to_string(),
                        revenue_item_id: Some("RV-1".to_string()),
                        suspension_charge_ratio: Decimal::ONE,
                        policy: PricingPolicy::FlatRate { amount: dec!(31000) },
                    }],
                },
                subscribed_on: d(2024, 1, 1),
                activated_on: Some(d(2024, 1, 1)),
                terminated_on: None,
            }],
            suspensions: Vec::new(),
            billing_factors: Vec::new(),
        }
    }

    fn params(thread_count: usize) -> JobParameters {
        JobParameters {
            billing_start_date: d(2025, 5, 1),
            billing_end_date: d(2025, 5, 31),
            calculation_type: CalculationType::RevenueConfirmation,
            calculation_period: CalculationPeriod::PostBillingCurrentMonth,
            contract_ids: None,
            thread_count,
            chunk_size: 2,
            cleanup_mode: CleanupMode::Range,
            skip_cleanup: false,
            vat_rate: DEFAULT_VAT_RATE,
            vat_enabled: false,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    fn executor_with_save(
        store: &Arc<InMemoryStore>,
        save: Arc<dyn CalculationResultSavePort>,
    ) -> PartitionedBatchExecutor {
        let vat = VatEngine::new(Arc::new(RevenueMasterCache::empty()), DEFAULT_VAT_RATE, false);
        let contracts: Arc<dyn ContractQueryPort> = store.clone();
        let discounts: Arc<dyn ContractDiscountQueryPort> = store.clone();
        let discount_commands: Arc<dyn ContractDiscountCommandPort> = store.clone();
        let id_source: Arc<dyn ContractIdSourcePort> = store.clone();
        let monthly = MonthlyFeeCalculator::new(
            contracts,
            discounts,
            Arc::clone(&save),
            discount_commands,
            vat,
        );
        PartitionedBatchExecutor::new(id_source, save, vec![Arc::new(monthly)])
    }

    fn executor(store: &Arc<InMemoryStore>) -> PartitionedBatchExecutor {
        executor_with_save(store, store.clone())
    }

    #[tokio::test]
    async fn test_run_rates_every_contract_across_partitions() {
        let store = InMemoryStore::new();
        for id in 1..=7 {
            store.insert_contract(contract(id));
        }

        let (_tx, rx) = watch::channel(false);
        let summary = executor(&store)
            .run(&params(3), rx)
            .await
            .expect("run succeeds");

        assert_eq!(summary.contracts, 7);
        assert_eq!(summary.results, 7);
        assert_eq!(summary.partitions.len(), 3);
        assert!(!summary.stopped_early);
        assert_eq!(store.saved_results().len(), 7);
    }

    #[tokio::test]
    async fn test_partition_count_does_not_change_the_outcome() {
        let mut fee_sets = Vec::new();
        for thread_count in [1, 2, 5] {
            let store = InMemoryStore::new();
            for id in 1..=9 {
                store.insert_contract(contract(id));
            }
            let (_tx, rx) = watch::channel(false);
            executor(&store)
                .run(&params(thread_count), rx)
                .await
                .expect("run succeeds");

            let mut fees: Vec<(i64, Decimal)> = store
                .saved_results()
                .iter()
                .map(|r| (r.contract_id, r.fee))
                .collect();
            fees.sort();
            fee_sets.push(fees);
        }
        assert_eq!(fee_sets[0], fee_sets[1]);
        assert_eq!(fee_sets[1], fee_sets[2]);
    }

    #[tokio::test]
    async fn test_explicit_contract_ids_restrict_the_run() {
        let store = InMemoryStore::new();
        for id in 1..=6 {
            store.insert_contract(contract(id));
        }

        let mut p = params(2);
        p.contract_ids = Some(vec![2, 4]);
        let (_tx, rx) = watch::channel(false);
        let summary = executor(&store).run(&p, rx).await.expect("run succeeds");

        assert_eq!(summary.contracts, 2);
        let mut ids: Vec<i64> = store.saved_results().iter().map(|r| r.contract_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_cleanup_removes_prior_window_results() {
        let store = InMemoryStore::new();
        store.insert_contract(contract(1));

        let (_tx, rx) = watch::channel(false);
        executor(&store).run(&params(1), rx).await.expect("first run");
        assert_eq!(store.saved_results().len(), 1);

        let (_tx, rx) = watch::channel(false);
        let summary = executor(&store).run(&params(1), rx).await.expect("second run");
        assert_eq!(summary.cleanup_deleted, 1);
        assert_eq!(store.saved_results().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_cleanup_keeps_prior_results() {
        let store = InMemoryStore::new();
        store.insert_contract(contract(1));

        let (_tx, rx) = watch::channel(false);
        executor(&store).run(&params(1), rx).await.expect("first run");

        let mut p = params(1);
        p.skip_cleanup = true;
        let (_tx, rx) = watch::channel(false);
        executor(&store).run(&p, rx).await.expect("second run");
        assert_eq!(store.saved_results().len(), 2);
    }

    struct RejectingSave {
        inner: Arc<InMemoryStore>,
        rejected: ContractId,
    }

    #[async_trait]
    impl CalculationResultSavePort for RejectingSave {
        async fn save(
            &self,
            ctx: &CalculationContext,
            results: &[CalculationResult],
        ) -> Result<()> {
            if results.iter().any(|r| r.contract_id == self.rejected) {
                return Err(RatingError::Persistence(format!(
                    "write rejected for contract {}",
                    self.rejected
                )));
            }
            self.inner.save(ctx, results).await
        }

        async fn delete_in_window(&self, ctx: &CalculationContext) -> Result<usize> {
            self.inner.delete_in_window(ctx).await
        }

        async fn delete_all(&self) -> Result<usize> {
            self.inner.delete_all().await
        }
    }

    #[tokio::test]
    async fn test_partition_failure_leaves_other_partitions_committed() {
        let store = InMemoryStore::new();
        for id in 1..=4 {
            store.insert_contract(contract(id));
        }

        // Contract 3 lands in partition 1 behind contract 1.
        let save = Arc::new(RejectingSave { inner: Arc::clone(&store), rejected: 3 });
        let mut p = params(2);
        p.chunk_size = 1;

        let (_tx, rx) = watch::channel(false);
        let err = executor_with_save(&store, save)
            .run(&p, rx)
            .await
            .expect_err("run fails");
        assert!(matches!(err, RatingError::Persistence(_)));

        // Partition 0 drained to completion and partition 1 kept the
        // chunk committed before the rejected one.
        let mut ids: Vec<i64> = store.saved_results().iter().map(|r| r.contract_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_pre_set_stop_flag_processes_nothing() {
        let store = InMemoryStore::new();
        for id in 1..=4 {
            store.insert_contract(contract(id));
        }

        let (_tx, rx) = watch::channel(true);
        let summary = executor(&store)
            .run(&params(2), rx)
            .await
            .expect("run succeeds");
        assert_eq!(summary.contracts, 0);
        assert!(summary.stopped_early);
        assert!(store.saved_results().is_empty());
    }
}
