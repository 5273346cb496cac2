//! Contract Rating Service
//!
//! Batch rating engine for subscription contracts:
//! - Temporal partitioning of the billing window per contract
//! - Prorated monthly fees under pluggable pricing policies
//! - Discount overlay and VAT derivation from the revenue catalog
//! - Hash-partitioned parallel execution with graceful shutdown

use std::sync::Arc;

use rating_core::{Result, RuntimeConfig};
use tokio::sync::watch;
use tracing::{error, info};

mod batch;
mod charge;
mod discount;
mod ports;
mod pricing;
mod proration;
mod temporal;
mod types;
mod vat;


use batch::{JobParameters, PartitionedBatchExecutor};
use charge::{
    ChargeCalculator, DeviceInstallmentCalculator, InstallationFeeCalculator, MonthlyFeeCalculator,
};
use ports::{
    CalculationResultSavePort, ContractDiscountCommandPort, ContractDiscountQueryPort,
    ContractIdSourcePort, ContractQueryPort, DeviceInstallmentCommandPort,
    DeviceInstallmentQueryPort, InMemoryStore, InstallationCommandPort, InstallationQueryPort,
};
use vat::{RevenueMasterCache, VatEngine};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("contract_rating=debug".parse().expect("valid tracing directive")),
        )
        .json()
        .init();

    info!("Starting Contract Rating Service");

    if let Err(err) = run().await {
        error!(error = %err, code = err.error_code(), "Rating run aborted");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = RuntimeConfig::from_env()?;
    let params = JobParameters::from_env()?;
    info!(
        service = %config.service_name,
        calculation_type = params.calculation_type.as_code(),
        "Job parameters resolved"
    );

    let store = InMemoryStore::new();

    let revenue_cache = Arc::new(RevenueMasterCache::empty());
    revenue_cache
        .refresh(store.as_ref(), params.billing_start_date)
        .await?;
    let vat = VatEngine::new(Arc::clone(&revenue_cache), params.vat_rate, params.vat_enabled);

    // One store backs every port until the real persistence layer lands.
    let contracts: Arc<dyn ContractQueryPort> = store.clone();
    let discounts: Arc<dyn ContractDiscountQueryPort> = store.clone();
    let installations: Arc<dyn InstallationQueryPort> = store.clone();
    let installments: Arc<dyn DeviceInstallmentQueryPort> = store.clone();
    let save: Arc<dyn CalculationResultSavePort> = store.clone();
    let discount_commands: Arc<dyn ContractDiscountCommandPort> = store.clone();
    let installation_commands: Arc<dyn InstallationCommandPort> = store.clone();
    let installment_commands: Arc<dyn DeviceInstallmentCommandPort> = store.clone();
    let id_source: Arc<dyn ContractIdSourcePort> = store.clone();

    let calculators: Vec<Arc<dyn ChargeCalculator>> = vec![
        Arc::new(MonthlyFeeCalculator::new(
            contracts,
            discounts,
            Arc::clone(&save),
            discount_commands,
            vat.clone(),
        )),
        Arc::new(InstallationFeeCalculator::new(
            installations,
            Arc::clone(&save),
            installation_commands,
            vat.clone(),
        )),
        Arc::new(DeviceInstallmentCalculator::new(
            installments,
            Arc::clone(&save),
            installment_commands,
            vat,
        )),
    ];

    let executor = PartitionedBatchExecutor::new(id_source, save, calculators);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, requesting stop");
            let _ = stop_tx.send(true);
        }
    });

    let summary = executor.run(&params, stop_rx).await?;
    info!(
        contracts = summary.contracts,
        results = summary.results,
        cleanup_deleted = summary.cleanup_deleted,
        stopped_early = summary.stopped_early,
        "Contract Rating Service done"
    );
    Ok(())
}
