//! Wiring: stores, collaborators and the orchestrator assembled from config.

use std::sync::Arc;

use stockwatch_events::NotificationSink;

use crate::catalog::ProductCatalog;
use crate::config::PipelineConfig;
use crate::detection::{DetectionService, DetectionTrigger, LocalDetectionEngine, RemoteDetectionService};
use crate::error::DetectionError;
use crate::events::PipelineBus;
use crate::harness::ScenarioHarness;
use crate::ledger::StockLedger;
use crate::orchestrator::MutationOrchestrator;
use crate::recorder::TransactionRecorder;
use crate::registry::AnomalyTriageRegistry;
use crate::store::{
    AlertStore, AnomalyStore, InMemoryAlertStore, InMemoryAnomalyStore, InMemoryProductStore,
    InMemoryTransactionStore, ProductStore, TransactionStore,
};

#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub anomalies: Arc<dyn AnomalyStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            products: Arc::new(InMemoryProductStore::new()),
            transactions: Arc::new(InMemoryTransactionStore::new()),
            anomalies: Arc::new(InMemoryAnomalyStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
        }
    }
}

/// A fully wired pipeline.
pub struct StockPipeline {
    pub config: PipelineConfig,
    pub stores: Stores,
    pub bus: Arc<PipelineBus>,
    pub ledger: Arc<StockLedger>,
    pub recorder: Arc<TransactionRecorder>,
    pub trigger: DetectionTrigger,
    pub registry: Arc<AnomalyTriageRegistry>,
    pub orchestrator: Arc<MutationOrchestrator>,
    pub catalog: ProductCatalog,
    pub harness: ScenarioHarness,
}

impl StockPipeline {
    /// In-memory stores; detection per config (remote URL or local engine).
    pub fn in_memory(config: PipelineConfig, notifier: Arc<dyn NotificationSink>) -> Result<Self, DetectionError> {
        Self::assemble(config, Stores::in_memory(), None, notifier)
    }

    /// Wire a pipeline over `stores`. `detection` overrides the service the
    /// config would pick.
    pub fn assemble(
        config: PipelineConfig,
        stores: Stores,
        detection: Option<Arc<dyn DetectionService>>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, DetectionError> {
        let timeout = config.store_timeout;
        let service: Arc<dyn DetectionService> = match (detection, &config.detection_url) {
            (Some(service), _) => service,
            (None, Some(url)) => {
                tracing::info!(%url, "using remote detection service");
                Arc::new(RemoteDetectionService::new(
                    url.clone(),
                    config.api_token.clone(),
                    config.detection_timeout,
                )?)
            }
            (None, None) => Arc::new(LocalDetectionEngine::new(
                stores.products.clone(),
                stores.transactions.clone(),
                stores.anomalies.clone(),
                timeout,
            )),
        };

        let bus = Arc::new(PipelineBus::new());
        let ledger = Arc::new(StockLedger::new(stores.products.clone(), timeout));
        let recorder = Arc::new(TransactionRecorder::new(stores.transactions.clone(), timeout));
        let trigger = DetectionTrigger::new(service, config.detection_timeout);
        let registry = Arc::new(
            AnomalyTriageRegistry::new(
                stores.anomalies.clone(),
                stores.alerts.clone(),
                config.dedup_window,
                timeout,
            )
            .with_bus(bus.clone()),
        );
        let orchestrator = Arc::new(
            MutationOrchestrator::new(
                ledger.clone(),
                recorder.clone(),
                trigger.clone(),
                registry.clone(),
                notifier,
            )
            .with_bus(bus.clone()),
        );
        let catalog = ProductCatalog::new(stores.products.clone(), ledger.clone(), timeout);
        let harness = ScenarioHarness::new(stores.products.clone(), ledger.clone(), orchestrator.clone(), timeout);

        Ok(Self {
            config,
            stores,
            bus,
            ledger,
            recorder,
            trigger,
            registry,
            orchestrator,
            catalog,
            harness,
        })
    }
}
