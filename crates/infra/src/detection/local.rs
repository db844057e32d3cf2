use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use stockwatch_ai::{
    DetectionScheduler, InventorySnapshot, MovementSnapshot, ProductSnapshot, RawDetectionResponse, TheftAnalytics,
};
use stockwatch_anomalies::DetectionPass;
use stockwatch_core::ProductId;

use super::DetectionService;
use crate::error::{DetectionError, StoreError};
use crate::store::{
    AnomalyFilter, AnomalyStore, ProductFilter, ProductStore, TransactionFilter, TransactionStore, bounded,
};

/// In-process detection over the local stores.
///
/// Each pass reads one snapshot (products, then their ledger history) and
/// runs the scheduler's jobs over it; nothing is written.
pub struct LocalDetectionEngine {
    products: Arc<dyn ProductStore>,
    transactions: Arc<dyn TransactionStore>,
    anomalies: Arc<dyn AnomalyStore>,
    scheduler: DetectionScheduler,
    store_timeout: Duration,
}

impl LocalDetectionEngine {
    pub fn new(
        products: Arc<dyn ProductStore>,
        transactions: Arc<dyn TransactionStore>,
        anomalies: Arc<dyn AnomalyStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            products,
            transactions,
            anomalies,
            scheduler: DetectionScheduler::default(),
            store_timeout,
        }
    }

    pub fn with_scheduler(mut self, scheduler: DetectionScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub async fn snapshot(&self) -> Result<InventorySnapshot, StoreError> {
        let taken_at = Utc::now();
        let products = bounded(
            "products.list",
            self.store_timeout,
            self.products.list(&ProductFilter::default()),
        )
        .await?;
        let log = bounded(
            "transactions.list",
            self.store_timeout,
            self.transactions.list(&TransactionFilter::default()),
        )
        .await?;

        // The log comes newest first; snapshots carry history oldest first.
        let mut history: HashMap<ProductId, Vec<MovementSnapshot>> = HashMap::new();
        for tx in log.iter().rev() {
            history.entry(tx.product_id()).or_default().push(MovementSnapshot {
                kind: tx.kind(),
                delta: tx.quantity(),
                previous_quantity: tx.previous_quantity(),
                new_quantity: tx.new_quantity(),
                actor: tx.actor(),
                at: tx.created_at(),
            });
        }

        let items = products
            .into_iter()
            .map(|p| ProductSnapshot {
                product_id: p.id_typed(),
                name: p.name().to_string(),
                quantity: p.quantity(),
                minimum_stock: p.minimum_stock(),
                price: p.price(),
                expiry_date: p.expiry_date(),
                history: history.remove(&p.id_typed()).unwrap_or_default(),
            })
            .collect();

        Ok(InventorySnapshot::new(taken_at, items))
    }
}

fn unavailable(e: impl std::fmt::Display) -> DetectionError {
    DetectionError::Unavailable(e.to_string())
}

#[async_trait]
impl DetectionService for LocalDetectionEngine {
    async fn detect(&self, pass: DetectionPass) -> Result<RawDetectionResponse, DetectionError> {
        let snapshot = self.snapshot().await.map_err(unavailable)?;
        let outcome = self.scheduler.run_pass(pass, &snapshot).map_err(unavailable)?;
        Ok(RawDetectionResponse::from_findings(
            pass,
            &outcome.findings,
            outcome.alerts_generated,
        ))
    }

    async fn theft_analytics(&self, days: u32) -> Result<TheftAnalytics, DetectionError> {
        let snapshot = self.snapshot().await.map_err(unavailable)?;
        let anomalies = bounded(
            "anomalies.list",
            self.store_timeout,
            self.anomalies.list(&AnomalyFilter::default()),
        )
        .await
        .map_err(unavailable)?;
        Ok(TheftAnalytics::compute(days, Utc::now(), &anomalies, &snapshot))
    }
}
