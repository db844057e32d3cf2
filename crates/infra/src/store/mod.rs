//! Persistence boundary.
//!
//! The persistence engine is an external collaborator; the pipeline only sees
//! these request/response traits. In-memory implementations back tests, the
//! CLI and the scenario harness.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockwatch_anomalies::{Alert, Anomaly, AnomalyType, Severity};
use stockwatch_core::{AlertId, AnomalyId, ExpectedVersion, ProductId};
use stockwatch_inventory::{Product, Transaction, TransactionType};

use crate::error::StoreError;

mod in_memory;

pub use in_memory::{InMemoryAlertStore, InMemoryAnomalyStore, InMemoryProductStore, InMemoryTransactionStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub low_stock_only: bool,
    /// Case-insensitive substring match on the name.
    pub name_contains: Option<String>,
    pub name_prefix: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        if let Some(category) = &self.category {
            if !p.category().eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if self.low_stock_only && !p.is_low_stock() {
            return false;
        }
        if let Some(needle) = &self.name_contains {
            if !p.name().to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(prefix) = &self.name_prefix {
            if !p.name().starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub product_id: Option<ProductId>,
    pub kind: Option<TransactionType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Most recent N after filtering.
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, t: &Transaction) -> bool {
        self.product_id.is_none_or(|id| t.product_id() == id)
            && self.kind.is_none_or(|k| t.kind() == k)
            && self.since.is_none_or(|s| t.created_at() >= s)
            && self.until.is_none_or(|u| t.created_at() <= u)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalyFilter {
    pub resolved: Option<bool>,
    pub severity: Option<Severity>,
    pub product_id: Option<ProductId>,
    pub anomaly_type: Option<AnomalyType>,
}

impl AnomalyFilter {
    pub fn unresolved() -> Self {
        Self {
            resolved: Some(false),
            ..Self::default()
        }
    }

    pub fn matches(&self, a: &Anomaly) -> bool {
        self.resolved.is_none_or(|r| a.is_resolved() == r)
            && self.severity.is_none_or(|s| a.severity() == s)
            && self.product_id.is_none_or(|id| a.product_id() == id)
            && self.anomaly_type.is_none_or(|t| a.anomaly_type() == t)
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    /// Insert a new product; the stored copy starts at version 1.
    async fn insert(&self, product: Product) -> Result<Product, StoreError>;

    /// Replace a product, bumping its version. Fails with `Conflict` when the
    /// stored version does not match `expected`.
    async fn save(&self, product: Product, expected: ExpectedVersion) -> Result<Product, StoreError>;

    /// Returns whether a product was removed.
    async fn delete(&self, id: ProductId) -> Result<bool, StoreError>;
}

/// Append-only transaction log.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn append(&self, transaction: Transaction) -> Result<(), StoreError>;

    /// Matching transactions, newest first.
    async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError>;
}

#[async_trait]
pub trait AnomalyStore: Send + Sync {
    async fn insert(&self, anomaly: Anomaly) -> Result<(), StoreError>;

    async fn get(&self, id: AnomalyId) -> Result<Option<Anomaly>, StoreError>;

    async fn save(&self, anomaly: Anomaly) -> Result<(), StoreError>;

    /// Matching anomalies, newest first.
    async fn list(&self, filter: &AnomalyFilter) -> Result<Vec<Anomaly>, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: Alert) -> Result<(), StoreError>;

    /// Newest first.
    async fn list(&self, unread_only: bool) -> Result<Vec<Alert>, StoreError>;

    async fn mark_read(&self, id: AlertId) -> Result<Alert, StoreError>;
}

/// Run a store call under `limit`; an elapsed timer becomes [`StoreError::Timeout`].
pub async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            let after_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(operation, after_ms, "store call timed out");
            Err(StoreError::Timeout { operation, after_ms })
        }
    }
}
