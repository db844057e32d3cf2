use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use stockwatch_anomalies::{Alert, Anomaly};
use stockwatch_core::{AlertId, AnomalyId, ExpectedVersion, ProductId};
use stockwatch_inventory::{Product, Transaction};

use super::{AlertStore, AnomalyFilter, AnomalyStore, ProductFilter, ProductStore, TransactionFilter, TransactionStore};
use crate::error::StoreError;

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// In-memory product table.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    rows: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.rows.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut out: Vec<Product> = rows.values().filter(|p| filter.matches(p)).cloned().collect();
        out.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(out)
    }

    async fn insert(&self, mut product: Product) -> Result<Product, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let id = product.id_typed();
        if rows.contains_key(&id) {
            return Err(StoreError::Conflict(format!("product {id} already exists")));
        }
        product.set_version(1);
        rows.insert(id, product.clone());
        Ok(product)
    }

    async fn save(&self, mut product: Product, expected: ExpectedVersion) -> Result<Product, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let id = product.id_typed();
        let current = rows.get(&id).ok_or(StoreError::NotFound)?.version();
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "product {id}: expected {expected:?}, found version {current}"
            )));
        }
        product.set_version(current + 1);
        rows.insert(id, product.clone());
        Ok(product)
    }

    async fn delete(&self, id: ProductId) -> Result<bool, StoreError> {
        Ok(self.rows.write().map_err(|_| poisoned())?.remove(&id).is_some())
    }
}

/// In-memory append-only transaction log.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    log: RwLock<Vec<Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn append(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut log = self.log.write().map_err(|_| poisoned())?;
        if log.iter().any(|t| t.id_typed() == transaction.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "transaction {} already recorded",
                transaction.id_typed()
            )));
        }
        log.push(transaction);
        Ok(())
    }

    async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        let log = self.log.read().map_err(|_| poisoned())?;
        // Append order is commit order; newest first is the reverse.
        let matching = log.iter().rev().filter(|t| filter.matches(t)).cloned();
        Ok(match filter.limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAnomalyStore {
    rows: RwLock<Vec<Anomaly>>,
}

impl InMemoryAnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnomalyStore for InMemoryAnomalyStore {
    async fn insert(&self, anomaly: Anomaly) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.iter().any(|a| a.id_typed() == anomaly.id_typed()) {
            return Err(StoreError::Conflict(format!("anomaly {} already exists", anomaly.id_typed())));
        }
        rows.push(anomaly);
        Ok(())
    }

    async fn get(&self, id: AnomalyId) -> Result<Option<Anomaly>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.iter().find(|a| a.id_typed() == id).cloned())
    }

    async fn save(&self, anomaly: Anomaly) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let slot = rows
            .iter_mut()
            .find(|a| a.id_typed() == anomaly.id_typed())
            .ok_or(StoreError::NotFound)?;
        *slot = anomaly;
        Ok(())
    }

    async fn list(&self, filter: &AnomalyFilter) -> Result<Vec<Anomaly>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut out: Vec<Anomaly> = rows.iter().rev().filter(|a| filter.matches(a)).cloned().collect();
        // Stable: equal timestamps keep reverse insertion order.
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    rows: RwLock<Vec<Alert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn insert(&self, alert: Alert) -> Result<(), StoreError> {
        self.rows.write().map_err(|_| poisoned())?.push(alert);
        Ok(())
    }

    async fn list(&self, unread_only: bool) -> Result<Vec<Alert>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut out: Vec<Alert> = rows
            .iter()
            .rev()
            .filter(|a| !unread_only || !a.is_read())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out)
    }

    async fn mark_read(&self, id: AlertId) -> Result<Alert, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let slot = rows.iter_mut().find(|a| a.id_typed() == id).ok_or(StoreError::NotFound)?;
        *slot = slot.mark_read();
        Ok(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockwatch_inventory::{NewProduct, StockChange, TransactionType};
    use stockwatch_core::TransactionId;

    fn product(name: &str, quantity: i64) -> Product {
        Product::create(
            ProductId::new(),
            NewProduct {
                name: name.to_string(),
                category: "Electronics".to_string(),
                quantity,
                price: Decimal::new(1999, 2),
                minimum_stock: None,
                expiry_date: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_enforces_expected_version() {
        let store = InMemoryProductStore::new();
        let stored = store.insert(product("Keyboard", 20)).await.unwrap();
        assert_eq!(stored.version(), 1);

        let saved = store.save(stored.clone(), ExpectedVersion::Exact(1)).await.unwrap();
        assert_eq!(saved.version(), 2);

        let err = store.save(stored, ExpectedVersion::Exact(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn product_filter_applies_every_criterion() {
        let store = InMemoryProductStore::new();
        store.insert(product("USB Cable", 3)).await.unwrap();
        store.insert(product("Test Product - Low Stock", 5)).await.unwrap();
        store.insert(product("Monitor", 40)).await.unwrap();

        let low = store
            .list(&ProductFilter {
                low_stock_only: true,
                ..ProductFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(low.len(), 2);

        let fixtures = store
            .list(&ProductFilter {
                name_prefix: Some("Test Product - ".to_string()),
                ..ProductFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(fixtures.len(), 1);

        let search = store
            .list(&ProductFilter {
                name_contains: Some("usb".to_string()),
                ..ProductFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(search[0].name(), "USB Cable");
    }

    #[tokio::test]
    async fn transactions_list_newest_first_with_limit() {
        let store = InMemoryTransactionStore::new();
        let product_id = ProductId::new();
        for (prev, new) in [(10, 8), (8, 5), (5, 4)] {
            let change = StockChange {
                product_id,
                kind: TransactionType::Sale,
                previous: prev,
                new,
            };
            let tx = Transaction::record(TransactionId::new(), &change, None, None, Utc::now()).unwrap();
            store.append(tx).await.unwrap();
        }

        let recent = store
            .list(&TransactionFilter {
                limit: Some(2),
                ..TransactionFilter::for_product(product_id)
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].new_quantity(), 4);
        assert_eq!(recent[1].new_quantity(), 5);
    }
}
