//! Product catalog: create, edit and remove products outside the stock path.
//!
//! Quantities are only written by the ledger; the catalog never touches them
//! after creation. Edits take the product's ledger guard so they serialize
//! with in-flight stock changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use stockwatch_core::{ExpectedVersion, ProductId};
use stockwatch_inventory::{FIXTURE_NAME_PREFIX, NewProduct, Product, ProductPatch};

use crate::error::PipelineError;
use crate::ledger::StockLedger;
use crate::store::{ProductFilter, ProductStore, bounded};

pub struct ProductCatalog {
    products: Arc<dyn ProductStore>,
    ledger: Arc<StockLedger>,
    timeout: Duration,
}

fn reject_reserved(name: &str) -> Result<(), PipelineError> {
    if name.trim_start().starts_with(FIXTURE_NAME_PREFIX) {
        return Err(PipelineError::validation(format!(
            "product names starting with '{FIXTURE_NAME_PREFIX}' are reserved for test fixtures"
        )));
    }
    Ok(())
}

impl ProductCatalog {
    pub fn new(products: Arc<dyn ProductStore>, ledger: Arc<StockLedger>, timeout: Duration) -> Self {
        Self {
            products,
            ledger,
            timeout,
        }
    }

    pub async fn create(&self, input: NewProduct) -> Result<Product, PipelineError> {
        reject_reserved(&input.name)?;
        let product = Product::create(ProductId::new(), input, Utc::now())?;
        let stored = bounded("products.insert", self.timeout, self.products.insert(product)).await?;
        tracing::info!(product_id = %stored.id_typed(), name = stored.name(), "product created");
        Ok(stored)
    }

    pub async fn get(&self, id: ProductId) -> Result<Product, PipelineError> {
        bounded("products.get", self.timeout, self.products.get(id))
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("product {id}")))
    }

    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, PipelineError> {
        Ok(bounded("products.list", self.timeout, self.products.list(filter)).await?)
    }

    /// Edit descriptive fields. Quantity is not patchable; use the pipeline.
    pub async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, PipelineError> {
        if let Some(name) = &patch.name {
            reject_reserved(name)?;
        }
        let guard = self.ledger.lock(id).await;
        let current = self.ledger.current(&guard).await?;
        let next = current.apply_patch(patch, Utc::now())?;
        let saved = bounded(
            "products.save",
            self.timeout,
            self.products.save(next, ExpectedVersion::Exact(current.version())),
        )
        .await?;
        Ok(saved)
    }

    /// Returns whether a product was removed. Its transactions stay in the log.
    pub async fn delete(&self, id: ProductId) -> Result<bool, PipelineError> {
        let _guard = self.ledger.lock(id).await;
        let removed = bounded("products.delete", self.timeout, self.products.delete(id)).await?;
        if removed {
            tracing::info!(product_id = %id, "product deleted");
        }
        Ok(removed)
    }
}
