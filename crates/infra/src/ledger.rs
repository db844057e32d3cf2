//! Stock ledger: the only writer of product quantities.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use stockwatch_core::{ExpectedVersion, ProductId};
use stockwatch_inventory::{Product, StockChange, StockMovement, TransactionType, compute_change};

use crate::error::PipelineError;
use crate::store::{ProductStore, bounded};

/// Exclusive hold on one product's quantity.
///
/// Obtained from [`StockLedger::lock`]; every ledger write takes the guard, and
/// the orchestrator keeps it until the transaction is recorded, so two
/// requests for the same product never read the same `previous` quantity.
/// Dropping the last guard for a product releases its lock slot.
#[derive(Debug)]
pub struct LedgerGuard {
    product_id: ProductId,
    permit: Option<OwnedMutexGuard<()>>,
    slots: Arc<LockSlots>,
}

impl LedgerGuard {
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        self.permit.take();
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Waiters hold a clone of the slot; only the map's reference is left
        // once nobody is queued.
        if slots.get(&self.product_id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.product_id);
        }
    }
}

type LockSlots = Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>;

pub struct StockLedger {
    products: Arc<dyn ProductStore>,
    guards: Arc<LockSlots>,
    timeout: Duration,
}

impl StockLedger {
    pub fn new(products: Arc<dyn ProductStore>, timeout: Duration) -> Self {
        Self {
            products,
            guards: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Wait for exclusive access to `product_id`.
    ///
    /// Requests for different products never contend.
    pub async fn lock(&self, product_id: ProductId) -> LedgerGuard {
        let slot = {
            let mut guards = self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(guards.entry(product_id).or_default())
        };
        LedgerGuard {
            product_id,
            permit: Some(slot.lock_owned().await),
            slots: Arc::clone(&self.guards),
        }
    }

    #[cfg(test)]
    fn tracked_slots(&self) -> usize {
        self.guards.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Current product state, read under the guard.
    pub async fn current(&self, guard: &LedgerGuard) -> Result<Product, PipelineError> {
        let id = guard.product_id();
        bounded("products.get", self.timeout, self.products.get(id))
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("product {id}")))
    }

    /// Whether `product_id` is in the catalog. Unguarded read.
    pub async fn contains(&self, product_id: ProductId) -> Result<bool, PipelineError> {
        Ok(bounded("products.get", self.timeout, self.products.get(product_id))
            .await?
            .is_some())
    }

    /// Relative change: `sale`, `expiry` and `damage` subtract `|quantity|`;
    /// `restock` and `purchase` add it. `adjustment` is rejected here.
    pub async fn apply_delta(
        &self,
        guard: &LedgerGuard,
        kind: TransactionType,
        quantity: i64,
    ) -> Result<StockChange, PipelineError> {
        self.apply(guard, StockMovement::delta(kind, quantity)).await
    }

    /// Absolute recount, recorded as an `adjustment`.
    pub async fn set_quantity(&self, guard: &LedgerGuard, target: i64) -> Result<StockChange, PipelineError> {
        self.apply(guard, StockMovement::set(target)).await
    }

    pub async fn apply(&self, guard: &LedgerGuard, movement: StockMovement) -> Result<StockChange, PipelineError> {
        let product = self.current(guard).await?;
        let change = compute_change(&product, &movement)?;
        let next = product.apply_change(&change, Utc::now())?;

        // The guard serializes pipeline writers; the version check catches
        // anything that wrote around it (catalog edits, fixtures).
        bounded(
            "products.save",
            self.timeout,
            self.products.save(next, ExpectedVersion::Exact(product.version())),
        )
        .await?;

        tracing::debug!(
            product_id = %change.product_id,
            kind = %change.kind,
            previous = change.previous,
            new = change.new,
            "ledger applied stock change"
        );
        Ok(change)
    }
}
