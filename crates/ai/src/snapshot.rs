use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockwatch_core::{ProductId, UserId};
use stockwatch_inventory::TransactionType;

/// Point-in-time view of the inventory handed to detection jobs.
///
/// Built once per pass so every job in the pass sees the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub taken_at: DateTime<Utc>,
    pub items: Vec<ProductSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i64,
    pub minimum_stock: i64,
    pub price: Decimal,
    pub expiry_date: Option<NaiveDate>,
    /// Ledger history in commit order (oldest first).
    pub history: Vec<MovementSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSnapshot {
    pub kind: TransactionType,
    pub delta: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub actor: Option<UserId>,
    pub at: DateTime<Utc>,
}

impl InventorySnapshot {
    pub fn new(taken_at: DateTime<Utc>, items: Vec<ProductSnapshot>) -> Self {
        Self { taken_at, items }
    }

    pub fn item(&self, product_id: ProductId) -> Option<&ProductSnapshot> {
        self.items.iter().find(|i| i.product_id == product_id)
    }
}

impl ProductSnapshot {
    /// History since the most recent recount (`adjustment`), inclusive.
    ///
    /// A recount re-baselines the ledger: discrepancies before it were
    /// absorbed by the physical count.
    pub fn since_last_recount(&self) -> &[MovementSnapshot] {
        let start = self
            .history
            .iter()
            .rposition(|m| m.kind == TransactionType::Adjustment)
            .unwrap_or(0);
        &self.history[start..]
    }
}
