use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_core::{ProductId, TransactionId};
use stockwatch_events::Event;

use crate::transaction::TransactionType;

/// Event: StockChanged (ledger applied and transaction recorded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChanged {
    pub product_id: ProductId,
    pub transaction_id: TransactionId,
    pub kind: TransactionType,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LedgerDiverged.
///
/// The product quantity was committed but its transaction record was not.
/// Operators must reconcile by hand; the pipeline never retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDiverged {
    pub product_id: ProductId,
    pub kind: TransactionType,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockChanged(StockChanged),
    LedgerDiverged(LedgerDiverged),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockChanged(_) => "inventory.stock.changed",
            InventoryEvent::LedgerDiverged(_) => "inventory.ledger.diverged",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockChanged(e) => e.occurred_at,
            InventoryEvent::LedgerDiverged(e) => e.occurred_at,
        }
    }
}
