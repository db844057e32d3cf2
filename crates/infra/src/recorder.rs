//! Transaction recorder: turns committed ledger changes into immutable records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use stockwatch_core::{TransactionId, UserId};
use stockwatch_inventory::{StockChange, Transaction};

use crate::error::PipelineError;
use crate::ledger::LedgerGuard;
use crate::store::{TransactionFilter, TransactionStore, bounded};

pub struct TransactionRecorder {
    transactions: Arc<dyn TransactionStore>,
    timeout: Duration,
}

impl TransactionRecorder {
    pub fn new(transactions: Arc<dyn TransactionStore>, timeout: Duration) -> Self {
        Self { transactions, timeout }
    }

    /// Append the record for `change`.
    ///
    /// Takes the ledger guard of the changed product: the append must land
    /// before the next writer reads the quantity.
    pub async fn record(
        &self,
        guard: &LedgerGuard,
        change: &StockChange,
        reason: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Transaction, PipelineError> {
        if guard.product_id() != change.product_id {
            return Err(PipelineError::Conflict(format!(
                "guard held for product {} but change targets {}",
                guard.product_id(),
                change.product_id
            )));
        }
        let tx = Transaction::record(TransactionId::new(), change, reason, actor, Utc::now())?;
        bounded("transactions.append", self.timeout, self.transactions.append(tx.clone())).await?;
        tracing::debug!(
            transaction_id = %tx.id_typed(),
            product_id = %tx.product_id(),
            kind = %tx.kind(),
            quantity = tx.quantity(),
            "transaction recorded"
        );
        Ok(tx)
    }

    /// History matching `filter`, newest first.
    pub async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, PipelineError> {
        Ok(bounded("transactions.list", self.timeout, self.transactions.list(filter)).await?)
    }
}
