use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_core::{DomainError, Entity, ProductId, TransactionId, UserId};

use crate::ledger::{StockChange, StockError};

/// Upper bound for the free-text reason attached to a transaction.
pub const MAX_REASON_LEN: usize = 500;

/// Kind of stock-changing event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Restock,
    Purchase,
    /// Absolute recount; carries the target quantity, not a delta.
    Adjustment,
    Expiry,
    Damage,
}

impl TransactionType {
    pub const ALL: [TransactionType; 6] = [
        TransactionType::Sale,
        TransactionType::Restock,
        TransactionType::Purchase,
        TransactionType::Adjustment,
        TransactionType::Expiry,
        TransactionType::Damage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Sale => "sale",
            TransactionType::Restock => "restock",
            TransactionType::Purchase => "purchase",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Expiry => "expiry",
            TransactionType::Damage => "damage",
        }
    }

    /// Signed effect of `quantity` units for delta-shaped types.
    ///
    /// Returns `None` for `Adjustment`, which is an absolute set.
    pub fn signed_effect(self, quantity: i64) -> Option<i64> {
        let units = quantity.checked_abs()?;
        match self {
            TransactionType::Sale | TransactionType::Expiry | TransactionType::Damage => Some(-units),
            TransactionType::Restock | TransactionType::Purchase => Some(units),
            TransactionType::Adjustment => None,
        }
    }

    /// Stock leaves the shelf (sale, expiry, damage).
    pub fn is_outbound(self) -> bool {
        matches!(
            self,
            TransactionType::Sale | TransactionType::Expiry | TransactionType::Damage
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown transaction type '{s}' (expected one of: sale, restock, purchase, adjustment, expiry, damage)"
                ))
            })
    }
}

/// Immutable ledger record of one stock change.
///
/// `new_quantity == previous_quantity + quantity` always holds for records
/// built through [`Transaction::record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    id: TransactionId,
    product_id: ProductId,
    #[serde(rename = "type")]
    kind: TransactionType,
    /// Applied signed delta.
    quantity: i64,
    previous_quantity: i64,
    new_quantity: i64,
    reason: Option<String>,
    actor: Option<UserId>,
    created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build the record for a committed ledger change.
    pub fn record(
        id: TransactionId,
        change: &StockChange,
        reason: Option<String>,
        actor: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, StockError> {
        if change.new < 0 {
            return Err(StockError::InsufficientStock {
                product_id: change.product_id,
                available: change.previous,
                requested: change.previous - change.new,
            });
        }
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_LEN) {
            return Err(StockError::InvalidMovement(format!(
                "reason exceeds {MAX_REASON_LEN} characters"
            )));
        }

        Ok(Self {
            id,
            product_id: change.product_id,
            kind: change.kind,
            quantity: change.applied_delta(),
            previous_quantity: change.previous,
            new_quantity: change.new,
            reason,
            actor,
            created_at,
        })
    }

    pub fn id_typed(&self) -> TransactionId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn previous_quantity(&self) -> i64 {
        self.previous_quantity
    }

    pub fn new_quantity(&self) -> i64 {
        self.new_quantity
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The arithmetic invariant holds for this record.
    pub fn is_consistent(&self) -> bool {
        self.previous_quantity.checked_add(self.quantity) == Some(self.new_quantity)
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
