//! Pure stock arithmetic: movements in, `(previous, new)` pairs out.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockwatch_core::ProductId;

use crate::product::Product;
use crate::transaction::{Transaction, TransactionType};

/// A requested change to one product's on-hand quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StockMovement {
    /// Relative change; the direction comes from `kind`, the magnitude from `|quantity|`.
    Delta { kind: TransactionType, quantity: i64 },
    /// Absolute recount (`adjustment`).
    Set { target: i64 },
}

impl StockMovement {
    pub fn delta(kind: TransactionType, quantity: i64) -> Self {
        Self::Delta { kind, quantity }
    }

    pub fn set(target: i64) -> Self {
        Self::Set { target }
    }

    pub fn kind(&self) -> TransactionType {
        match self {
            StockMovement::Delta { kind, .. } => *kind,
            StockMovement::Set { .. } => TransactionType::Adjustment,
        }
    }
}

/// Outcome of a ledger computation, consumed by the transaction recorder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub product_id: ProductId,
    pub kind: TransactionType,
    pub previous: i64,
    pub new: i64,
}

impl StockChange {
    pub fn applied_delta(&self) -> i64 {
        self.new - self.previous
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("invalid stock movement: {0}")]
    InvalidMovement(String),

    #[error("stock quantity overflow")]
    Overflow,

    #[error("ledger diverged for product {product_id}: expected quantity {expected}, found {found}")]
    Diverged {
        product_id: ProductId,
        expected: i64,
        found: i64,
    },
}

/// Compute the change a movement would produce against `product`.
///
/// Does not mutate anything; a successful result is applied with
/// [`Product::apply_change`].
pub fn compute_change(product: &Product, movement: &StockMovement) -> Result<StockChange, StockError> {
    let previous = product.quantity();
    let product_id = product.id_typed();

    let new = match *movement {
        StockMovement::Delta { kind, quantity } => {
            if quantity == 0 {
                return Err(StockError::InvalidMovement("delta cannot be zero".to_string()));
            }
            let effect = match kind.signed_effect(quantity) {
                Some(effect) => effect,
                None if kind == TransactionType::Adjustment => {
                    return Err(StockError::InvalidMovement(
                        "adjustment sets an absolute quantity; use set_quantity".to_string(),
                    ));
                }
                None => return Err(StockError::Overflow),
            };
            let new = previous.checked_add(effect).ok_or(StockError::Overflow)?;
            if new < 0 {
                return Err(StockError::InsufficientStock {
                    product_id,
                    available: previous,
                    requested: -effect,
                });
            }
            new
        }
        StockMovement::Set { target } => {
            if target < 0 {
                return Err(StockError::InvalidMovement(format!(
                    "adjustment target cannot be negative (got {target})"
                )));
            }
            target
        }
    };

    Ok(StockChange {
        product_id,
        kind: movement.kind(),
        previous,
        new,
    })
}

/// Replay a product's transaction history in commit order.
///
/// Returns the reconstructed quantity, or the index of the first record whose
/// `previous_quantity` does not continue the chain.
pub fn replay<'a>(
    initial: i64,
    history: impl IntoIterator<Item = &'a Transaction>,
) -> Result<i64, usize> {
    let mut running = initial;
    for (idx, tx) in history.into_iter().enumerate() {
        if tx.previous_quantity() != running || !tx.is_consistent() {
            return Err(idx);
        }
        running = tx.new_quantity();
    }
    Ok(running)
}
