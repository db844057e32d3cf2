//! Inventory domain module.
//!
//! Business rules for products, stock movements and the transaction ledger,
//! implemented as deterministic domain logic (no IO, no async, no storage).

pub mod events;
pub mod ledger;
pub mod product;
pub mod transaction;

pub use events::{InventoryEvent, LedgerDiverged, StockChanged};
pub use ledger::{StockChange, StockError, StockMovement, compute_change, replay};
pub use product::{DEFAULT_MINIMUM_STOCK, FIXTURE_NAME_PREFIX, NewProduct, Product, ProductPatch};
pub use transaction::{MAX_REASON_LEN, Transaction, TransactionType};
