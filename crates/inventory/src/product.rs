use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockwatch_core::{DomainError, DomainResult, Entity, ProductId};

use crate::ledger::{StockChange, StockError};

/// Minimum stock applied when the caller does not provide one.
pub const DEFAULT_MINIMUM_STOCK: i64 = 10;

/// Name prefix reserved for scenario-harness fixtures.
///
/// Catalog writes reject it so that fixture cleanup can never match
/// production products.
pub const FIXTURE_NAME_PREFIX: &str = "Test Product - ";

/// A stocked product together with its current ledger quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: ProductId,
    name: String,
    category: String,
    quantity: i64,
    price: Decimal,
    minimum_stock: i64,
    expiry_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Storage revision, bumped on every successful save.
    version: u64,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub price: Decimal,
    pub minimum_stock: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
}

/// Catalog edit. Quantity is deliberately absent: only the ledger moves stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub minimum_stock: Option<i64>,
    /// `Some(None)` clears the expiry date.
    pub expiry_date: Option<Option<NaiveDate>>,
}

impl Product {
    pub fn create(id: ProductId, input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = validate_name(&input.name)?;
        let category = validate_category(&input.category)?;
        if input.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        validate_price(input.price)?;
        let minimum_stock = input.minimum_stock.unwrap_or(DEFAULT_MINIMUM_STOCK);
        validate_minimum_stock(minimum_stock)?;

        Ok(Self {
            id,
            name,
            category,
            quantity: input.quantity,
            price: input.price,
            minimum_stock,
            expiry_date: input.expiry_date,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn minimum_stock(&self) -> i64 {
        self.minimum_stock
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.expiry_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stores assign the revision after a successful save.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.minimum_stock
    }

    /// Created by the scenario harness (reserved name prefix).
    pub fn is_fixture(&self) -> bool {
        self.name.starts_with(FIXTURE_NAME_PREFIX)
    }

    /// Stock value at list price, saturating at `Decimal::MAX`.
    pub fn stock_value(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }

    /// Apply a computed ledger change, producing the next product state.
    ///
    /// Fails if the change was computed against a different quantity than the
    /// one currently held.
    pub fn apply_change(&self, change: &StockChange, at: DateTime<Utc>) -> Result<Self, StockError> {
        if change.product_id != self.id {
            return Err(StockError::Diverged {
                product_id: self.id,
                expected: change.previous,
                found: self.quantity,
            });
        }
        if change.previous != self.quantity {
            return Err(StockError::Diverged {
                product_id: self.id,
                expected: change.previous,
                found: self.quantity,
            });
        }
        if change.new < 0 {
            return Err(StockError::InsufficientStock {
                product_id: self.id,
                available: self.quantity,
                requested: self.quantity - change.new,
            });
        }

        let mut next = self.clone();
        next.quantity = change.new;
        next.updated_at = at;
        Ok(next)
    }

    /// Overwrite the on-hand count without a ledger entry.
    ///
    /// Models a physical loss or a blind recount; the missing transaction is
    /// exactly what reconciliation detectors look for.
    pub fn with_unledgered_quantity(&self, quantity: i64, at: DateTime<Utc>) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        let mut next = self.clone();
        next.quantity = quantity;
        next.updated_at = at;
        Ok(next)
    }

    pub fn apply_patch(&self, patch: ProductPatch, at: DateTime<Utc>) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = validate_name(&name)?;
        }
        if let Some(category) = patch.category {
            next.category = validate_category(&category)?;
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
            next.price = price;
        }
        if let Some(minimum_stock) = patch.minimum_stock {
            validate_minimum_stock(minimum_stock)?;
            next.minimum_stock = minimum_stock;
        }
        if let Some(expiry_date) = patch.expiry_date {
            next.expiry_date = expiry_date;
        }
        next.updated_at = at;
        Ok(next)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_category(category: &str) -> DomainResult<String> {
    let category = category.trim();
    if category.is_empty() {
        return Err(DomainError::validation("category cannot be empty"));
    }
    Ok(category.to_string())
}

fn validate_price(price: Decimal) -> DomainResult<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(DomainError::validation("price cannot be negative"));
    }
    Ok(())
}

fn validate_minimum_stock(minimum_stock: i64) -> DomainResult<()> {
    if minimum_stock < 0 {
        return Err(DomainError::validation("minimumStock cannot be negative"));
    }
    Ok(())
}
