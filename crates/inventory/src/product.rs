//! Product records and catalogue input types.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Result};

/// Maximum length of a product name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum length of a product description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Highest accepted unit price ($10,000,000.00). At this price a line of
/// `u32::MAX` units still fits in the cent range.
pub const MAX_UNIT_PRICE: Money = Money::from_cents(1_000_000_000);

/// A product and its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier, assigned by the store.
    pub id: ProductId,

    /// Display name.
    pub name: String,

    /// Free-form description.
    pub description: String,

    /// Current unit price.
    pub unit_price: Money,

    /// Units currently available for reservation.
    pub quantity_on_hand: u32,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When the product was last modified, including stock changes.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if at least `quantity` units are on hand.
    pub fn has_stock(&self, quantity: u32) -> bool {
        self.quantity_on_hand >= quantity
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Money,
    pub quantity_on_hand: u32,
}

impl NewProduct {
    /// Validates the product fields.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        validate_price(self.unit_price)
    }
}

/// Partial update of a product. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub quantity_on_hand: Option<u32>,
}

impl ProductUpdate {
    /// Validates the fields that are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(price) = self.unit_price {
            validate_price(price)?;
        }
        Ok(())
    }

    /// Applies the update to a product in place.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.unit_price {
            product.unit_price = price;
        }
        if let Some(quantity) = self.quantity_on_hand {
            product.quantity_on_hand = quantity;
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(InventoryError::Validation(format!(
            "name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(InventoryError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_price(price: Money) -> Result<()> {
    if !price.is_positive() {
        return Err(InventoryError::Validation(
            "price must be greater than 0".to_string(),
        ));
    }
    if price > MAX_UNIT_PRICE {
        return Err(InventoryError::Validation(format!(
            "price must be at most {MAX_UNIT_PRICE}"
        )));
    }
    Ok(())
}
