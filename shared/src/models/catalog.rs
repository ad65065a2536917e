//! Product catalog models
//!
//! The catalog is read-only from the engine's point of view, with one
//! exception: the damage-transfer flow lazily creates the canonical
//! "damaged" sibling variant for a product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variant kind tag
///
/// `Damaged` marks the markdown sibling created by damage transfer. A
/// product carries at most one damaged variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    Standard,
    Damaged,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Standard => "standard",
            VariantType::Damaged => "damaged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(VariantType::Standard),
            "damaged" => Some(VariantType::Damaged),
            _ => None,
        }
    }
}

/// A sellable variant of a product (vintage, bottle size, damaged stock)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub variant_type: VariantType,
    /// List price per unit
    pub price: Decimal,
    /// Default unit cost, used as the basis seed for lazily created lots
    pub cost_price: Decimal,
    /// Picked when an order line does not pin a variant
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
