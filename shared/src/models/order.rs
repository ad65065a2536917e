//! Order and backorder models
//!
//! Orders are owned by the order-intake side of the system; the engine
//! reads demand fields and writes back status, per-line cost price, and
//! allocation bookkeeping. Backorders are owned by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Warehouse;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed before sufficient stock exists; converted once stock arrives
    Preorder,
    Confirmed,
    PartiallyConfirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Preorder => "preorder",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::PartiallyConfirmed => "partially_confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "preorder" => Some(OrderStatus::Preorder),
            "confirmed" => Some(OrderStatus::Confirmed),
            "partially_confirmed" => Some(OrderStatus::PartiallyConfirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Who funds the stock an order draws from
///
/// Maps one-to-one onto the warehouse a reservation is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingSource {
    Company,
    Private,
}

impl FundingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingSource::Company => "company",
            FundingSource::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "company" => Some(FundingSource::Company),
            "private" => Some(FundingSource::Private),
            _ => None,
        }
    }

    pub fn warehouse(&self) -> Warehouse {
        match self {
            FundingSource::Company => Warehouse::Company,
            FundingSource::Private => Warehouse::Private,
        }
    }
}

/// A sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub status: OrderStatus,
    pub funding_source: FundingSource,
    pub is_preferred_customer: bool,
    /// Manual priority score used by the priority allocation strategy
    pub priority: i32,
    pub ordered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// None until a variant is pinned; resolved to the product's default
    /// variant at conversion time
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    /// Weighted-average unit cost of the lots actually reserved for this
    /// line; set exactly once, by the reservation that satisfies it
    pub cost_price: Option<Decimal>,
    pub allocated_quantity: i32,
    pub shortage_quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Backorder lifecycle status (soft lifecycle, never deleted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackorderStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl BackorderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackorderStatus::Pending => "pending",
            BackorderStatus::Fulfilled => "fulfilled",
            BackorderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BackorderStatus::Pending),
            "fulfilled" => Some(BackorderStatus::Fulfilled),
            "cancelled" => Some(BackorderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Unmet demand recorded after allocation, pending future replenishment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backorder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    pub priority: i32,
    pub status: BackorderStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
