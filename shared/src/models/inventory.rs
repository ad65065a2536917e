//! Inventory ledger models
//!
//! A lot is one `(variant, warehouse)` ledger row. The lot table is the
//! single source of truth for current stock; movements and backorders are
//! derived satellites.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical warehouse holding stock
///
/// Company stock is consumed before private stock when a reservation does
/// not pin a warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Warehouse {
    Company,
    Private,
}

impl Warehouse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Warehouse::Company => "company",
            Warehouse::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "company" => Some(Warehouse::Company),
            "private" => Some(Warehouse::Private),
            _ => None,
        }
    }

    /// Consumption preference order for unpinned reservations
    pub fn preference_order() -> [Warehouse; 2] {
        [Warehouse::Company, Warehouse::Private]
    }
}

/// One ledger row per (variant, warehouse)
///
/// Invariant: `quantity == reserved + available` at all times. A violation
/// indicates an un-transacted write, not a business state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLot {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub warehouse: Warehouse,
    /// Total units on hand
    pub quantity: i32,
    /// Units committed to confirmed orders
    pub reserved: i32,
    /// Sellable units
    pub available: i32,
    /// Rolling weighted-average unit cost
    pub cost_basis: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLot {
    pub fn invariant_holds(&self) -> bool {
        self.quantity == self.reserved + self.available
            && self.quantity >= 0
            && self.reserved >= 0
            && self.available >= 0
    }
}

/// Types of stock movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    StockIn,
    Adjustment,
    Reservation,
    Release,
    SaleConsumption,
    DamageTransfer,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "stock_in",
            MovementType::Adjustment => "adjustment",
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
            MovementType::SaleConsumption => "sale_consumption",
            MovementType::DamageTransfer => "damage_transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stock_in" => Some(MovementType::StockIn),
            "adjustment" => Some(MovementType::Adjustment),
            "reservation" => Some(MovementType::Reservation),
            "release" => Some(MovementType::Release),
            "sale_consumption" => Some(MovementType::SaleConsumption),
            "damage_transfer" => Some(MovementType::DamageTransfer),
            _ => None,
        }
    }
}

/// Append-only movement log entry
///
/// Written in the same transaction as the lot mutation it records; never
/// updated or deleted. Audit and reconciliation read this; current state
/// comes from the lot table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub warehouse: Warehouse,
    pub movement_type: MovementType,
    pub quantity_before: i32,
    /// Signed delta. Reservation and release movements track the lot's
    /// available units; every other type tracks total on-hand quantity.
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub reason: String,
    /// Linking order / purchase / transfer id
    pub reference: Option<String>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

/// Read-time rollup of a variant's lots across warehouses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockOverview {
    pub variant_id: Uuid,
    pub total_quantity: i64,
    pub total_reserved: i64,
    pub total_available: i64,
    pub lots: Vec<WarehouseStock>,
}

/// Per-warehouse slice of the rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse: Warehouse,
    pub quantity: i32,
    pub reserved: i32,
    pub available: i32,
    pub cost_basis: Decimal,
}
