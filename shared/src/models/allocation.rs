//! Allocation engine inputs and outputs
//!
//! These are ephemeral: built from order rows, consumed by the pure
//! allocation function, and applied by the executor. Nothing here touches
//! storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Order;

/// One order's demand for a specific variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandItem {
    pub order_id: Uuid,
    pub requested_quantity: i32,
    pub priority_score: Option<i32>,
    pub order_timestamp: Option<DateTime<Utc>>,
    pub is_preferred_customer: bool,
}

impl DemandItem {
    /// Build the demand an order places for `requested_quantity` units of
    /// one variant.
    pub fn from_order(order: &Order, requested_quantity: i32) -> Self {
        Self {
            order_id: order.id,
            requested_quantity,
            priority_score: Some(order.priority),
            order_timestamp: Some(order.ordered_at),
            is_preferred_customer: order.is_preferred_customer,
        }
    }
}

/// Per-demand outcome of an allocation run
///
/// `allocated_quantity + shortage_quantity == requested_quantity` always,
/// for every strategy, including demands that receive zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub order_id: Uuid,
    pub requested_quantity: i32,
    pub allocated_quantity: i32,
    pub shortage_quantity: i32,
}

impl AllocationResult {
    /// Fraction of the request satisfied, in [0, 1]
    pub fn fulfillment_rate(&self) -> Decimal {
        if self.requested_quantity == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.allocated_quantity) / Decimal::from(self.requested_quantity)
    }
}

/// Strategy for distributing scarce stock across competing demands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    Proportional,
    Priority,
    FirstComeFirstServed,
}

impl AllocationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStrategy::Proportional => "proportional",
            AllocationStrategy::Priority => "priority",
            AllocationStrategy::FirstComeFirstServed => "first_come_first_served",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "proportional" => Some(AllocationStrategy::Proportional),
            "priority" => Some(AllocationStrategy::Priority),
            "first_come_first_served" | "fcfs" => Some(AllocationStrategy::FirstComeFirstServed),
            _ => None,
        }
    }
}

/// Three-way outcome of a batch operation
///
/// Callers must handle all three arms; per-item failures never surface as a
/// single thrown error for the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    PartialSuccess,
    Failure,
}

impl BatchOutcome {
    /// Classify a finished batch by its success and failure counts.
    ///
    /// An empty batch counts as a success: there was nothing to fail.
    pub fn classify(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            BatchOutcome::Success
        } else if succeeded == 0 {
            BatchOutcome::Failure
        } else {
            BatchOutcome::PartialSuccess
        }
    }
}
