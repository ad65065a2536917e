//! Validation utilities for the Liquor Trade ERP
//!
//! Pure input checks applied before any mutation. Services map these
//! `&'static str` errors into their own error taxonomy.

use rust_decimal::Decimal;

// ============================================================================
// Quantity and cost validations
// ============================================================================

/// Validate a quantity that must be strictly positive (stock-in, reserve,
/// damage transfer)
pub fn validate_positive_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a per-unit cost (zero is allowed for promotional stock)
pub fn validate_unit_cost(cost: Decimal) -> Result<(), &'static str> {
    if cost < Decimal::ZERO {
        return Err("Unit cost cannot be negative");
    }
    Ok(())
}

/// Validate the damage markdown ratio: scaling factor in (0, 1]
pub fn validate_markdown_ratio(ratio: Decimal) -> Result<(), &'static str> {
    if ratio <= Decimal::ZERO || ratio > Decimal::ONE {
        return Err("Markdown ratio must be in (0, 1]");
    }
    Ok(())
}

// ============================================================================
// General validations
// ============================================================================

/// Validate the actor identifier attached to movement records
pub fn validate_actor(actor: &str) -> Result<(), &'static str> {
    if actor.trim().is_empty() {
        return Err("Actor cannot be empty");
    }
    Ok(())
}

/// Validate the free-text reason attached to movement records
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.trim().is_empty() {
        return Err("Reason cannot be empty");
    }
    if reason.len() > 500 {
        return Err("Reason must be at most 500 characters");
    }
    Ok(())
}
