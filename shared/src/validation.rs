//! Validation utilities for ledger input

use rust_decimal::Decimal;

/// Longest accepted owner id or item reference
pub const MAX_REFERENCE_LEN: usize = 200;

/// Decimal places kept for quantities (grams on a kilogram scale)
pub const QUANTITY_SCALE: u32 = 3;

/// Validate that a moved quantity is strictly positive
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("Quantity supports at most 3 decimal places");
    }
    Ok(())
}

/// Validate a monetary amount attached to an inbound movement
pub fn validate_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

/// Validate an owner id or item reference
pub fn validate_reference(value: &str) -> Result<(), &'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("Reference cannot be empty");
    }
    if trimmed.chars().count() > MAX_REFERENCE_LEN {
        return Err("Reference must be at most 200 characters");
    }
    if trimmed != value {
        return Err("Reference cannot start or end with whitespace");
    }
    Ok(())
}

/// Check that `requested` can be taken out of `available`
pub fn has_sufficient_quantity(available: Decimal, requested: Decimal) -> bool {
    requested <= available
}
