//! Shared numeric checks for quantities and money amounts.

use crate::error::{DomainError, DomainResult};

/// Tolerance for monetary consistency checks (subtotal/tax/total).
pub const MONEY_TOLERANCE: f64 = 0.01;

/// Quantities at or below this magnitude are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// `true` when `a` and `b` differ by less than `tolerance`.
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// `true` when a quantity has been drawn down to nothing.
pub fn is_depleted(quantity: f64) -> bool {
    quantity.abs() <= QUANTITY_EPSILON
}

/// Strictly positive, finite quantity.
pub fn ensure_positive(field: &str, value: f64) -> DomainResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(DomainError::validation(
            field,
            format!("must be a positive number (got {value})"),
        ));
    }
    Ok(())
}

/// Finite value that is zero or greater.
pub fn ensure_non_negative(field: &str, value: f64) -> DomainResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::validation(
            field,
            format!("must be zero or greater (got {value})"),
        ));
    }
    Ok(())
}
