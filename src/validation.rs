//! Amount validation for ledger operations
//!
//! All rules that decide whether a caller-supplied amount is admissible live
//! here, as pure functions over the gram-denominated domain. The engine
//! never receives an amount that has not passed through this module.

use thiserror::Error;

use crate::models::GRAMS_PER_KG;

/// Validation errors for caller-supplied amounts
#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("Amount must be a finite number, got: {0}")]
    NotFinite(f64),

    #[error("Amount out of representable range: {0} kg")]
    OutOfRange(f64),

    #[error("Roll addition must be positive, got: {0} kg")]
    NonPositiveAddition(f64),

    #[error("Roll remainder must be non-negative, got: {0} kg")]
    NegativeRemainder(f64),

    #[error("Usage cannot increase roll stock: requested {requested_grams} g, roll holds {available_grams} g (use a correction instead)")]
    ExceedsRollStock {
        requested_grams: i64,
        available_grams: i64,
    },
}

// Half the i64 gram range, far beyond any physical stock; keeps later
// aggregate additions from overflowing.
const MAX_GRAMS: i64 = i64::MAX / 2;

/// Convert a kilogram amount from the API boundary to integer grams
///
/// Rejects NaN/infinite inputs and values outside the representable range.
/// Rounds to the nearest gram, the same way the platform rounds currency
/// to minor units.
pub fn kg_to_grams(kg: f64) -> Result<i64, AmountError> {
    if !kg.is_finite() {
        return Err(AmountError::NotFinite(kg));
    }
    let grams = (kg * GRAMS_PER_KG).round();
    if grams.abs() > MAX_GRAMS as f64 {
        return Err(AmountError::OutOfRange(kg));
    }
    Ok(grams as i64)
}

/// Validate the amount for a roll addition (must be strictly positive)
pub fn validate_addition(amount_kg: f64) -> Result<i64, AmountError> {
    let grams = kg_to_grams(amount_kg)?;
    if grams <= 0 {
        return Err(AmountError::NonPositiveAddition(amount_kg));
    }
    Ok(grams)
}

/// Validate the new remainder for a usage (consume) operation
///
/// Usage can only draw stock down: `0 <= new_remaining <= current`.
pub fn validate_usage_remainder(
    new_remaining_kg: f64,
    current_roll_grams: i64,
) -> Result<i64, AmountError> {
    let grams = kg_to_grams(new_remaining_kg)?;
    if grams < 0 {
        return Err(AmountError::NegativeRemainder(new_remaining_kg));
    }
    if grams > current_roll_grams {
        return Err(AmountError::ExceedsRollStock {
            requested_grams: grams,
            available_grams: current_roll_grams,
        });
    }
    Ok(grams)
}

/// Validate the corrected remainder for a correction operation
///
/// Corrections may move a roll in either direction, including above any
/// previously recorded value; only negative targets are rejected.
pub fn validate_correction_remainder(corrected_kg: f64) -> Result<i64, AmountError> {
    let grams = kg_to_grams(corrected_kg)?;
    if grams < 0 {
        return Err(AmountError::NegativeRemainder(corrected_kg));
    }
    Ok(grams)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kg_to_grams_rounds() {
        assert_eq!(kg_to_grams(10.0).unwrap(), 10_000);
        assert_eq!(kg_to_grams(7.5).unwrap(), 7_500);
        assert_eq!(kg_to_grams(0.0005).unwrap(), 1); // rounds up to 1 g
    }

    #[test]
    fn test_kg_to_grams_rejects_nan() {
        assert!(matches!(
            kg_to_grams(f64::NAN),
            Err(AmountError::NotFinite(v)) if v.is_nan()
        ));
    }

    #[test]
    fn test_kg_to_grams_rejects_infinity() {
        assert!(matches!(
            kg_to_grams(f64::INFINITY),
            Err(AmountError::NotFinite(_))
        ));
    }

    #[test]
    fn test_kg_to_grams_rejects_out_of_range() {
        assert!(matches!(kg_to_grams(1e18), Err(AmountError::OutOfRange(_))));
    }

    #[test]
    fn test_addition_must_be_positive() {
        assert_eq!(
            validate_addition(0.0),
            Err(AmountError::NonPositiveAddition(0.0))
        );
        assert_eq!(
            validate_addition(-2.5),
            Err(AmountError::NonPositiveAddition(-2.5))
        );
        assert_eq!(validate_addition(2.5), Ok(2_500));
    }

    #[test]
    fn test_usage_cannot_increase_stock() {
        assert_eq!(
            validate_usage_remainder(9.0, 7_500),
            Err(AmountError::ExceedsRollStock {
                requested_grams: 9_000,
                available_grams: 7_500,
            })
        );
    }

    #[test]
    fn test_usage_to_zero_is_valid() {
        assert_eq!(validate_usage_remainder(0.0, 7_500), Ok(0));
    }

    #[test]
    fn test_usage_rejects_negative() {
        assert_eq!(
            validate_usage_remainder(-1.0, 7_500),
            Err(AmountError::NegativeRemainder(-1.0))
        );
    }

    #[test]
    fn test_correction_allows_increase() {
        assert_eq!(validate_correction_remainder(9.0), Ok(9_000));
    }

    #[test]
    fn test_correction_rejects_negative() {
        assert_eq!(
            validate_correction_remainder(-0.5),
            Err(AmountError::NegativeRemainder(-0.5))
        );
    }
}
