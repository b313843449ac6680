// Validation Layer
// Structured errors for the configuration boundary. Every SLA criterion and
// chart configuration is checked against its declared schema here, before
// any iteration is processed: a run never starts with an invalid criterion.

use anyhow::{bail, Result};

/// Validation errors with enough context to point at the offending field.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid configuration for '{criterion}': {reason}")]
    InvalidConfig { criterion: String, reason: String },

    #[error("Unknown criterion: '{name}'")]
    UnknownCriterion { name: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Value of {field} out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Reject non-finite numeric input at the point of entry.
///
/// The algorithms in this crate do arithmetic that would silently propagate
/// NaN through every downstream aggregate; a poisoned stream must fail at
/// `add()` time instead.
pub fn ensure_finite(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        bail!(ValidationError::InvalidInput {
            field: field.to_string(),
            reason: format!("non-numerical value: {value}"),
        });
    }
    Ok(())
}

/// Check an inclusive numeric range, used by criterion config schemas.
pub fn ensure_in_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        bail!(ValidationError::OutOfRange {
            field: field.to_string(),
            reason: format!("{value} not in [{min}, {max}]"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite("duration", 1.5).is_ok());
        assert!(ensure_finite("duration", 0.0).is_ok());
        assert!(ensure_finite("duration", f64::NAN).is_err());
        assert!(ensure_finite("duration", f64::INFINITY).is_err());
    }

    #[test]
    fn test_ensure_in_range() {
        assert!(ensure_in_range("max", 50.0, 0.0, 100.0).is_ok());
        assert!(ensure_in_range("max", 0.0, 0.0, 100.0).is_ok());
        assert!(ensure_in_range("max", 100.5, 0.0, 100.0).is_err());
        assert!(ensure_in_range("max", f64::NAN, 0.0, 100.0).is_err());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = ensure_finite("value", f64::NAN).unwrap_err();
        assert!(err.to_string().contains("non-numerical value"));

        let err = ensure_in_range("sigmas", -1.0, 0.0, 10.0).unwrap_err();
        assert!(err.to_string().contains("sigmas"));
    }
}
