// Validated Types
// Strongly-typed wrappers that enforce invariants at construction time.
// These values cannot exist in an invalid state, so the code consuming them
// never re-checks ranges.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A percentile rank, strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPercentile {
    inner: f64,
}

impl ValidatedPercentile {
    /// Create a new percentile rank.
    ///
    /// # Invariants
    /// - `0 < percent < 1`
    /// - Finite
    pub fn new(percent: f64) -> Result<Self> {
        ensure!(
            percent.is_finite() && percent > 0.0 && percent < 1.0,
            "Percentile must be in the open range (0, 1), got {percent}"
        );
        Ok(Self { inner: percent })
    }

    pub fn get(&self) -> f64 {
        self.inner
    }
}

impl fmt::Display for ValidatedPercentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%ile", self.inner * 100.0)
    }
}

/// A strictly positive, finite threshold in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedThreshold {
    inner: f64,
}

impl ValidatedThreshold {
    /// Create a new threshold.
    ///
    /// # Invariants
    /// - Strictly positive
    /// - Finite
    pub fn new(seconds: f64) -> Result<Self> {
        ensure!(
            seconds.is_finite() && seconds > 0.0,
            "Threshold must be a positive number of seconds, got {seconds}"
        );
        Ok(Self { inner: seconds })
    }

    pub fn get(&self) -> f64 {
        self.inner
    }
}

impl fmt::Display for ValidatedThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}s", self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_accepts_open_range() {
        assert!(ValidatedPercentile::new(0.5).is_ok());
        assert!(ValidatedPercentile::new(0.001).is_ok());
        assert!(ValidatedPercentile::new(0.999).is_ok());
    }

    #[test]
    fn test_percentile_rejects_bounds_and_garbage() {
        for bad in [0.0, 1.0, -0.5, 1.5, f64::NAN, f64::INFINITY] {
            assert!(
                ValidatedPercentile::new(bad).is_err(),
                "expected rejection of {bad}"
            );
        }
    }

    #[test]
    fn test_threshold_rejects_non_positive() {
        assert!(ValidatedThreshold::new(4.0).is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::NEG_INFINITY] {
            assert!(
                ValidatedThreshold::new(bad).is_err(),
                "expected rejection of {bad}"
            );
        }
    }

    #[test]
    fn test_display_formats() {
        let p = ValidatedPercentile::new(0.9).unwrap();
        assert_eq!(p.to_string(), "90%ile");
        let t = ValidatedThreshold::new(4.0).unwrap();
        assert_eq!(t.to_string(), "4.00s");
    }
}
