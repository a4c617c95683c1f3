//! Checked-arithmetic helpers for the 64-bit counters every aggregate in this
//! repository is built from. All aggregate arithmetic runs in wide integers;
//! an overflow is a defect, not a value to wrap or saturate.

use crate::errors::{Error, Result};

/// Adds `b` to `a`, mapping an overflow into `Error::Overflow` instead of
/// wrapping or panicking.
pub fn checked_add(a: i64, b: i64, context: &'static str) -> Result<i64> {
    a.checked_add(b).ok_or(Error::Overflow { context })
}

/// Subtracts `b` from `a`, mapping an underflow/overflow into `Error::Overflow`.
pub fn checked_sub(a: i64, b: i64, context: &'static str) -> Result<i64> {
    a.checked_sub(b).ok_or(Error::Overflow { context })
}

/// Computes a mean as `0` when the denominator is `0` (an undefined mean,
/// rather than a division panic).
pub fn safe_mean(sum: i64, count: i64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let err = checked_add(i64::MAX, 1, "test").unwrap_err();
        assert!(matches!(err, Error::Overflow { context: "test" }));
    }

    #[test]
    fn safe_mean_handles_zero_denominator() {
        assert_eq!(safe_mean(100, 0), 0.0);
        assert_eq!(safe_mean(100, 4), 25.0);
    }
}
