//! Scalar error scoring: compares two `WorkloadFeatures` bundles and
//! reduces their six per-feature percent errors to a single number a
//! greedy search can optimize against.

use blkfeature_trace::WorkloadFeatures;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which reduction to apply over the six per-feature percent errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorMetric {
    Mean,
    Max,
    WeightedMean,
}

impl fmt::Display for ErrorMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorMetric::Mean => "mean",
            ErrorMetric::Max => "max",
            ErrorMetric::WeightedMean => "wmean",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ErrorMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mean" => Ok(ErrorMetric::Mean),
            "max" => Ok(ErrorMetric::Max),
            "wmean" => Ok(ErrorMetric::WeightedMean),
            other => Err(format!("unknown error metric {other}")),
        }
    }
}

/// Signed per-feature percent errors plus the three scalar reductions of
/// their absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorDict {
    pub per_feature: [f64; 6],
    pub mean: f64,
    pub max: f64,
    pub wmean: f64,
}

impl ErrorDict {
    pub fn score(&self, metric: ErrorMetric) -> f64 {
        match metric {
            ErrorMetric::Mean => self.mean,
            ErrorMetric::Max => self.max,
            ErrorMetric::WeightedMean => self.wmean,
        }
    }
}

/// Computes the percent error of each feature in `sample` relative to
/// `full`, signed `100 * (full - sample) / full`, plus the mean, max,
/// and error-weighted mean of their absolute values. A feature whose
/// `full` value is exactly 0 contributes 0 (undefined percent error of
/// nothing is no error).
pub fn error_dict(full: &WorkloadFeatures, sample: &WorkloadFeatures) -> ErrorDict {
    let full_arr = full.as_array();
    let sample_arr = sample.as_array();

    let mut signed = [0.0f64; 6];
    for i in 0..6 {
        signed[i] = if full_arr[i] == 0.0 {
            0.0
        } else {
            100.0 * (full_arr[i] - sample_arr[i]) / full_arr[i]
        };
    }

    let abs: [f64; 6] = std::array::from_fn(|i| signed[i].abs());
    let mean = abs.iter().sum::<f64>() / abs.len() as f64;
    let max = abs.iter().cloned().fold(f64::MIN, f64::max);
    let abs_sum: f64 = abs.iter().sum();
    let wmean = if abs_sum > 0.0 {
        abs.iter().map(|v| v * (v / abs_sum)).sum()
    } else {
        0.0
    };

    ErrorDict {
        per_feature: signed,
        mean,
        max,
        wmean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(v: f64) -> WorkloadFeatures {
        WorkloadFeatures {
            mean_read_size: v,
            mean_write_size: v,
            mean_read_iat: v,
            mean_write_iat: v,
            misalignment_per_read: v,
            misalignment_per_write: v,
        }
    }

    #[test]
    fn identical_features_have_zero_error() {
        let full = features(100.0);
        let sample = features(100.0);
        let err = error_dict(&full, &sample);
        assert_eq!(err.mean, 0.0);
        assert_eq!(err.max, 0.0);
        assert_eq!(err.wmean, 0.0);
    }

    #[test]
    fn zero_full_value_contributes_no_error() {
        let mut full = features(100.0);
        full.misalignment_per_read = 0.0;
        let sample = features(100.0);
        let err = error_dict(&full, &sample);
        assert_eq!(err.per_feature[4], 0.0);
    }

    #[test]
    fn metric_selection_picks_the_right_scalar() {
        let full = features(100.0);
        let mut sample = features(100.0);
        sample.mean_read_size = 50.0;
        let err = error_dict(&full, &sample);
        assert!(err.score(ErrorMetric::Max) >= err.score(ErrorMetric::Mean));
    }
}
