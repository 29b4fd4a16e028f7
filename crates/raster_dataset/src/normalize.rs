//! Global mean/std normalization.
//!
//! Statistics are fitted once on the training features and applied unchanged
//! to the test features.

use crate::types::{DatasetResult, FeatureTensor, LabeledSplit, RasterDatasetError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Scalar mean and population standard deviation over a whole feature tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    pub mean: f32,
    pub std: f32,
}

impl NormStats {
    /// Fit statistics over every element of `features`.
    ///
    /// Empty, constant, or non-finite data is rejected rather than producing
    /// infinities downstream.
    pub fn from_features(features: &FeatureTensor) -> DatasetResult<Self> {
        let n = features.len();
        if n == 0 {
            return Err(RasterDatasetError::DegenerateStatistics {
                mean: f64::NAN,
                std: f64::NAN,
            });
        }
        let mean = features.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let var = features
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;
        let std = var.sqrt();
        if !mean.is_finite() || !std.is_finite() || (std as f32) <= 0.0 {
            return Err(RasterDatasetError::DegenerateStatistics { mean, std });
        }
        Ok(Self {
            mean: mean as f32,
            std: std as f32,
        })
    }

    /// `(x - mean) / std`, elementwise.
    pub fn apply(&self, features: FeatureTensor) -> FeatureTensor {
        let (mean, std) = (self.mean, self.std);
        features.mapv_into(|v| (v - mean) / std)
    }

    pub fn apply_split(&self, split: LabeledSplit) -> LabeledSplit {
        LabeledSplit {
            features: self.apply(split.features),
            labels: split.labels,
        }
    }
}

/// Fit statistics on `train` and apply them to both splits.
pub fn normalize_splits(
    train: LabeledSplit,
    test: LabeledSplit,
) -> DatasetResult<(LabeledSplit, LabeledSplit, NormStats)> {
    let stats = NormStats::from_features(&train.features)?;
    info!(mean = stats.mean, std = stats.std, "fitted normalization on training features");
    Ok((stats.apply_split(train), stats.apply_split(test), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array4};

    fn split_from(values: Vec<f32>, shape: (usize, usize, usize, usize)) -> LabeledSplit {
        let features = Array4::from_shape_vec(shape, values).unwrap();
        let labels = Array1::zeros(shape.0);
        LabeledSplit::new(features, labels).unwrap()
    }

    fn moments(features: &FeatureTensor) -> (f64, f64) {
        let n = features.len() as f64;
        let mean = features.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = features
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var.sqrt())
    }

    #[test]
    fn training_features_end_up_standardized() {
        let values: Vec<f32> = (0..2 * 3 * 4 * 4).map(|i| (i as f32 * 0.37).sin() * 50.0 + 12.0).collect();
        let train = split_from(values, (2, 3, 4, 4));
        let test = split_from(vec![100.0; 3 * 4 * 4], (1, 3, 4, 4));

        let (train, test, stats) = normalize_splits(train, test).unwrap();
        let (mean, std) = moments(&train.features);
        assert!(mean.abs() < 1e-4, "mean {mean}");
        assert!((std - 1.0).abs() < 1e-4, "std {std}");

        let expected = (100.0 - stats.mean) / stats.std;
        assert!(test.features.iter().all(|&v| (v - expected).abs() < 1e-4));
        let (test_mean, _) = moments(&test.features);
        assert!(test_mean.abs() > 0.5);
    }

    #[test]
    fn population_std_matches_known_values() {
        // mean 5, population std 2
        let train = split_from(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], (1, 2, 2, 2));
        let stats = NormStats::from_features(&train.features).unwrap();
        assert!((stats.mean - 5.0).abs() < 1e-6);
        assert!((stats.std - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_variance_is_rejected() {
        let train = split_from(vec![3.5; 2 * 7 * 2 * 2], (2, 7, 2, 2));
        let err = NormStats::from_features(&train.features).unwrap_err();
        assert!(matches!(
            err,
            RasterDatasetError::DegenerateStatistics { std, .. } if std == 0.0
        ));
    }

    #[test]
    fn empty_tensor_is_rejected() {
        let features = Array4::<f32>::zeros((0, 7, 64, 64));
        assert!(NormStats::from_features(&features).is_err());
    }
}
