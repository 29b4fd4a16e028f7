//! Core types and error definitions for raster_dataset.

use ndarray::{Array1, Array4, Axis};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, RasterDatasetError>;

/// Raster patches in `(sample, channel, height, width)` layout.
pub type FeatureTensor = Array4<f32>;

/// Population density targets, index-aligned with [`FeatureTensor`] samples.
pub type LabelVector = Array1<f32>;

#[derive(Debug, Error)]
pub enum RasterDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("npz read error at {path}: {source}")]
    Npz {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpzError,
    },
    #[error("array `{name}` not found in {path} (entries: {entries:?})")]
    MissingArray {
        path: PathBuf,
        name: String,
        entries: Vec<String>,
    },
    #[error("cannot concatenate {what} shards: {source}")]
    Shape {
        what: &'static str,
        #[source]
        source: ndarray::ShapeError,
    },
    #[error("{features} feature samples but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
    #[error("shard set for region `{region}` is empty")]
    EmptyShardSet { region: String },
    #[error("degenerate normalization statistics (mean={mean}, std={std})")]
    DegenerateStatistics { mean: f64, std: f64 },
}

/// Features and labels for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSplit {
    pub features: FeatureTensor,
    pub labels: LabelVector,
}

impl LabeledSplit {
    pub fn new(features: FeatureTensor, labels: LabelVector) -> DatasetResult<Self> {
        let n_features = features.len_of(Axis(0));
        if n_features != labels.len() {
            return Err(RasterDatasetError::LengthMismatch {
                features: n_features,
                labels: labels.len(),
            });
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Per-sample shape as `[channels, height, width]`.
    pub fn sample_shape(&self) -> [usize; 3] {
        let (_, c, h, w) = self.features.dim();
        [c, h, w]
    }
}
