//! Numbered shard loading.
//!
//! A region is stored as `count` feature shards and `count` label shards named
//! `{prefix}_{region}_{stem}_{index}.npz`, each holding one named array.

use crate::types::{DatasetResult, LabeledSplit, RasterDatasetError};
use ndarray::{Array, Array1, Array4, Axis, Dimension};
use ndarray_npy::NpzReader;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Location and naming of one region's shard set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub dir: PathBuf,
    pub prefix: String,
    pub region: String,
    pub count: usize,
    pub features_stem: String,
    pub labels_stem: String,
    /// Name of the array inside each archive.
    pub dataset_name: String,
}

impl ShardSpec {
    pub fn new(dir: impl Into<PathBuf>, region: impl Into<String>, count: usize) -> Self {
        Self {
            dir: dir.into(),
            prefix: "db".to_string(),
            region: region.into(),
            count,
            features_stem: "X".to_string(),
            labels_stem: "y".to_string(),
            dataset_name: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    Features,
    Labels,
}

/// Path of shard `index` for the given kind.
pub fn shard_path(spec: &ShardSpec, kind: ShardKind, index: usize) -> PathBuf {
    let stem = match kind {
        ShardKind::Features => &spec.features_stem,
        ShardKind::Labels => &spec.labels_stem,
    };
    spec.dir.join(format!(
        "{}_{}_{}_{}.npz",
        spec.prefix, spec.region, stem, index
    ))
}

/// Load shards `0..spec.count` in order and concatenate them along the sample axis.
///
/// Any missing or malformed shard aborts the whole load.
pub fn load_shards(spec: &ShardSpec) -> DatasetResult<LabeledSplit> {
    if spec.count == 0 {
        return Err(RasterDatasetError::EmptyShardSet {
            region: spec.region.clone(),
        });
    }

    let mut features: Vec<Array4<f32>> = Vec::with_capacity(spec.count);
    let mut labels: Vec<Array1<f32>> = Vec::with_capacity(spec.count);
    for index in 0..spec.count {
        let x_path = shard_path(spec, ShardKind::Features, index);
        let x: Array4<f32> = read_named_array(&x_path, &spec.dataset_name)?;
        let y_path = shard_path(spec, ShardKind::Labels, index);
        let y: Array1<f32> = read_named_array(&y_path, &spec.dataset_name)?;
        debug!(
            region = %spec.region,
            shard = index,
            samples = x.len_of(Axis(0)),
            labels = y.len(),
            "loaded shard"
        );
        features.push(x);
        labels.push(y);
    }

    let views: Vec<_> = features.iter().map(|a| a.view()).collect();
    let features = ndarray::concatenate(Axis(0), &views).map_err(|source| {
        RasterDatasetError::Shape {
            what: "feature",
            source,
        }
    })?;
    let views: Vec<_> = labels.iter().map(|a| a.view()).collect();
    let labels = ndarray::concatenate(Axis(0), &views).map_err(|source| {
        RasterDatasetError::Shape {
            what: "label",
            source,
        }
    })?;

    let split = LabeledSplit::new(features, labels)?;
    info!(
        region = %spec.region,
        shards = spec.count,
        samples = split.len(),
        shape = ?split.sample_shape(),
        "loaded shard set"
    );
    Ok(split)
}

/// Read the array called `name` (with or without a `.npy` suffix) from an NPZ archive.
///
/// The file handle lives only for the duration of this call.
fn read_named_array<D: Dimension>(path: &Path, name: &str) -> DatasetResult<Array<f32, D>> {
    let npz_err = |source| RasterDatasetError::Npz {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| RasterDatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut npz = NpzReader::new(file).map_err(npz_err)?;
    let entries = npz.names().map_err(npz_err)?;
    let entry = entries
        .iter()
        .find(|e| e.as_str() == name || e.strip_suffix(".npy") == Some(name))
        .cloned()
        .ok_or_else(|| RasterDatasetError::MissingArray {
            path: path.to_path_buf(),
            name: name.to_string(),
            entries: entries.clone(),
        })?;
    npz.by_name(&entry).map_err(npz_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_names_follow_region_pattern() {
        let spec = ShardSpec::new("keras_data", "Oregon", 35);
        assert_eq!(
            shard_path(&spec, ShardKind::Features, 0),
            PathBuf::from("keras_data/db_Oregon_X_0.npz")
        );
        assert_eq!(
            shard_path(&spec, ShardKind::Labels, 34),
            PathBuf::from("keras_data/db_Oregon_y_34.npz")
        );
    }

    #[test]
    fn empty_shard_set_is_rejected() {
        let spec = ShardSpec::new("keras_data", "Washington", 0);
        assert!(matches!(
            load_shards(&spec),
            Err(RasterDatasetError::EmptyShardSet { .. })
        ));
    }
}
