//! Sharded raster-patch datasets for population density regression.
//!
//! This crate provides:
//! - Loading numbered NPZ shards and concatenating them per region
//! - Mean/std normalization fitted on the training region only
//!
//! Tensors stay on the host as `ndarray` arrays; the `training` crate turns
//! index batches into Burn tensors.

pub mod normalize;
pub mod shards;
pub mod types;

pub use normalize::{normalize_splits, NormStats};
pub use shards::{load_shards, shard_path, ShardKind, ShardSpec};
pub use types::*;
