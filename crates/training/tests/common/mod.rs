#![allow(dead_code)]

use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array4};
use ndarray_npy::NpzWriter;
use raster_dataset::{shard_path, LabeledSplit, ShardKind, ShardSpec};
use training::config::{DataConfig, RegionConfig};
use training::{ExperimentConfig, PopDensityCnnConfig};

pub const CHANNELS: usize = 2;
pub const SIZE: usize = 8;

pub fn tiny_model() -> PopDensityCnnConfig {
    PopDensityCnnConfig {
        in_channels: CHANNELS,
        input_size: [SIZE, SIZE],
        conv_blocks: vec![models::ConvBlockConfig::new(4, 3, Some(2))],
        dense_widths: vec![8],
        dropout: 0.1,
    }
}

/// Deterministic patches whose label is a smooth function of the pixels.
pub fn synthetic_split(samples: usize, offset: usize) -> LabeledSplit {
    let features = Array4::from_shape_fn((samples, CHANNELS, SIZE, SIZE), |(i, c, y, x)| {
        let s = (i + offset) as f32;
        ((s * 0.7 + c as f32 * 1.3 + y as f32 * 0.2 + x as f32 * 0.1).sin() + 1.0) * 50.0
    });
    let labels = Array1::from_shape_fn(samples, |i| {
        let s = (i + offset) as f32;
        (s * 0.7).sin() * 10.0 + 20.0
    });
    LabeledSplit::new(features, labels).expect("aligned split")
}

fn write_npz<D: ndarray::Dimension>(path: &Path, array: &ndarray::Array<f32, D>) {
    let mut npz = NpzWriter::new(File::create(path).expect("create shard"));
    npz.add_array("data", array).expect("write array");
    npz.finish().expect("finish npz");
}

/// Write `split` as `shards` roughly equal shard pairs.
pub fn write_shards(spec: &ShardSpec, split: &LabeledSplit) {
    let n = split.len();
    let per = n.div_ceil(spec.count);
    for k in 0..spec.count {
        let lo = (k * per).min(n);
        let hi = ((k + 1) * per).min(n);
        let x = split.features.slice(ndarray::s![lo..hi, .., .., ..]).to_owned();
        let y = split.labels.slice(ndarray::s![lo..hi]).to_owned();
        write_npz(&shard_path(spec, ShardKind::Features, k), &x);
        write_npz(&shard_path(spec, ShardKind::Labels, k), &y);
    }
}

/// A complete experiment rooted in `root`, with shards already on disk.
pub fn experiment_in(root: &Path) -> ExperimentConfig {
    let mut cfg = ExperimentConfig {
        data: DataConfig {
            dir: root.join("data"),
            train: RegionConfig {
                region: "Oregon".into(),
                shards: 3,
            },
            test: RegionConfig {
                region: "Washington".into(),
                shards: 2,
            },
            ..Default::default()
        },
        model: tiny_model(),
        ..Default::default()
    };
    cfg.train.batch_size = 8;
    cfg.train.max_epochs = 3;
    cfg.train.checkpoint_path = root.join("ckpt/weights.bin");
    cfg.artifacts.weights_path = root.join("out/model_weights.bin");
    cfg.artifacts.architecture_path = root.join("out/model_architecture.svg");
    cfg.plot.scatter_path = root.join("out/scatter.svg");
    cfg.plot.loss_path = root.join("out/loss.svg");
    cfg.plot.width = 320;
    cfg.plot.height = 240;

    std::fs::create_dir_all(&cfg.data.dir).expect("data dir");
    write_shards(&cfg.data.train_spec(), &synthetic_split(40, 0));
    write_shards(&cfg.data.test_spec(), &synthetic_split(12, 1000));
    cfg
}
