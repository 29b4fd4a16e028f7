use ndarray::{Array1, Array4};
use ndarray_npy::NpzWriter;
use raster_dataset::{load_shards, shard_path, RasterDatasetError, ShardKind, ShardSpec};
use std::fs::File;
use std::path::Path;

fn write_npz<D: ndarray::Dimension>(path: &Path, name: &str, array: &ndarray::Array<f32, D>) {
    let mut npz = NpzWriter::new(File::create(path).expect("create shard"));
    npz.add_array(name, array).expect("write array");
    npz.finish().expect("finish npz");
}

/// Writes `counts.len()` shards; every sample in shard `k` at position `i`
/// carries the value `k * 100 + i` in all pixels and as its label.
fn write_region(dir: &Path, region: &str, counts: &[usize]) -> ShardSpec {
    let spec = ShardSpec::new(dir, region, counts.len());
    for (k, &n) in counts.iter().enumerate() {
        let tag = |i: usize| (k * 100 + i) as f32;
        let features = Array4::from_shape_fn((n, 7, 4, 4), |(i, _, _, _)| tag(i));
        let labels = Array1::from_shape_fn(n, tag);
        write_npz(&shard_path(&spec, ShardKind::Features, k), "data", &features);
        write_npz(&shard_path(&spec, ShardKind::Labels, k), "data", &labels);
    }
    spec
}

#[test]
fn concatenation_preserves_shard_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let spec = write_region(dir.path(), "Oregon", &[3, 1, 2]);

    let split = load_shards(&spec)?;
    assert_eq!(split.len(), 6);
    assert_eq!(split.sample_shape(), [7, 4, 4]);
    let expected = [0.0, 1.0, 2.0, 100.0, 200.0, 201.0];
    assert_eq!(split.labels.to_vec(), expected);
    for (i, &tag) in expected.iter().enumerate() {
        assert_eq!(split.features[[i, 6, 3, 3]], tag);
    }
    Ok(())
}

#[test]
fn loading_twice_is_identical() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let spec = write_region(dir.path(), "Washington", &[2, 2]);

    let first = load_shards(&spec)?;
    let second = load_shards(&spec)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn missing_shard_aborts_the_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut spec = write_region(dir.path(), "Oregon", &[2, 2]);
    spec.count = 3;

    match load_shards(&spec) {
        Err(RasterDatasetError::Io { path, .. }) => {
            assert_eq!(path, shard_path(&spec, ShardKind::Features, 2));
        }
        other => panic!("expected io error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_dataset_name_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut spec = write_region(dir.path(), "Oregon", &[1]);
    spec.dataset_name = "patches".into();

    assert!(matches!(
        load_shards(&spec),
        Err(RasterDatasetError::MissingArray { .. })
    ));
    Ok(())
}

#[test]
fn label_count_must_match_samples() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let spec = write_region(dir.path(), "Oregon", &[2]);
    write_npz(
        &shard_path(&spec, ShardKind::Labels, 0),
        "data",
        &Array1::<f32>::zeros(5),
    );

    assert!(matches!(
        load_shards(&spec),
        Err(RasterDatasetError::LengthMismatch {
            features: 2,
            labels: 5
        })
    ));
    Ok(())
}

#[test]
fn mismatched_patch_shapes_fail_at_concatenation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let spec = write_region(dir.path(), "Oregon", &[1, 1]);
    write_npz(
        &shard_path(&spec, ShardKind::Features, 1),
        "data",
        &Array4::<f32>::zeros((1, 7, 8, 8)),
    );

    assert!(matches!(
        load_shards(&spec),
        Err(RasterDatasetError::Shape { .. })
    ));
    Ok(())
}
