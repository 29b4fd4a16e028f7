//! Model topology and weight files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::Backend;
use models::{ModelTopology, PopDensityCnn, PopDensityCnnConfig};

pub type WeightsRecorder = BinFileRecorder<FullPrecisionSettings>;

/// Path the recorder actually writes for `path` (the recorder sets its own extension).
pub fn weights_file(path: &Path) -> PathBuf {
    path.with_extension("bin")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Pretty JSON topology description, overwriting any existing file.
pub fn write_topology(path: &Path, topology: &ModelTopology) -> Result<()> {
    ensure_parent(path)?;
    let json = topology.to_json_pretty()?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Full-precision binary weights, overwriting any existing file.
pub fn write_weights<B: Backend>(path: &Path, model: &PopDensityCnn<B>) -> Result<PathBuf> {
    ensure_parent(path)?;
    let recorder = WeightsRecorder::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save weights to {}: {e}", path.display()))?;
    Ok(weights_file(path))
}

/// Rebuild a model from `config` and load weights saved by [`write_weights`].
pub fn load_popdensity_from_checkpoint<B: Backend, P: AsRef<Path>>(
    path: P,
    config: PopDensityCnnConfig,
    device: &B::Device,
) -> Result<PopDensityCnn<B>> {
    let model = PopDensityCnn::<B>::new(config, device)?;
    load_into(model, path.as_ref(), device)
        .map_err(|e| anyhow::anyhow!("failed to load weights {}: {e}", path.as_ref().display()))
}

pub(crate) fn load_into<B: Backend>(
    model: PopDensityCnn<B>,
    path: &Path,
    device: &B::Device,
) -> Result<PopDensityCnn<B>, RecorderError> {
    let recorder = WeightsRecorder::new();
    model.load_file(path, &recorder, device)
}
