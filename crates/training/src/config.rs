//! Experiment configuration.
//!
//! Every path, shard count, hyperparameter, and architecture constant lives
//! here. Defaults reproduce the Oregon → Washington experiment; a TOML file
//! can override any subset of fields.

use std::path::{Path, PathBuf};

use burn::optim::RmsPropConfig;
use models::PopDensityCnnConfig;
use raster_dataset::ShardSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "popdensity.toml";
pub const CONFIG_ENV_VAR: &str = "POPDENSITY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub data: DataConfig,
    pub model: PopDensityCnnConfig,
    pub train: TrainConfig,
    pub artifacts: ArtifactConfig,
    pub plot: PlotConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub features_stem: String,
    pub labels_stem: String,
    /// Array name inside every shard archive.
    pub dataset_name: String,
    pub train: RegionConfig,
    pub test: RegionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region: String,
    pub shards: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("keras_data"),
            prefix: "db".to_string(),
            features_stem: "X".to_string(),
            labels_stem: "y".to_string(),
            dataset_name: "data".to_string(),
            train: RegionConfig {
                region: "Oregon".to_string(),
                shards: 35,
            },
            test: RegionConfig {
                region: "Washington".to_string(),
                shards: 26,
            },
        }
    }
}

impl DataConfig {
    pub fn shard_spec(&self, region: &RegionConfig) -> ShardSpec {
        ShardSpec {
            dir: self.dir.clone(),
            prefix: self.prefix.clone(),
            region: region.region.clone(),
            count: region.shards,
            features_stem: self.features_stem.clone(),
            labels_stem: self.labels_stem.clone(),
            dataset_name: self.dataset_name.clone(),
        }
    }

    pub fn train_spec(&self) -> ShardSpec {
        self.shard_spec(&self.train)
    }

    pub fn test_spec(&self) -> ShardSpec {
        self.shard_spec(&self.test)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    /// Fraction of the training split held out (from the tail) for validation.
    pub validation_split: f64,
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping.
    pub patience: usize,
    pub min_delta: f32,
    pub shuffle: bool,
    pub seed: u64,
    /// Best-so-far weights, rewritten whenever validation loss improves.
    pub checkpoint_path: PathBuf,
    /// Reload the best checkpoint once training ends instead of keeping the
    /// last epoch's weights.
    pub restore_best: bool,
    /// Optional JSONL file receiving one line per epoch.
    pub metrics_out: Option<PathBuf>,
    pub optimizer: OptimizerConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            validation_split: 0.15,
            max_epochs: 10,
            patience: 5,
            min_delta: 0.0,
            shuffle: true,
            seed: 42,
            checkpoint_path: PathBuf::from("/tmp/weights.bin"),
            restore_best: false,
            metrics_out: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// RMSprop settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub rho: f32,
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            rho: 0.9,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerConfig {
    pub fn rmsprop(&self) -> RmsPropConfig {
        RmsPropConfig::new()
            .with_alpha(self.rho)
            .with_epsilon(self.epsilon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Final weights, always overwritten.
    pub weights_path: PathBuf,
    /// Where to write the topology JSON. Unset by default: the topology is
    /// computed and logged but not saved.
    pub topology_path: Option<PathBuf>,
    /// SVG block diagram of the layer stack.
    pub architecture_path: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("model_weights.bin"),
            topology_path: None,
            architecture_path: PathBuf::from("model_architecture.svg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub scatter_path: PathBuf,
    pub loss_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            scatter_path: PathBuf::from("scatter.svg"),
            loss_path: PathBuf::from("loss.svg"),
            width: 800,
            height: 600,
        }
    }
}

impl ExperimentConfig {
    /// Resolve configuration: an explicit path, then `$POPDENSITY_CONFIG`,
    /// then `popdensity.toml` in the working directory, then defaults.
    ///
    /// Explicitly named files must exist; the implicit default file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Self::from_path(Path::new(&path));
            }
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
