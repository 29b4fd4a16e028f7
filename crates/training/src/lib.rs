#![recursion_limit = "256"]

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod early_stop;
pub mod history;
pub mod metrics;
pub mod plot;
pub mod util;

pub use config::{ExperimentConfig, TrainConfig};
pub use dataset::{features_batch, labels_batch, validation_split, SplitIndices};
pub use history::{EpochRecord, TrainingHistory};
pub use metrics::{rmse, EvalReport};
pub use models::{PopDensityCnn, PopDensityCnnConfig};
pub use util::{run_experiment, run_train, train_model, TrainArgs, TrainOutcome};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn::backend::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn::backend::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
