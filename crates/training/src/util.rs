use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use clap::Parser;
use models::PopDensityCnn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use raster_dataset::{load_shards, normalize_splits, LabeledSplit, NormStats};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::artifacts::{load_into, write_topology, write_weights};
use crate::config::{ExperimentConfig, TrainConfig};
use crate::dataset::{features_batch, labels_batch, validation_split};
use crate::early_stop::{EarlyStopping, EpochVerdict};
use crate::history::{EpochRecord, TrainingHistory};
use crate::metrics::{self, EvalReport};
use crate::plot::{render_architecture, render_loss_curve, render_scatter};
use crate::{ADBackend, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train the population density CNN and evaluate it on the held-out region"
)]
pub struct TrainArgs {
    /// TOML config (falls back to $POPDENSITY_CONFIG, then ./popdensity.toml, then defaults).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding the shard archives.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Maximum number of epochs.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Shuffle seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Best-weights checkpoint path.
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
    /// Final weights path.
    #[arg(long)]
    pub weights_out: Option<PathBuf>,
}

impl TrainArgs {
    /// Resolve the config file and apply command-line overrides.
    pub fn resolve_config(&self) -> anyhow::Result<ExperimentConfig> {
        let mut cfg = ExperimentConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            cfg.data.dir = dir.clone();
        }
        if let Some(epochs) = self.epochs {
            cfg.train.max_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.train.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            cfg.train.seed = seed;
        }
        if let Some(path) = &self.checkpoint_out {
            cfg.train.checkpoint_path = path.clone();
        }
        if let Some(path) = &self.weights_out {
            cfg.artifacts.weights_path = path.clone();
        }
        Ok(cfg)
    }
}

/// Install the global `tracing` subscriber (`RUST_LOG` overrides the `info` default).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let cfg = args.resolve_config()?;
    run_experiment(&cfg)?;
    Ok(())
}

/// Output of [`train_model`].
pub struct TrainOutcome<B: AutodiffBackend> {
    pub model: PopDensityCnn<B>,
    pub history: TrainingHistory,
    pub best_val_loss: Option<f32>,
    /// 1-based epoch whose weights are in the checkpoint.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

/// Fit `model` on `data` with a tail validation split, checkpointing on every
/// validation improvement and stopping once patience runs out.
pub fn train_model<B: AutodiffBackend>(
    mut model: PopDensityCnn<B>,
    data: &LabeledSplit,
    cfg: &TrainConfig,
    device: &B::Device,
) -> anyhow::Result<TrainOutcome<B>> {
    let split = validation_split(data.len(), cfg.validation_split);
    if split.train.is_empty() {
        bail!(
            "no training samples left after holding out {:.0}% of {} for validation",
            cfg.validation_split * 100.0,
            data.len()
        );
    }
    if split.val.is_empty() {
        warn!(
            samples = data.len(),
            "validation split is empty; early stopping will monitor training loss"
        );
    }
    info!(
        train = split.train.len(),
        val = split.val.len(),
        batch_size = cfg.batch_size,
        max_epochs = cfg.max_epochs,
        "starting training"
    );

    if let Some(parent) = cfg.checkpoint_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let batch_size = cfg.batch_size.max(1);
    let mut optim = cfg.optimizer.rmsprop().init();
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut stopper = EarlyStopping::new(cfg.patience, cfg.min_delta);
    let mut history = TrainingHistory::default();
    let mut best_epoch = None;
    let mut stopped_early = false;
    let mse = MseLoss::new();

    for epoch in 1..=cfg.max_epochs {
        let mut order = split.train.clone();
        if cfg.shuffle {
            order.shuffle(&mut rng);
        }

        let mut weighted = 0.0f64;
        for batch in order.chunks(batch_size) {
            let x = features_batch::<B>(&data.features, batch, device);
            let y = labels_batch::<B>(&data.labels, batch, device);
            let loss = mse.forward(model.forward(x), y, Reduction::Mean);
            let loss_val = metrics::scalar(loss.clone().detach())?;
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.optimizer.learning_rate, model, grads);
            weighted += loss_val as f64 * batch.len() as f64;
        }
        let train_loss = (weighted / split.train.len() as f64) as f32;

        let val_loss = if split.val.is_empty() {
            train_loss
        } else {
            let valid = model.valid();
            metrics::loss_over(
                &valid,
                &data.features,
                &data.labels,
                &split.val,
                batch_size,
                device,
            )?
        };

        if !train_loss.is_finite() || !val_loss.is_finite() {
            bail!(
                "training diverged at epoch {epoch}: train_loss={train_loss}, val_loss={val_loss}"
            );
        }

        let verdict = stopper.update(val_loss);
        let improved = verdict == EpochVerdict::Improved;
        if improved {
            write_weights(&cfg.checkpoint_path, &model)
                .context("failed to save checkpoint")?;
            best_epoch = Some(epoch);
        }
        let record = EpochRecord {
            epoch,
            train_loss,
            val_loss,
        };
        history.push(record);
        info!(
            epoch,
            train_loss,
            val_loss,
            checkpoint = improved,
            "epoch complete"
        );
        if let Some(path) = &cfg.metrics_out {
            append_metrics_line(path, &record)?;
        }

        if verdict == EpochVerdict::Stop {
            info!(
                patience = cfg.patience,
                best = stopper.best().unwrap_or(f32::NAN),
                "early stopping: no validation improvement"
            );
            stopped_early = true;
            break;
        }
    }

    if cfg.restore_best && best_epoch.is_some() {
        model = load_into(model, &cfg.checkpoint_path, device).map_err(|e| {
            anyhow::anyhow!(
                "failed to restore checkpoint {}: {e}",
                cfg.checkpoint_path.display()
            )
        })?;
        debug!(epoch = ?best_epoch, "restored best checkpoint");
    }

    Ok(TrainOutcome {
        model,
        history,
        best_val_loss: stopper.best(),
        best_epoch,
        stopped_early,
    })
}

fn append_metrics_line(path: &Path, record: &EpochRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(f, "{}", serde_json::to_string(record)?)?;
    Ok(())
}

/// Load both regions and normalize them with training statistics.
pub fn load_normalized(
    cfg: &ExperimentConfig,
) -> anyhow::Result<(LabeledSplit, LabeledSplit, NormStats)> {
    info!(dir = %cfg.data.dir.display(), "reading data");
    let train = load_shards(&cfg.data.train_spec()).context("failed to load training shards")?;
    let test = load_shards(&cfg.data.test_spec()).context("failed to load test shards")?;
    Ok(normalize_splits(train, test)?)
}

/// Summary of a full [`run_experiment`] call.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub stats: NormStats,
    pub history: TrainingHistory,
    pub eval: EvalReport,
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
    pub checkpoint_path: PathBuf,
    pub weights_path: PathBuf,
    pub topology_path: Option<PathBuf>,
    pub architecture_path: PathBuf,
}

/// Load → normalize → build → train → evaluate → plot → write artifacts.
pub fn run_experiment(cfg: &ExperimentConfig) -> anyhow::Result<ExperimentReport> {
    let (train, test, stats) = load_normalized(cfg)?;
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();

    info!("creating the model");
    let model = PopDensityCnn::<ADBackend>::new(cfg.model.clone(), &device)?;
    let topology = model.topology()?;
    debug!(topology = %topology.to_json_pretty()?, "model topology");
    render_architecture(
        &cfg.artifacts.architecture_path,
        &topology,
        (cfg.plot.width, cfg.plot.height),
    )
    .context("failed to render architecture diagram")?;
    info!(path = %cfg.artifacts.architecture_path.display(), "wrote architecture diagram");

    let outcome = train_model(model, &train, &cfg.train, &device)?;

    info!("evaluating");
    let model = outcome.model.valid();
    let eval = evaluate_and_plot(&model, &test, cfg, &device)?;
    render_loss_curve(
        &cfg.plot.loss_path,
        &outcome.history,
        (cfg.plot.width, cfg.plot.height),
    )
    .context("failed to render loss curve")?;

    info!(
        loss = ?outcome.history.train_losses(),
        val_loss = ?outcome.history.val_losses(),
        "training history"
    );

    let topology_path = match &cfg.artifacts.topology_path {
        Some(path) => {
            write_topology(path, &topology)?;
            info!(path = %path.display(), "wrote model topology");
            Some(path.clone())
        }
        None => {
            warn!("model topology computed but not saved (set artifacts.topology_path to write it)");
            None
        }
    };
    let weights_path = write_weights(&cfg.artifacts.weights_path, &model)?;
    info!(path = %weights_path.display(), "saved model weights");

    Ok(ExperimentReport {
        stats,
        history: outcome.history,
        eval,
        best_epoch: outcome.best_epoch,
        stopped_early: outcome.stopped_early,
        checkpoint_path: crate::artifacts::weights_file(&cfg.train.checkpoint_path),
        weights_path,
        topology_path,
        architecture_path: cfg.artifacts.architecture_path.clone(),
    })
}

/// Test loss + RMSE, logged, with the actual-vs-predicted scatter written to disk.
pub fn evaluate_and_plot(
    model: &PopDensityCnn<TrainBackend>,
    test: &LabeledSplit,
    cfg: &ExperimentConfig,
    device: &<TrainBackend as burn::tensor::backend::Backend>::Device,
) -> anyhow::Result<EvalReport> {
    let (report, predicted) = metrics::evaluate(model, test, cfg.train.batch_size, device)?;
    info!(
        test_loss = report.test_loss,
        rmse = report.rmse,
        samples = report.samples,
        "evaluation complete"
    );
    render_scatter(
        &cfg.plot.scatter_path,
        &test.labels.to_vec(),
        &predicted,
        (cfg.plot.width, cfg.plot.height),
    )
    .context("failed to render scatter plot")?;
    Ok(report)
}
