use std::path::PathBuf;

use clap::Parser;
use training::artifacts::load_popdensity_from_checkpoint;
use training::util::{evaluate_and_plot, init_tracing, load_normalized};
use training::{ExperimentConfig, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate saved population density weights on the held-out region (test loss + RMSE)"
)]
struct Args {
    /// Weights written by `train` (final weights or the best checkpoint).
    #[arg(long)]
    weights: PathBuf,
    /// TOML config used for training (same lookup order as `train`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding the shard archives.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Scatter plot output (defaults to the configured path).
    #[arg(long)]
    scatter_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = ExperimentConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        cfg.data.dir = dir;
    }
    if let Some(path) = args.scatter_out {
        cfg.plot.scatter_path = path;
    }

    // Test features must be normalized with the training statistics.
    let (_, test, stats) = load_normalized(&cfg)?;
    tracing::info!(mean = stats.mean, std = stats.std, "normalization statistics");

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let model = load_popdensity_from_checkpoint::<TrainBackend, _>(
        &args.weights,
        cfg.model.clone(),
        &device,
    )?;
    let report = evaluate_and_plot(&model, &test, &cfg, &device)?;
    println!(
        "Eval complete: test_loss={:.4}, rmse={:.4} (samples={})",
        report.test_loss, report.rmse, report.samples
    );
    Ok(())
}
