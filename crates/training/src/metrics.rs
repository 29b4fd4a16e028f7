//! Held-out loss, predictions, and RMSE.
//!
//! The tensor helpers take any backend. Pass a `valid()` model so dropout is
//! disabled.

use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use models::PopDensityCnn;
use raster_dataset::{FeatureTensor, LabelVector, LabeledSplit};
use serde::Serialize;
use thiserror::Error;

use crate::dataset::{features_batch, labels_batch};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("{predicted} predictions but {actual} targets")]
    LengthMismatch { predicted: usize, actual: usize },
    #[error("cannot compute a metric over zero samples")]
    Empty,
    #[error("tensor data conversion failed: {0}")]
    Tensor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalReport {
    /// Mean squared error over the test split.
    pub test_loss: f32,
    pub rmse: f32,
    pub samples: usize,
}

/// `sqrt(mean((predicted - actual)^2))`.
pub fn rmse(predicted: &[f32], actual: &[f32]) -> Result<f32, MetricsError> {
    if predicted.len() != actual.len() {
        return Err(MetricsError::LengthMismatch {
            predicted: predicted.len(),
            actual: actual.len(),
        });
    }
    if predicted.is_empty() {
        return Err(MetricsError::Empty);
    }
    let sum_sq: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(&p, &a)| {
            let d = p as f64 - a as f64;
            d * d
        })
        .sum();
    Ok((sum_sq / predicted.len() as f64).sqrt() as f32)
}

fn values(data: TensorData) -> Result<Vec<f32>, MetricsError> {
    data.to_vec::<f32>()
        .map_err(|e| MetricsError::Tensor(format!("{e:?}")))
}

/// First element of a loss tensor as `f32`; NaN if the tensor is empty.
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32, MetricsError> {
    Ok(values(tensor.into_data())?
        .into_iter()
        .next()
        .unwrap_or(f32::NAN))
}

/// Sample-weighted mean MSE over `indices`, evaluated in batches.
pub fn loss_over<B: Backend>(
    model: &PopDensityCnn<B>,
    features: &FeatureTensor,
    labels: &LabelVector,
    indices: &[usize],
    batch_size: usize,
    device: &B::Device,
) -> Result<f32, MetricsError> {
    if indices.is_empty() {
        return Ok(f32::NAN);
    }
    let mse = MseLoss::new();
    let mut weighted = 0.0f64;
    for batch in indices.chunks(batch_size.max(1)) {
        let x = features_batch::<B>(features, batch, device);
        let y = labels_batch::<B>(labels, batch, device);
        let loss = mse.forward(model.forward(x), y, Reduction::Mean);
        weighted += scalar(loss)? as f64 * batch.len() as f64;
    }
    Ok((weighted / indices.len() as f64) as f32)
}

/// Held-out loss over the whole split.
pub fn evaluate_loss<B: Backend>(
    model: &PopDensityCnn<B>,
    split: &LabeledSplit,
    batch_size: usize,
    device: &B::Device,
) -> Result<f32, MetricsError> {
    let indices: Vec<usize> = (0..split.len()).collect();
    loss_over(model, &split.features, &split.labels, &indices, batch_size, device)
}

/// One prediction per sample, in sample order.
pub fn predict<B: Backend>(
    model: &PopDensityCnn<B>,
    features: &FeatureTensor,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>, MetricsError> {
    let n = features.len_of(ndarray::Axis(0));
    let indices: Vec<usize> = (0..n).collect();
    let mut out = Vec::with_capacity(n);
    for batch in indices.chunks(batch_size.max(1)) {
        let x = features_batch::<B>(features, batch, device);
        let preds = model.forward(x);
        out.extend(values(preds.into_data())?);
    }
    Ok(out)
}

/// Test loss, predictions, and RMSE for a trained model.
pub fn evaluate<B: Backend>(
    model: &PopDensityCnn<B>,
    split: &LabeledSplit,
    batch_size: usize,
    device: &B::Device,
) -> Result<(EvalReport, Vec<f32>), MetricsError> {
    let test_loss = evaluate_loss(model, split, batch_size, device)?;
    let predicted = predict(model, &split.features, batch_size, device)?;
    let actual = split.labels.to_vec();
    let rmse = rmse(&predicted, &actual)?;
    Ok((
        EvalReport {
            test_loss,
            rmse,
            samples: split.len(),
        },
        predicted,
    ))
}
