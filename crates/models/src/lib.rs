//! Burn models for population density regression.
//!
//! `PopDensityCnn` is a plain feed-forward network: convolutional blocks
//! (conv → optional max-pool → ReLU → dropout), a flatten, dense blocks
//! (linear → ReLU → dropout) and a single linear output unit.
//!
//! Shapes:
//! - Input patches: `[B, C, H, W]` (7 × 64 × 64 by default)
//! - Output: `[B, 1]`, unconstrained

pub mod topology;

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use topology::{LayerKind, LayerSpec, ModelTopology};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelConfigError {
    #[error("conv block {block}: kernel/pool {window} does not fit a {height}x{width} feature map")]
    SpatialCollapse {
        block: usize,
        window: usize,
        height: usize,
        width: usize,
    },
    #[error("input must have at least one channel")]
    NoChannels,
}

/// One convolutional block; stride 1, valid padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBlockConfig {
    pub filters: usize,
    pub kernel: usize,
    /// Square max-pool window (stride equals the window).
    pub pool: Option<usize>,
}

impl ConvBlockConfig {
    pub const fn new(filters: usize, kernel: usize, pool: Option<usize>) -> Self {
        Self {
            filters,
            kernel,
            pool,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopDensityCnnConfig {
    pub in_channels: usize,
    /// Patch `[height, width]`.
    pub input_size: [usize; 2],
    pub conv_blocks: Vec<ConvBlockConfig>,
    pub dense_widths: Vec<usize>,
    pub dropout: f64,
}

impl Default for PopDensityCnnConfig {
    fn default() -> Self {
        Self {
            in_channels: 7,
            input_size: [64, 64],
            conv_blocks: vec![
                ConvBlockConfig::new(256, 5, None),
                ConvBlockConfig::new(64, 3, Some(3)),
                ConvBlockConfig::new(128, 5, Some(2)),
                ConvBlockConfig::new(64, 3, Some(3)),
            ],
            dense_widths: vec![128, 64],
            dropout: 0.3,
        }
    }
}

impl PopDensityCnnConfig {
    /// Output `[channels, height, width]` of the last conv block.
    pub fn feature_map_shape(&self) -> Result<[usize; 3], ModelConfigError> {
        if self.in_channels == 0 {
            return Err(ModelConfigError::NoChannels);
        }
        let [mut h, mut w] = self.input_size;
        let mut channels = self.in_channels;
        for (block, cfg) in self.conv_blocks.iter().enumerate() {
            (h, w) = shrink(block, cfg.kernel, h, w, |n, k| n - k + 1)?;
            if let Some(pool) = cfg.pool {
                (h, w) = shrink(block, pool, h, w, |n, k| n / k)?;
            }
            channels = cfg.filters;
        }
        Ok([channels, h, w])
    }

    /// Width of the flattened feature vector fed to the first dense block.
    pub fn flattened_dim(&self) -> Result<usize, ModelConfigError> {
        let [c, h, w] = self.feature_map_shape()?;
        Ok(c * h * w)
    }
}

fn shrink(
    block: usize,
    window: usize,
    h: usize,
    w: usize,
    op: impl Fn(usize, usize) -> usize,
) -> Result<(usize, usize), ModelConfigError> {
    if window == 0 || window > h || window > w {
        return Err(ModelConfigError::SpatialCollapse {
            block,
            window,
            height: h,
            width: w,
        });
    }
    Ok((op(h, window), op(w, window)))
}

#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: Option<MaxPool2d>,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, cfg: &ConvBlockConfig, dropout: f64, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, cfg.filters], [cfg.kernel, cfg.kernel])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let pool = cfg
            .pool
            .map(|p| MaxPool2dConfig::new([p, p]).with_strides([p, p]).init());
        Self {
            conv,
            pool,
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.conv.forward(input);
        if let Some(pool) = &self.pool {
            x = pool.forward(x);
        }
        self.dropout.forward(relu(x))
    }
}

#[derive(Debug, Module)]
pub struct DenseBlock<B: Backend> {
    linear: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.dropout.forward(relu(self.linear.forward(input)))
    }
}

/// Convolutional regressor from raster patches to a scalar density.
///
/// Dropout only fires on autodiff backends; call `valid()` on a trained
/// model before evaluation.
#[derive(Debug, Module)]
pub struct PopDensityCnn<B: Backend> {
    conv_blocks: Vec<ConvBlock<B>>,
    dense_blocks: Vec<DenseBlock<B>>,
    output: Linear<B>,
    config: Ignored<PopDensityCnnConfig>,
}

impl<B: Backend> PopDensityCnn<B> {
    /// Build a freshly initialized model. Fails if the configured blocks do
    /// not fit the input size.
    pub fn new(config: PopDensityCnnConfig, device: &B::Device) -> Result<Self, ModelConfigError> {
        let flattened = config.flattened_dim()?;

        let mut channels = config.in_channels;
        let mut conv_blocks = Vec::with_capacity(config.conv_blocks.len());
        for block in &config.conv_blocks {
            conv_blocks.push(ConvBlock::new(channels, block, config.dropout, device));
            channels = block.filters;
        }

        let mut width = flattened;
        let mut dense_blocks = Vec::with_capacity(config.dense_widths.len());
        for &units in &config.dense_widths {
            dense_blocks.push(DenseBlock {
                linear: LinearConfig::new(width, units).init(device),
                dropout: DropoutConfig::new(config.dropout).init(),
            });
            width = units;
        }
        let output = LinearConfig::new(width, 1).init(device);

        Ok(Self {
            conv_blocks,
            dense_blocks,
            output,
            config: Ignored(config),
        })
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for block in &self.conv_blocks {
            x = block.forward(x);
        }
        let mut x: Tensor<B, 2> = x.flatten(1, 3);
        for block in &self.dense_blocks {
            x = block.forward(x);
        }
        self.output.forward(x)
    }

    pub fn config(&self) -> &PopDensityCnnConfig {
        &self.config.0
    }

    /// Layer-by-layer description of this model.
    pub fn topology(&self) -> Result<ModelTopology, ModelConfigError> {
        ModelTopology::from_config(&self.config.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_collapses_to_one_pixel() {
        let cfg = PopDensityCnnConfig::default();
        assert_eq!(cfg.feature_map_shape().unwrap(), [64, 1, 1]);
        assert_eq!(cfg.flattened_dim().unwrap(), 64);
    }

    #[test]
    fn oversized_kernel_is_rejected() {
        let cfg = PopDensityCnnConfig {
            input_size: [8, 8],
            ..Default::default()
        };
        assert!(matches!(
            cfg.feature_map_shape(),
            Err(ModelConfigError::SpatialCollapse { block: 1, .. })
        ));
    }
}
