//! Serializable description of a [`PopDensityCnn`](crate::PopDensityCnn) layer stack.

use std::fmt;

use crate::{ModelConfigError, PopDensityCnnConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    Conv2d { filters: usize, kernel: [usize; 2] },
    MaxPool2d { pool: [usize; 2] },
    Activation { function: String },
    Dropout { rate: f64 },
    Flatten,
    Dense { units: usize },
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Conv2d { filters, kernel } => {
                write!(f, "Conv2D {filters} {}x{}", kernel[0], kernel[1])
            }
            LayerKind::MaxPool2d { pool } => write!(f, "MaxPool2D {}x{}", pool[0], pool[1]),
            LayerKind::Activation { function } => write!(f, "Activation {function}"),
            LayerKind::Dropout { rate } => write!(f, "Dropout {rate}"),
            LayerKind::Flatten => f.write_str("Flatten"),
            LayerKind::Dense { units } => write!(f, "Dense {units}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(flatten)]
    pub kind: LayerKind,
    /// Output shape without the batch dimension.
    pub output_shape: Vec<usize>,
    pub params: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTopology {
    pub name: String,
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerSpec>,
    pub total_params: usize,
}

impl ModelTopology {
    pub fn from_config(cfg: &PopDensityCnnConfig) -> Result<Self, ModelConfigError> {
        // Validates geometry before walking the stack.
        cfg.feature_map_shape()?;

        let [height, width] = cfg.input_size;
        let mut layers = Vec::new();
        let (mut c, mut h, mut w) = (cfg.in_channels, height, width);

        let activation = |function: &str, shape: Vec<usize>| LayerSpec {
            kind: LayerKind::Activation {
                function: function.to_string(),
            },
            output_shape: shape,
            params: 0,
        };
        let dropout = |shape: Vec<usize>| LayerSpec {
            kind: LayerKind::Dropout { rate: cfg.dropout },
            output_shape: shape,
            params: 0,
        };

        for block in &cfg.conv_blocks {
            let k = block.kernel;
            let params = c * block.filters * k * k + block.filters;
            c = block.filters;
            h = h - k + 1;
            w = w - k + 1;
            layers.push(LayerSpec {
                kind: LayerKind::Conv2d {
                    filters: block.filters,
                    kernel: [k, k],
                },
                output_shape: vec![c, h, w],
                params,
            });
            if let Some(p) = block.pool {
                h /= p;
                w /= p;
                layers.push(LayerSpec {
                    kind: LayerKind::MaxPool2d { pool: [p, p] },
                    output_shape: vec![c, h, w],
                    params: 0,
                });
            }
            layers.push(activation("relu", vec![c, h, w]));
            layers.push(dropout(vec![c, h, w]));
        }

        let mut features = c * h * w;
        layers.push(LayerSpec {
            kind: LayerKind::Flatten,
            output_shape: vec![features],
            params: 0,
        });
        for &units in &cfg.dense_widths {
            layers.push(LayerSpec {
                kind: LayerKind::Dense { units },
                output_shape: vec![units],
                params: features * units + units,
            });
            layers.push(activation("relu", vec![units]));
            layers.push(dropout(vec![units]));
            features = units;
        }
        layers.push(LayerSpec {
            kind: LayerKind::Dense { units: 1 },
            output_shape: vec![1],
            params: features + 1,
        });
        layers.push(activation("linear", vec![1]));

        let total_params = layers.iter().map(|l| l.params).sum();
        Ok(Self {
            name: "PopDensityCnn".to_string(),
            input_shape: [cfg.in_channels, height, width],
            layers,
            total_params,
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
