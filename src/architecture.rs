//! Architecture configuration structures
//!
//! A network can be described as JSON and built without code changes. Each
//! layer entry names its kind with `layer_type`; input sizes are not written
//! out, they follow from `input_shape` and the layers before it.
//!
//! ```json
//! {
//!   "input_shape": [1, 28, 28],
//!   "layers": [
//!     { "layer_type": "conv2d", "out_channels": 32, "kernel_size": 3 },
//!     { "layer_type": "activation", "activation": "relu" },
//!     { "layer_type": "max_pool2d", "pool_size": [2, 2] },
//!     { "layer_type": "flatten" },
//!     { "layer_type": "dense", "output_size": 10 },
//!     { "layer_type": "activation", "activation": "softmax" }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use crate::layers::{
    ActivationKind, ActivationLayer, Conv2DLayer, DenseLayer, DropoutLayer, FlattenLayer, Layer,
    MaxPool2DLayer, Padding,
};
use crate::network::Network;
use crate::utils::SimpleRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for a single layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum LayerConfig {
    /// Square-kernel convolution over `[channels, height, width]` samples.
    Conv2d {
        out_channels: usize,
        kernel_size: usize,
        #[serde(default)]
        padding: Padding,
    },
    Activation { activation: ActivationKind },
    MaxPool2d { pool_size: (usize, usize) },
    Dropout { drop_rate: f32 },
    Flatten,
    /// Fully connected layer over rank-1 samples.
    Dense { output_size: usize },
}

impl LayerConfig {
    pub fn relu() -> Self {
        LayerConfig::Activation {
            activation: ActivationKind::Relu,
        }
    }

    pub fn softmax() -> Self {
        LayerConfig::Activation {
            activation: ActivationKind::Softmax,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LayerConfig::Conv2d { .. } => "conv2d",
            LayerConfig::Activation {
                activation: ActivationKind::Relu,
            } => "relu",
            LayerConfig::Activation {
                activation: ActivationKind::Softmax,
            } => "softmax",
            LayerConfig::MaxPool2d { .. } => "max_pool2d",
            LayerConfig::Dropout { .. } => "dropout",
            LayerConfig::Flatten => "flatten",
            LayerConfig::Dense { .. } => "dense",
        }
    }

    /// Construct the layer for samples of shape `input`.
    fn build(&self, input: &[usize], rng: &mut SimpleRng) -> Result<Box<dyn Layer>> {
        let layer: Box<dyn Layer> = match *self {
            LayerConfig::Conv2d {
                out_channels,
                kernel_size,
                padding,
            } => {
                let [c, h, w] = image_dims(input)?;
                Box::new(Conv2DLayer::new(c, out_channels, kernel_size, padding, h, w, rng)?)
            }
            LayerConfig::Activation { activation } => Box::new(ActivationLayer::new(activation)),
            LayerConfig::MaxPool2d {
                pool_size: (ph, pw),
            } => Box::new(MaxPool2DLayer::new(ph, pw)?),
            LayerConfig::Dropout { drop_rate } => Box::new(DropoutLayer::new(drop_rate)?),
            LayerConfig::Flatten => Box::new(FlattenLayer::new()),
            LayerConfig::Dense { output_size } => match input {
                [features] => Box::new(DenseLayer::new(*features, output_size, rng)?),
                _ => {
                    let flat: usize = input.iter().product();
                    return Err(Error::shape("dense input (flatten first)", &[flat], input));
                }
            },
        };
        Ok(layer)
    }
}

fn image_dims(input: &[usize]) -> Result<[usize; 3]> {
    match *input {
        [c, h, w] => Ok([c, h, w]),
        _ => Err(Error::ShapeMismatch {
            context: "conv2d input rank (expected [channels, height, width])".to_string(),
            expected: vec![0; 3],
            actual: input.to_vec(),
        }),
    }
}

/// A full network description: per-sample input shape plus ordered layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureConfig {
    pub input_shape: Vec<usize>,
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    /// Build the network, initialising weights from `rng`.
    ///
    /// # Errors
    ///
    /// Errors raised while building layer `i` are wrapped as
    /// `Error::Layer { index: i, .. }`.
    pub fn build_network(&self, rng: &mut SimpleRng) -> Result<Network> {
        validate_architecture(self)?;

        let mut shape = self.input_shape.clone();
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(self.layers.len());
        for (index, config) in self.layers.iter().enumerate() {
            let layer = config
                .build(&shape, rng)
                .map_err(|e| e.at_layer(index, config.name()))?;
            shape = layer
                .output_shape(&shape)
                .map_err(|e| e.at_layer(index, config.name()))?;
            layers.push(layer);
        }
        Network::new(&self.input_shape, layers)
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use mnist_convnet::architecture::load_architecture;
/// use mnist_convnet::utils::SimpleRng;
///
/// let arch = load_architecture("config/architectures/mnist_cnn.json").unwrap();
/// let network = arch.build_network(&mut SimpleRng::new(1)).unwrap();
/// println!("{}", network.summary());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(Error::config("architecture must contain at least one layer"));
    }
    if config.input_shape.is_empty() || config.input_shape.contains(&0) {
        return Err(Error::config(format!(
            "input_shape must be non-empty with positive dimensions, got {:?}",
            config.input_shape
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ArchitectureConfig {
        ArchitectureConfig {
            input_shape: vec![1, 6, 6],
            layers: vec![
                LayerConfig::Conv2d {
                    out_channels: 2,
                    kernel_size: 3,
                    padding: Padding::Valid,
                },
                LayerConfig::relu(),
                LayerConfig::MaxPool2d { pool_size: (2, 2) },
                LayerConfig::Flatten,
                LayerConfig::Dense { output_size: 3 },
                LayerConfig::softmax(),
            ],
        }
    }

    #[test]
    fn test_parse_layer_types() {
        let json = r#"[
            {"layer_type": "conv2d", "out_channels": 4, "kernel_size": 3, "padding": "same"},
            {"layer_type": "activation", "activation": "relu"},
            {"layer_type": "max_pool2d", "pool_size": [2, 2]},
            {"layer_type": "dropout", "drop_rate": 0.25},
            {"layer_type": "flatten"},
            {"layer_type": "dense", "output_size": 10}
        ]"#;
        let layers: Vec<LayerConfig> = serde_json::from_str(json).unwrap();
        assert_eq!(
            layers[0],
            LayerConfig::Conv2d {
                out_channels: 4,
                kernel_size: 3,
                padding: Padding::Same
            }
        );
        assert_eq!(layers[1], LayerConfig::relu());
        assert_eq!(layers[2], LayerConfig::MaxPool2d { pool_size: (2, 2) });
        assert_eq!(layers[4], LayerConfig::Flatten);
    }

    #[test]
    fn test_padding_defaults_to_valid() {
        let layer: LayerConfig =
            serde_json::from_str(r#"{"layer_type": "conv2d", "out_channels": 4, "kernel_size": 3}"#)
                .unwrap();
        assert!(matches!(
            layer,
            LayerConfig::Conv2d {
                padding: Padding::Valid,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_layer_type_is_rejected() {
        let result: std::result::Result<LayerConfig, _> =
            serde_json::from_str(r#"{"layer_type": "batchnorm", "size": 8}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_tracks_shapes() {
        let net = small().build_network(&mut SimpleRng::new(1)).unwrap();
        assert_eq!(net.len(), 6);
        assert_eq!(net.output_shape(), &[3]);
        // conv 2*9+2, dense 8*3+3
        assert_eq!(net.parameter_count(), 20 + 27);
    }

    #[test]
    fn test_dense_without_flatten_fails_at_layer() {
        let mut config = small();
        config.layers.remove(3);
        let err = config.build_network(&mut SimpleRng::new(1)).unwrap_err();
        assert!(matches!(err, Error::Layer { index: 3, name: "dense", .. }));
        assert!(matches!(err.root(), Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_architecture_is_invalid() {
        let config = ArchitectureConfig {
            input_shape: vec![1, 28, 28],
            layers: vec![],
        };
        assert!(matches!(
            config.build_network(&mut SimpleRng::new(1)),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
