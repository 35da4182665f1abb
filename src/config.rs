//! Configuration structures for training
//!
//! `ModelConfig` gathers every hyperparameter of the reference digit
//! classifier and its training run. Every field has a default, so a JSON file
//! only needs to name what it changes:
//!
//! ```json
//! {
//!   "num_filters": 16,
//!   "dense_units": 64,
//!   "epochs": 3,
//!   "seed": 7
//! }
//! ```

use crate::architecture::{ArchitectureConfig, LayerConfig};
use crate::error::{Error, Result};
use crate::layers::Padding;
use crate::network::Network;
use crate::optimizers::Adadelta;
use crate::trainer::TrainerConfig;
use crate::utils::SimpleRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Hyperparameters of the reference convolutional classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Filters of the first convolution; the second has twice as many.
    pub num_filters: usize,
    /// (height, width); only square kernels are supported
    pub kernel_size: (usize, usize),
    pub pool_size: (usize, usize),
    pub dense_units: usize,
    /// Dropout after pooling and after the hidden dense layer.
    pub dropout_rates: (f32, f32),
    pub num_classes: usize,
    pub batch_size: usize,
    pub epochs: usize,
    /// Adadelta ρ
    pub optimizer_decay: f32,
    /// Adadelta ε
    pub optimizer_epsilon: f32,
    /// Multiplier on the Adadelta step.
    pub learning_rate: f32,
    pub seed: u64,
    /// Per-sample `[channels, height, width]`.
    pub input_shape: Vec<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_filters: 32,
            kernel_size: (3, 3),
            pool_size: (2, 2),
            dense_units: 128,
            dropout_rates: (0.25, 0.5),
            num_classes: 10,
            batch_size: 128,
            epochs: 12,
            optimizer_decay: 0.95,
            optimizer_epsilon: 1e-6,
            learning_rate: 1.0,
            seed: 1,
            input_shape: vec![1, 28, 28],
        }
    }
}

impl ModelConfig {
    /// Check every field for range errors.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_filters", self.num_filters),
            ("kernel_size", self.kernel_size.0.min(self.kernel_size.1)),
            ("pool_size", self.pool_size.0.min(self.pool_size.1)),
            ("dense_units", self.dense_units),
            ("num_classes", self.num_classes),
            ("batch_size", self.batch_size),
            ("epochs", self.epochs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::config(format!("{} must be positive", name)));
            }
        }

        if self.kernel_size.0 != self.kernel_size.1 {
            return Err(Error::config(format!(
                "kernel_size must be square, got {:?}",
                self.kernel_size
            )));
        }

        for rate in [self.dropout_rates.0, self.dropout_rates.1] {
            if !(0.0..1.0).contains(&rate) {
                return Err(Error::config(format!(
                    "dropout rates must be in [0, 1), got {}",
                    rate
                )));
            }
        }

        if !(self.optimizer_decay > 0.0 && self.optimizer_decay < 1.0) {
            return Err(Error::config(format!(
                "optimizer_decay must be in (0, 1), got {}",
                self.optimizer_decay
            )));
        }
        if !(self.optimizer_epsilon > 0.0 && self.optimizer_epsilon.is_finite()) {
            return Err(Error::config("optimizer_epsilon must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::config("learning_rate must be positive"));
        }

        if self.input_shape.len() != 3 || self.input_shape.contains(&0) {
            return Err(Error::config(format!(
                "input_shape must be [channels, height, width], got {:?}",
                self.input_shape
            )));
        }
        Ok(())
    }

    /// The reference layer stack:
    ///
    /// ```text
    /// conv(f) -> relu -> conv(2f) -> relu -> max_pool -> dropout(r0)
    ///   -> flatten -> dense(units) -> relu -> dropout(r1) -> dense(classes) -> softmax
    /// ```
    pub fn architecture(&self) -> ArchitectureConfig {
        let kernel_size = self.kernel_size.0;
        ArchitectureConfig {
            input_shape: self.input_shape.clone(),
            layers: vec![
                LayerConfig::Conv2d {
                    out_channels: self.num_filters,
                    kernel_size,
                    padding: Padding::Valid,
                },
                LayerConfig::relu(),
                LayerConfig::Conv2d {
                    out_channels: 2 * self.num_filters,
                    kernel_size,
                    padding: Padding::Valid,
                },
                LayerConfig::relu(),
                LayerConfig::MaxPool2d {
                    pool_size: self.pool_size,
                },
                LayerConfig::Dropout {
                    drop_rate: self.dropout_rates.0,
                },
                LayerConfig::Flatten,
                LayerConfig::Dense {
                    output_size: self.dense_units,
                },
                LayerConfig::relu(),
                LayerConfig::Dropout {
                    drop_rate: self.dropout_rates.1,
                },
                LayerConfig::Dense {
                    output_size: self.num_classes,
                },
                LayerConfig::softmax(),
            ],
        }
    }

    /// Validate, then build the reference network with weights drawn from `rng`.
    pub fn build_network(&self, rng: &mut SimpleRng) -> Result<Network> {
        self.validate()?;
        self.architecture().build_network(rng)
    }

    pub fn optimizer(&self) -> Result<Adadelta> {
        Adadelta::new(self.learning_rate, self.optimizer_decay, self.optimizer_epsilon)
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            batch_size: self.batch_size,
            epochs: self.epochs,
            seed: self.seed,
        }
    }
}

/// Loads and validates a model configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use mnist_convnet::config::load_config;
///
/// let cfg = load_config("config/mnist_cnn.json").unwrap();
/// assert_eq!(cfg.num_classes, 10);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ModelConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ModelConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
