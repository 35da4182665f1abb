//! MNIST Convolutional Network Library
//!
//! A from-scratch implementation of the numeric work behind the classic MNIST
//! CNN: tensors, layers with hand-derived backward passes, categorical
//! cross-entropy, the Adadelta optimizer and an epoch/batch trainer.
//!
//! # Modules
//!
//! - `tensor`: `TensorBuffer`, the dense f32 array every component exchanges
//! - `layers`: Layer trait and implementations (Conv2D, Dense, pooling, ...)
//! - `network`: ordered layer stack with eager shape validation
//! - `loss`: categorical cross-entropy
//! - `optimizers`: Optimizer trait and Adadelta
//! - `trainer`: epoch/batch orchestration and metrics
//! - `data`: in-memory datasets, normalisation and one-hot batches
//! - `config`: model and training hyperparameters
//! - `architecture`: JSON-described layer stacks and model building
//! - `utils`: RNG and metrics helpers

pub mod architecture;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizers;
pub mod tensor;
pub mod trainer;
pub mod utils;

pub use error::{Error, Result};
pub use network::Network;
pub use tensor::TensorBuffer;
