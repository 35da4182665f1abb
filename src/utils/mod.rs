//! Shared utilities for the network implementation
//!
//! - SimpleRng: seedable random number generation
//! - activations: ReLU and row-wise softmax kernels
//! - metrics: argmax accuracy over batched predictions

pub mod activations;
pub mod metrics;
pub mod rng;

pub use rng::SimpleRng;
