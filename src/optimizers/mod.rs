//! Optimizer abstractions for neural network parameter updates
//!
//! This module provides the Optimizer trait and the Adadelta implementation
//! used to update network parameters during training.
//!
//! # Overview
//!
//! Optimizers define how to use gradients to update model parameters. Each
//! learnable tensor of a network is identified by its *slot*: its position in
//! [`Network::parameters`](crate::network::Network::parameters). Stateful
//! optimizers keep one set of accumulators per slot.
//!
//! # Example
//!
//! ```ignore
//! use mnist_convnet::optimizers::{Adadelta, Optimizer};
//!
//! let mut optimizer = Adadelta::default();
//!
//! // after network.backward(...)
//! optimizer.step(&mut network)?;
//! ```

pub mod adadelta;

pub use adadelta::Adadelta;

use crate::error::Result;
use crate::network::Network;

/// Core trait for neural network optimizers.
pub trait Optimizer {
    /// Update one parameter tensor in place.
    ///
    /// # Arguments
    ///
    /// * `slot` - Stable index of the tensor among all network parameters
    /// * `parameters` - Values to update (weights or biases)
    /// * `gradients` - Gradient of the loss with respect to each value
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `parameters` and `gradients` differ in length, or if
    /// the slot was previously used with a different length.
    fn update(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]) -> Result<()>;

    /// Apply one update to every parameter of `network`, then clear its
    /// accumulated gradients.
    fn step(&mut self, network: &mut Network) -> Result<()> {
        for (slot, param) in network.parameters().into_iter().enumerate() {
            self.update(slot, param.values, param.gradients)?;
        }
        network.zero_grad();
        Ok(())
    }

    /// Clear all accumulated optimizer state.
    fn reset(&mut self);

    /// Base learning rate (a multiplier for adaptive optimizers).
    fn learning_rate(&self) -> f32;
}
