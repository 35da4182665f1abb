//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait that all layer types must implement.
//! The trait provides a common interface for shape inference, forward
//! propagation, backward propagation and parameter access.

use crate::error::{Error, Result};
use crate::tensor::TensorBuffer;
use crate::utils::SimpleRng;

/// Whether a forward pass is part of training or inference.
///
/// Training mode carries the random source used by stochastic layers
/// (dropout); inference mode is deterministic.
pub enum ForwardMode<'a> {
    Train(&'a mut SimpleRng),
    Infer,
}

/// A learnable tensor together with its accumulated gradient.
///
/// Handed to the optimizer by [`Layer::parameters`].
pub struct Parameter<'a> {
    pub name: &'static str,
    pub values: &'a mut [f32],
    pub gradients: &'a [f32],
}

/// Core trait for neural network layers.
///
/// Shapes passed to `output_shape` are per-sample (no batch dimension), e.g.
/// `[channels, height, width]` for image-like data. Tensors passed to
/// `forward` and `backward` carry the batch as their leading dimension.
///
/// # Example
///
/// ```ignore
/// // Forward pass through a layer
/// let output = layer.forward(&input, &mut ForwardMode::Infer)?;
///
/// // Backward pass to compute gradients
/// let grad_input = layer.backward(&input, &grad_output)?;
/// ```
pub trait Layer: Send {
    /// Short lowercase name used in summaries and error messages.
    fn name(&self) -> &'static str;

    /// Per-sample output shape for the given per-sample input shape.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the layer cannot accept `input_shape`.
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>>;

    /// Forward propagation through the layer.
    ///
    /// Computes the layer output for a batch. Layers that need state from the
    /// forward pass for their backward rule (e.g. the dropout mask) keep it
    /// internally.
    fn forward(&mut self, input: &TensorBuffer, mode: &mut ForwardMode<'_>)
        -> Result<TensorBuffer>;

    /// Backward propagation through the layer.
    ///
    /// Given the input of the corresponding forward pass and the gradient of
    /// the loss with respect to the layer output, returns the gradient with
    /// respect to the layer input. Parameterised layers add their weight and
    /// bias gradients to internal accumulators as a side effect.
    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer)
        -> Result<TensorBuffer>;

    /// Learnable parameters with their accumulated gradients.
    ///
    /// The order is stable for the lifetime of the layer.
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        Vec::new()
    }

    /// Clear accumulated parameter gradients.
    fn zero_grad(&mut self) {}

    /// Number of trainable scalars (weights and biases).
    fn parameter_count(&self) -> usize {
        0
    }

    /// True for a softmax activation, whose backward step can be fused with
    /// categorical cross-entropy.
    fn is_softmax(&self) -> bool {
        false
    }
}

/// Check that a batched tensor is `[batch, sample_shape...]`.
pub(crate) fn expect_batched(
    context: &str,
    tensor: &TensorBuffer,
    sample_shape: &[usize],
) -> Result<()> {
    let shape = tensor.shape();
    if shape.len() != sample_shape.len() + 1 || &shape[1..] != sample_shape {
        let mut expected = vec![tensor.batch_size()];
        expected.extend_from_slice(sample_shape);
        return Err(Error::shape(context, &expected, shape));
    }
    Ok(())
}
