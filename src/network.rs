//! Sequential network: an ordered stack of layers.
//!
//! Shapes are validated when the network is built, so an incompatible stack
//! is rejected before any data flows through it. The forward pass caches the
//! input of every layer for the backward pass.

use crate::error::{Error, Result};
use crate::layers::{ForwardMode, Layer, Parameter};
use crate::tensor::TensorBuffer;
use std::fmt::{self, Write as _};

pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    // Per-sample shapes: shapes[0] is the network input, shapes[i + 1] the
    // output of layer i.
    shapes: Vec<Vec<usize>>,
    // Input of each layer from the most recent forward pass.
    cache: Vec<TensorBuffer>,
}

impl Network {
    /// Build a network, checking every adjacent pair of layers.
    ///
    /// # Errors
    ///
    /// A `Layer { index, .. }` error wrapping `ShapeMismatch` for the first
    /// layer that cannot accept the output of its predecessor.
    pub fn new(input_shape: &[usize], layers: Vec<Box<dyn Layer>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::config("a network needs at least one layer"));
        }

        let mut shapes = vec![input_shape.to_vec()];
        for (index, layer) in layers.iter().enumerate() {
            let next = layer
                .output_shape(&shapes[index])
                .map_err(|e| e.at_layer(index, layer.name()))?;
            shapes.push(next);
        }

        Ok(Self {
            layers,
            shapes,
            cache: Vec::new(),
        })
    }

    /// Per-sample input shape.
    pub fn input_shape(&self) -> &[usize] {
        &self.shapes[0]
    }

    /// Per-sample output shape.
    pub fn output_shape(&self) -> &[usize] {
        &self.shapes[self.shapes.len() - 1]
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run a batch through every layer, caching layer inputs.
    pub fn forward(&mut self, batch: &TensorBuffer, mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        let mut expected = vec![batch.batch_size()];
        expected.extend_from_slice(&self.shapes[0]);
        if batch.shape() != expected.as_slice() {
            return Err(Error::shape("network input", &expected, batch.shape()));
        }

        self.cache.clear();
        let mut x = batch.clone();
        for (index, layer) in self.layers.iter_mut().enumerate() {
            let y = layer
                .forward(&x, mode)
                .map_err(|e| e.at_layer(index, layer.name()))?;
            self.cache.push(x);
            x = y;
        }
        Ok(x)
    }

    /// Inference-mode forward pass (dropout disabled).
    pub fn predict(&mut self, batch: &TensorBuffer) -> Result<TensorBuffer> {
        self.forward(batch, &mut ForwardMode::Infer)
    }

    /// Backpropagate the gradient of the loss with respect to the network
    /// output through every layer, in reverse order.
    ///
    /// Returns the gradient with respect to the network input.
    pub fn backward(&mut self, loss_gradient: &TensorBuffer) -> Result<TensorBuffer> {
        self.backward_through(self.layers.len(), loss_gradient)
    }

    /// Backpropagate a gradient taken with respect to the logits, i.e. the
    /// input of a trailing softmax layer, as produced by the fused
    /// softmax/cross-entropy gradient. Without a trailing softmax this is the
    /// same as [`Network::backward`].
    pub fn backward_from_logits(&mut self, logits_gradient: &TensorBuffer) -> Result<TensorBuffer> {
        let end = match self.layers.last() {
            Some(last) if last.is_softmax() => self.layers.len() - 1,
            _ => self.layers.len(),
        };
        self.backward_through(end, logits_gradient)
    }

    // Walk layers [0, end) in reverse, starting from a gradient with respect
    // to the output of layer end - 1.
    fn backward_through(&mut self, end: usize, gradient: &TensorBuffer) -> Result<TensorBuffer> {
        if self.cache.len() != self.layers.len() {
            return Err(Error::config("backward called without a preceding forward pass"));
        }

        let mut grad = gradient.clone();
        for index in (0..end).rev() {
            let layer = &mut self.layers[index];
            grad = layer
                .backward(&self.cache[index], &grad)
                .map_err(|e| e.at_layer(index, layer.name()))?;
        }
        Ok(grad)
    }

    /// Every learnable tensor of every layer, in layer order.
    pub fn parameters(&mut self) -> Vec<Parameter<'_>> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    pub fn zero_grad(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.zero_grad();
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// A printable table of layers, output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<4} {:<12} {:<18} {:>10}", "#", "layer", "output shape", "params");
        for (index, layer) in self.layers.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:<4} {:<12} {:<18} {:>10}",
                index,
                layer.name(),
                format!("{:?}", self.shapes[index + 1]),
                layer.parameter_count()
            );
        }
        let _ = writeln!(out, "total params: {}", self.parameter_count());
        out
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layers: Vec<String> = self
            .layers
            .iter()
            .zip(&self.shapes[1..])
            .map(|(layer, shape)| format!("{} -> {:?}", layer.name(), shape))
            .collect();
        f.debug_struct("Network")
            .field("input_shape", &self.shapes[0])
            .field("layers", &layers)
            .field("parameters", &self.parameter_count())
            .finish()
    }
}
