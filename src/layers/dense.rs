//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = input × weights + biases

use crate::error::{Error, Result};
use crate::layers::r#trait::{expect_batched, ForwardMode, Layer, Parameter};
use crate::tensor::TensorBuffer;
use crate::utils::SimpleRng;
use rayon::prelude::*;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the linear transformation: y = xW + b
/// where x is the input (batch_size × input_size),
/// W is the weight matrix (input_size × output_size),
/// and b is the bias vector (output_size).
///
/// # Example
///
/// ```
/// use mnist_convnet::layers::{DenseLayer, Layer};
/// use mnist_convnet::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(9216, 128, &mut rng).unwrap();
/// assert_eq!(layer.parameter_count(), 9216 * 128 + 128);
/// ```
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: Vec<f32>,
    grad_biases: Vec<f32>,
}

impl DenseLayer {
    /// Create a new DenseLayer with Xavier initialization.
    ///
    /// Weights are sampled uniformly from `[-limit, limit]` where
    /// `limit = sqrt(6 / (input_size + output_size))`. Biases start at zero.
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(Error::config(format!(
                "dense layer sizes must be positive, got {} -> {}",
                input_size, output_size
            )));
        }

        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Ok(Self {
            input_size,
            output_size,
            weights,
            biases: vec![0.0; output_size],
            grad_weights: vec![0.0; input_size * output_size],
            grad_biases: vec![0.0; output_size],
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    pub fn grad_weights(&self) -> &[f32] {
        &self.grad_weights
    }

    pub fn grad_biases(&self) -> &[f32] {
        &self.grad_biases
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        if input_shape != [self.input_size] {
            return Err(Error::shape("dense input", &[self.input_size], input_shape));
        }
        Ok(vec![self.output_size])
    }

    fn forward(&mut self, input: &TensorBuffer, _mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        expect_batched("dense forward input", input, &[self.input_size])?;
        let (n_in, n_out) = (self.input_size, self.output_size);
        let mut output = TensorBuffer::zeros(&[input.batch_size(), n_out]);
        let weights = &self.weights;
        let biases = &self.biases;

        output
            .data_mut()
            .par_chunks_mut(n_out)
            .zip(input.data().par_chunks(n_in))
            .for_each(|(y, x)| {
                y.copy_from_slice(biases);
                for (i, &xi) in x.iter().enumerate() {
                    let row = &weights[i * n_out..(i + 1) * n_out];
                    for (yj, &w) in y.iter_mut().zip(row) {
                        *yj += xi * w;
                    }
                }
            });

        Ok(output)
    }

    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer) -> Result<TensorBuffer> {
        expect_batched("dense backward input", input, &[self.input_size])?;
        expect_batched("dense grad_output", grad_output, &[self.output_size])?;
        if input.batch_size() != grad_output.batch_size() {
            return Err(Error::shape(
                "dense grad_output batch",
                &[input.batch_size()],
                &[grad_output.batch_size()],
            ));
        }

        let (n_in, n_out) = (self.input_size, self.output_size);
        let batch = input.batch_size();
        let x = input.data();
        let dy = grad_output.data();

        // db = Σ_b dy
        for g in dy.chunks_exact(n_out) {
            for (gb, &v) in self.grad_biases.iter_mut().zip(g) {
                *gb += v;
            }
        }

        // dW = xᵀ · dy, one weight row per input feature
        self.grad_weights
            .par_chunks_mut(n_out)
            .enumerate()
            .for_each(|(i, gw_row)| {
                for b in 0..batch {
                    let xi = x[b * n_in + i];
                    if xi == 0.0 {
                        continue;
                    }
                    for (gw, &g) in gw_row.iter_mut().zip(&dy[b * n_out..(b + 1) * n_out]) {
                        *gw += xi * g;
                    }
                }
            });

        // dx = dy · Wᵀ
        let weights = &self.weights;
        let mut grad_input = TensorBuffer::zeros(input.shape());
        grad_input
            .data_mut()
            .par_chunks_mut(n_in)
            .zip(dy.par_chunks(n_out))
            .for_each(|(dx, g)| {
                for (i, dxi) in dx.iter_mut().enumerate() {
                    let row = &weights[i * n_out..(i + 1) * n_out];
                    *dxi = row.iter().zip(g).map(|(w, gj)| w * gj).sum();
                }
            });

        Ok(grad_input)
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter {
                name: "kernel",
                values: &mut self.weights,
                gradients: &self.grad_weights,
            },
            Parameter {
                name: "bias",
                values: &mut self.biases,
                gradients: &self.grad_biases,
            },
        ]
    }

    fn zero_grad(&mut self) {
        self.grad_weights.iter_mut().for_each(|g| *g = 0.0);
        self.grad_biases.iter_mut().for_each(|g| *g = 0.0);
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
