//! Dropout layer implementation for regularization
//!
//! This module provides a DropoutLayer that randomly drops (sets to zero) a fraction
//! of input units during training to prevent overfitting. During inference, all units
//! are kept and outputs are passed through unchanged.

use crate::error::{Error, Result};
use crate::layers::r#trait::{ForwardMode, Layer};
use crate::tensor::TensorBuffer;

/// Inverted dropout.
///
/// During training, each unit is zeroed with probability `drop_rate` and the
/// survivors are scaled by `1 / (1 - drop_rate)` so the expected activation
/// is unchanged. During inference the layer is the identity. The random
/// source comes from the [`ForwardMode::Train`] handle of each forward call.
///
/// # Example
///
/// ```
/// use mnist_convnet::layers::{DropoutLayer, ForwardMode, Layer};
/// use mnist_convnet::tensor::TensorBuffer;
///
/// let mut layer = DropoutLayer::new(0.5).unwrap();
/// let x = TensorBuffer::filled(&[2, 4], 1.0);
/// let y = layer.forward(&x, &mut ForwardMode::Infer).unwrap();
/// assert_eq!(y, x);
/// ```
pub struct DropoutLayer {
    drop_rate: f32,
    // Per-element multiplier (0 or 1/(1-rate)) from the last training pass;
    // None after an inference pass.
    mask: Option<Vec<f32>>,
}

impl DropoutLayer {
    /// Creates a new dropout layer.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` unless `drop_rate` is in `[0.0, 1.0)`.
    pub fn new(drop_rate: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&drop_rate) {
            return Err(Error::config(format!(
                "dropout rate must be in [0, 1), got {}",
                drop_rate
            )));
        }
        Ok(Self {
            drop_rate,
            mask: None,
        })
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }
}

impl Layer for DropoutLayer {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }

    fn forward(&mut self, input: &TensorBuffer, mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        let rng = match mode {
            ForwardMode::Train(rng) if self.drop_rate > 0.0 => rng,
            _ => {
                self.mask = None;
                return Ok(input.clone());
            }
        };

        let scale = 1.0 / (1.0 - self.drop_rate);
        let mask: Vec<f32> = (0..input.len())
            .map(|_| {
                if rng.next_f32() >= self.drop_rate {
                    scale
                } else {
                    0.0
                }
            })
            .collect();

        let mut output = input.clone();
        for (y, m) in output.data_mut().iter_mut().zip(&mask) {
            *y *= m;
        }
        self.mask = Some(mask);
        Ok(output)
    }

    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer) -> Result<TensorBuffer> {
        if grad_output.shape() != input.shape() {
            return Err(Error::shape("dropout grad_output", input.shape(), grad_output.shape()));
        }
        match &self.mask {
            None => Ok(grad_output.clone()),
            Some(mask) if mask.len() == grad_output.len() => {
                let mut grad_input = grad_output.clone();
                for (g, m) in grad_input.data_mut().iter_mut().zip(mask) {
                    *g *= m;
                }
                Ok(grad_input)
            }
            Some(mask) => Err(Error::shape(
                "dropout mask",
                &[mask.len()],
                &[grad_output.len()],
            )),
        }
    }
}
