//! Elementwise and row-wise activation layers.
//!
//! - `relu`: max(0, x); the sub-gradient at 0 is taken as 0
//! - `softmax`: normalised exponentials over the last (class) axis

use crate::error::{Error, Result};
use crate::layers::r#trait::{ForwardMode, Layer};
use crate::tensor::TensorBuffer;
use crate::utils::activations::{relu_inplace, softmax_rows};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    Relu,
    Softmax,
}

/// Parameter-free activation layer.
pub struct ActivationLayer {
    kind: ActivationKind,
}

impl ActivationLayer {
    pub fn new(kind: ActivationKind) -> Self {
        Self { kind }
    }

    pub fn relu() -> Self {
        Self::new(ActivationKind::Relu)
    }

    pub fn softmax() -> Self {
        Self::new(ActivationKind::Softmax)
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }

    fn softmax_of(input: &TensorBuffer) -> TensorBuffer {
        let cols = input.shape().last().copied().unwrap_or(0);
        let mut probs = input.clone();
        softmax_rows(probs.data_mut(), cols);
        probs
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &'static str {
        match self.kind {
            ActivationKind::Relu => "relu",
            ActivationKind::Softmax => "softmax",
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        if self.kind == ActivationKind::Softmax && input_shape.len() != 1 {
            return Err(Error::shape("softmax input", &[0], input_shape));
        }
        Ok(input_shape.to_vec())
    }

    fn forward(&mut self, input: &TensorBuffer, _mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        Ok(match self.kind {
            ActivationKind::Relu => {
                let mut output = input.clone();
                relu_inplace(output.data_mut());
                output
            }
            ActivationKind::Softmax => Self::softmax_of(input),
        })
    }

    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer) -> Result<TensorBuffer> {
        if grad_output.shape() != input.shape() {
            return Err(Error::shape(
                "activation grad_output",
                input.shape(),
                grad_output.shape(),
            ));
        }

        match self.kind {
            ActivationKind::Relu => {
                let mut grad_input = grad_output.clone();
                for (g, &x) in grad_input.data_mut().iter_mut().zip(input.data()) {
                    if x <= 0.0 {
                        *g = 0.0;
                    }
                }
                Ok(grad_input)
            }
            ActivationKind::Softmax => {
                // dx_i = y_i * (g_i - Σ_j g_j y_j), per row
                let cols = input.shape().last().copied().unwrap_or(0);
                let probs = Self::softmax_of(input);
                let mut grad_input = grad_output.clone();
                if cols == 0 {
                    return Ok(grad_input);
                }
                for (dx, y) in grad_input
                    .data_mut()
                    .chunks_exact_mut(cols)
                    .zip(probs.data().chunks_exact(cols))
                {
                    let dot: f32 = dx.iter().zip(y).map(|(g, p)| g * p).sum();
                    for (d, &p) in dx.iter_mut().zip(y) {
                        *d = p * (*d - dot);
                    }
                }
                Ok(grad_input)
            }
        }
    }

    fn is_softmax(&self) -> bool {
        self.kind == ActivationKind::Softmax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_backward_masks_non_positive() {
        let mut relu = ActivationLayer::relu();
        let x = TensorBuffer::from_vec(&[1, 4], vec![-1.0, 0.0, 0.5, 2.0]).unwrap();
        let g = TensorBuffer::filled(&[1, 4], 3.0);
        let dx = relu.backward(&x, &g).unwrap();
        assert_eq!(dx.data(), &[0.0, 0.0, 3.0, 3.0]);
    }

    #[test]
    fn test_softmax_rows_are_distributions() {
        let mut softmax = ActivationLayer::softmax();
        let x = TensorBuffer::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, -50.0, 0.0, 50.0]).unwrap();
        let y = softmax.forward(&x, &mut ForwardMode::Infer).unwrap();
        for row in y.data().chunks(3) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_softmax_requires_flat_samples() {
        let softmax = ActivationLayer::softmax();
        assert!(softmax.output_shape(&[10]).is_ok());
        assert!(softmax.output_shape(&[2, 5]).is_err());
        assert!(softmax.is_softmax());
        assert!(!ActivationLayer::relu().is_softmax());
    }
}
