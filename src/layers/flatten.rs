//! Flatten layer: `[N, d1, d2, ...]` to `[N, d1 * d2 * ...]`.

use crate::error::{Error, Result};
use crate::layers::r#trait::{ForwardMode, Layer};
use crate::tensor::TensorBuffer;

#[derive(Debug, Default)]
pub struct FlattenLayer;

impl FlattenLayer {
    pub fn new() -> Self {
        FlattenLayer
    }
}

impl Layer for FlattenLayer {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(vec![input_shape.iter().product()])
    }

    fn forward(&mut self, input: &TensorBuffer, _mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        input
            .clone()
            .reshape(&[input.batch_size(), input.sample_len()])
    }

    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer) -> Result<TensorBuffer> {
        let expected = [input.batch_size(), input.sample_len()];
        if grad_output.shape() != expected {
            return Err(Error::shape("flatten grad_output", &expected, grad_output.shape()));
        }
        grad_output.clone().reshape(input.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_round_trip_shapes() {
        let mut layer = FlattenLayer::new();
        let x = TensorBuffer::zeros(&[2, 3, 4, 5]);
        let y = layer.forward(&x, &mut ForwardMode::Infer).unwrap();
        assert_eq!(y.shape(), &[2, 60]);

        let dx = layer.backward(&x, &y).unwrap();
        assert_eq!(dx.shape(), &[2, 3, 4, 5]);
        assert_eq!(layer.output_shape(&[64, 12, 12]).unwrap(), vec![9216]);
    }
}
