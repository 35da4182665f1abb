//! Loss functions
//!
//! `CategoricalCrossEntropy` compares softmax probabilities with one-hot
//! targets. Its gradient is the fused softmax/cross-entropy gradient taken
//! with respect to the logits, which is why the trainer backpropagates it with
//! [`Network::backward_from_logits`](crate::network::Network::backward_from_logits).

use crate::error::{Error, Result};
use crate::tensor::TensorBuffer;

/// A scalar training objective over a batch.
pub trait Loss {
    /// Mean loss over the batch.
    fn compute(&self, predictions: &TensorBuffer, targets: &TensorBuffer) -> Result<f32>;

    /// Gradient used to start backpropagation.
    fn gradient(&self, predictions: &TensorBuffer, targets: &TensorBuffer) -> Result<TensorBuffer>;
}

/// Categorical cross-entropy: `-mean_n Σ_c t_c · ln(p_c + ε)`.
///
/// `p + ε` is capped at 1 so a perfect prediction scores exactly 0.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalCrossEntropy {
    epsilon: f32,
}

impl Default for CategoricalCrossEntropy {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

impl CategoricalCrossEntropy {
    pub fn new(epsilon: f32) -> Result<Self> {
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(Error::config(format!(
                "cross-entropy epsilon must be positive, got {}",
                epsilon
            )));
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    fn check(predictions: &TensorBuffer, targets: &TensorBuffer) -> Result<()> {
        if predictions.shape() != targets.shape() || predictions.shape().len() != 2 {
            return Err(Error::shape(
                "cross-entropy targets",
                predictions.shape(),
                targets.shape(),
            ));
        }
        Ok(())
    }
}

impl Loss for CategoricalCrossEntropy {
    fn compute(&self, predictions: &TensorBuffer, targets: &TensorBuffer) -> Result<f32> {
        Self::check(predictions, targets)?;
        let batch = predictions.batch_size();
        if batch == 0 {
            return Ok(0.0);
        }
        let total: f32 = predictions
            .data()
            .iter()
            .zip(targets.data())
            .filter(|(_, &t)| t != 0.0)
            .map(|(&p, &t)| {
                // explicit comparison so a NaN prediction propagates
                let q = p + self.epsilon;
                -t * if q > 1.0 { 0.0 } else { q.ln() }
            })
            .sum();
        Ok(total / batch as f32)
    }

    /// `(p - t) / N`: the gradient with respect to the softmax logits.
    fn gradient(&self, predictions: &TensorBuffer, targets: &TensorBuffer) -> Result<TensorBuffer> {
        Self::check(predictions, targets)?;
        let batch = predictions.batch_size().max(1);
        let mut grad = predictions.sub(targets)?;
        grad.scale_inplace(1.0 / batch as f32);
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::one_hot;
    use crate::utils::activations::softmax_rows;
    use crate::utils::SimpleRng;

    #[test]
    fn test_perfect_prediction_has_zero_loss() {
        let loss = CategoricalCrossEntropy::default();
        let t = TensorBuffer::from_vec(&[2, 3], vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
        let value = loss.compute(&t, &t).unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_uniform_prediction_is_ln_classes() {
        let loss = CategoricalCrossEntropy::default();
        let p = TensorBuffer::filled(&[1, 4], 0.25);
        let t = TensorBuffer::from_vec(&[1, 4], vec![0.0, 0.0, 1.0, 0.0]).unwrap();
        let value = loss.compute(&p, &t).unwrap();
        assert!((value - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_random_predictions_never_give_negative_loss() {
        let loss = CategoricalCrossEntropy::default();
        let mut rng = SimpleRng::new(17);
        for classes in [2usize, 3, 10] {
            for _ in 0..50 {
                let rows = 1 + rng.gen_usize(8);
                let mut p: Vec<f32> =
                    (0..rows * classes).map(|_| rng.gen_range_f32(-30.0, 30.0)).collect();
                softmax_rows(&mut p, classes);
                let labels: Vec<u8> = (0..rows).map(|_| rng.gen_usize(classes) as u8).collect();

                let p = TensorBuffer::from_vec(&[rows, classes], p).unwrap();
                let t = one_hot(&labels, classes).unwrap();
                let value = loss.compute(&p, &t).unwrap();
                assert!(value.is_finite() && value >= 0.0, "loss {}", value);
            }
        }
    }

    #[test]
    fn test_zero_probability_stays_finite() {
        let loss = CategoricalCrossEntropy::default();
        let p = TensorBuffer::from_vec(&[1, 2], vec![1.0, 0.0]).unwrap();
        let t = TensorBuffer::from_vec(&[1, 2], vec![0.0, 1.0]).unwrap();
        assert!(loss.compute(&p, &t).unwrap().is_finite());
    }

    #[test]
    fn test_nan_prediction_gives_nan_loss() {
        let loss = CategoricalCrossEntropy::default();
        let p = TensorBuffer::from_vec(&[1, 2], vec![f32::NAN, 0.5]).unwrap();
        let t = TensorBuffer::from_vec(&[1, 2], vec![1.0, 0.0]).unwrap();
        assert!(loss.compute(&p, &t).unwrap().is_nan());
    }

    #[test]
    fn test_gradient_is_mean_difference() {
        let loss = CategoricalCrossEntropy::default();
        let p = TensorBuffer::from_vec(&[2, 2], vec![0.8, 0.2, 0.4, 0.6]).unwrap();
        let t = TensorBuffer::from_vec(&[2, 2], vec![1.0, 0.0, 1.0, 0.0]).unwrap();
        let g = loss.gradient(&p, &t).unwrap();
        let expected = [-0.1, 0.1, -0.3, 0.3];
        for (a, b) in g.data().iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let loss = CategoricalCrossEntropy::default();
        let p = TensorBuffer::zeros(&[2, 3]);
        let t = TensorBuffer::zeros(&[2, 4]);
        assert!(matches!(loss.compute(&p, &t), Err(Error::ShapeMismatch { .. })));
        assert!(CategoricalCrossEntropy::new(0.0).is_err());
    }
}
