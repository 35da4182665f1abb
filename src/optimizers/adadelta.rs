//! Adadelta optimizer implementation
//!
//! Adadelta adapts a per-parameter step size from two running averages and
//! needs no hand-tuned learning rate.

use crate::error::{Error, Result};
use crate::optimizers::Optimizer;

/// Adadelta optimizer.
///
/// For every parameter it maintains decaying averages of squared gradients
/// and of squared updates:
///
/// ```text
/// E[g²]  = ρ · E[g²]  + (1 - ρ) · g²
/// Δx     = -sqrt(E[Δx²] + ε) / sqrt(E[g²] + ε) · g
/// x      = x + lr · Δx
/// E[Δx²] = ρ · E[Δx²] + (1 - ρ) · Δx²
/// ```
///
/// ε keeps both square roots strictly positive, so the ratio is defined even
/// while the accumulators are still zero. With `lr = 1.0` (the default) this
/// is the plain Adadelta rule.
///
/// # Reference
///
/// Zeiler, M. D. (2012). ADADELTA: An Adaptive Learning Rate Method.
/// arXiv preprint arXiv:1212.5701.
#[derive(Debug, Clone)]
pub struct Adadelta {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    /// E[g²] per slot
    accum_grad: Vec<Vec<f32>>,
    /// E[Δx²] per slot
    accum_update: Vec<Vec<f32>>,
}

impl Default for Adadelta {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            rho: 0.95,
            epsilon: 1e-6,
            accum_grad: Vec::new(),
            accum_update: Vec::new(),
        }
    }
}

impl Adadelta {
    /// Creates a new Adadelta optimizer.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` unless `0 < rho < 1`, `epsilon > 0` and
    /// `learning_rate > 0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mnist_convnet::optimizers::{Adadelta, Optimizer};
    ///
    /// let optimizer = Adadelta::new(1.0, 0.95, 1e-6).unwrap();
    /// assert_eq!(optimizer.learning_rate(), 1.0);
    /// assert!(Adadelta::new(1.0, 1.5, 1e-6).is_err());
    /// ```
    pub fn new(learning_rate: f32, rho: f32, epsilon: f32) -> Result<Self> {
        if !(rho > 0.0 && rho < 1.0) {
            return Err(Error::config(format!("adadelta decay must be in (0, 1), got {}", rho)));
        }
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(Error::config(format!("adadelta epsilon must be positive, got {}", epsilon)));
        }
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(Error::config(format!(
                "learning rate must be positive, got {}",
                learning_rate
            )));
        }
        Ok(Self {
            learning_rate,
            rho,
            epsilon,
            ..Self::default()
        })
    }

    pub fn rho(&self) -> f32 {
        self.rho
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Number of parameter tensors with live state.
    pub fn slots(&self) -> usize {
        self.accum_grad.len()
    }

    fn ensure_slot(&mut self, slot: usize, len: usize) -> Result<()> {
        if self.accum_grad.len() <= slot {
            self.accum_grad.resize_with(slot + 1, Vec::new);
            self.accum_update.resize_with(slot + 1, Vec::new);
        }
        if self.accum_grad[slot].is_empty() {
            self.accum_grad[slot] = vec![0.0; len];
            self.accum_update[slot] = vec![0.0; len];
        } else if self.accum_grad[slot].len() != len {
            return Err(Error::shape(
                format!("adadelta state for slot {}", slot),
                &[self.accum_grad[slot].len()],
                &[len],
            ));
        }
        Ok(())
    }
}

impl Optimizer for Adadelta {
    fn update(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]) -> Result<()> {
        if parameters.len() != gradients.len() {
            return Err(Error::shape(
                "adadelta gradients",
                &[parameters.len()],
                &[gradients.len()],
            ));
        }
        self.ensure_slot(slot, parameters.len())?;

        let (rho, eps, lr) = (self.rho, self.epsilon, self.learning_rate);
        let acc_g = &mut self.accum_grad[slot];
        let acc_dx = &mut self.accum_update[slot];

        for i in 0..parameters.len() {
            let g = gradients[i];
            acc_g[i] = rho * acc_g[i] + (1.0 - rho) * g * g;
            let delta = -((acc_dx[i] + eps).sqrt() / (acc_g[i] + eps).sqrt()) * g;
            parameters[i] += lr * delta;
            acc_dx[i] = rho * acc_dx[i] + (1.0 - rho) * delta * delta;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.accum_grad.clear();
        self.accum_update.clear();
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
