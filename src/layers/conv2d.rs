//! 2D Convolutional layer implementation
//!
//! This module provides a Conv2DLayer that performs stride-1 2D
//! cross-correlation over channel-first `[C, H, W]` feature maps.

use crate::error::{Error, Result};
use crate::layers::r#trait::{expect_batched, ForwardMode, Layer, Parameter};
use crate::tensor::TensorBuffer;
use crate::utils::SimpleRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Border handling for the convolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding: output size is `input - kernel + 1`.
    #[default]
    Valid,
    /// Zero padding of `(kernel - 1) / 2` on every side; requires an odd
    /// kernel and keeps the spatial size.
    Same,
}

// Index arithmetic shared by the forward and backward kernels.
#[derive(Debug, Clone, Copy)]
struct ConvGeometry {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    pad: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

impl ConvGeometry {
    fn in_len(&self) -> usize {
        self.in_channels * self.in_h * self.in_w
    }

    fn out_len(&self) -> usize {
        self.out_channels * self.out_h * self.out_w
    }

    fn filter_len(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    // Input row/col touched by output (oy, ox) and kernel tap (ky, kx), or
    // None when the tap falls in the zero padding.
    #[inline]
    fn input_pos(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> Option<(usize, usize)> {
        let iy = (oy + ky).checked_sub(self.pad)?;
        let ix = (ox + kx).checked_sub(self.pad)?;
        if iy < self.in_h && ix < self.in_w {
            Some((iy, ix))
        } else {
            None
        }
    }
}

/// 2D Convolutional layer with learnable filters.
///
/// # Fields
///
/// * `weights` - Filters laid out as `[out_channels, in_channels, k, k]`
/// * `biases` - One bias per output channel
/// * `grad_weights`, `grad_biases` - Gradient accumulators filled by `backward`
///
/// # Example
///
/// ```
/// use mnist_convnet::layers::{Conv2DLayer, Layer, Padding};
/// use mnist_convnet::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 1 input channel (grayscale), 32 filters, 3x3 kernel, 28x28 input
/// let layer = Conv2DLayer::new(1, 32, 3, Padding::Valid, 28, 28, &mut rng).unwrap();
/// assert_eq!(layer.output_shape(&[1, 28, 28]).unwrap(), vec![32, 26, 26]);
/// ```
pub struct Conv2DLayer {
    geometry: ConvGeometry,
    padding: Padding,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: Vec<f32>,
    grad_biases: Vec<f32>,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with Xavier initialization.
    ///
    /// Weights are sampled uniformly from `[-limit, limit]` with
    /// `limit = sqrt(6 / (fan_in + fan_out))`, where
    /// `fan_in = in_channels × k²` and `fan_out = out_channels × k²`.
    /// Biases start at zero.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for zero channels or kernel size, an even kernel
    /// with `Padding::Same`, or a kernel larger than the (padded) input.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: Padding,
        input_height: usize,
        input_width: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(Error::config("conv2d channel counts must be positive"));
        }
        if kernel_size == 0 {
            return Err(Error::config("conv2d kernel size must be positive"));
        }
        let pad = match padding {
            Padding::Valid => 0,
            Padding::Same if kernel_size % 2 == 1 => (kernel_size - 1) / 2,
            Padding::Same => {
                return Err(Error::config(format!(
                    "conv2d 'same' padding needs an odd kernel, got {}",
                    kernel_size
                )))
            }
        };
        if input_height + 2 * pad < kernel_size || input_width + 2 * pad < kernel_size {
            return Err(Error::config(format!(
                "conv2d kernel {}x{} does not fit a {}x{} input",
                kernel_size, kernel_size, input_height, input_width
            )));
        }

        let geometry = ConvGeometry {
            in_channels,
            out_channels,
            kernel: kernel_size,
            pad,
            in_h: input_height,
            in_w: input_width,
            out_h: input_height + 2 * pad - kernel_size + 1,
            out_w: input_width + 2 * pad - kernel_size + 1,
        };

        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let fan_out = (out_channels * kernel_size * kernel_size) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = out_channels * geometry.filter_len();
        let weights = (0..weight_count)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Ok(Self {
            geometry,
            padding,
            weights,
            biases: vec![0.0; out_channels],
            grad_weights: vec![0.0; weight_count],
            grad_biases: vec![0.0; out_channels],
        })
    }

    pub fn in_channels(&self) -> usize {
        self.geometry.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.geometry.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.geometry.kernel
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn output_height(&self) -> usize {
        self.geometry.out_h
    }

    pub fn output_width(&self) -> usize {
        self.geometry.out_w
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

    fn input_shape(&self) -> [usize; 3] {
        [self.geometry.in_channels, self.geometry.in_h, self.geometry.in_w]
    }

    fn output_sample_shape(&self) -> [usize; 3] {
        [self.geometry.out_channels, self.geometry.out_h, self.geometry.out_w]
    }
}

// One sample: out[oc, oy, ox] = b[oc] + Σ_ic Σ_ky Σ_kx in[ic, oy+ky-p, ox+kx-p] · w[oc, ic, ky, kx]
fn correlate_sample(g: ConvGeometry, weights: &[f32], biases: &[f32], input: &[f32], output: &mut [f32]) {
    let in_spatial = g.in_h * g.in_w;
    let out_spatial = g.out_h * g.out_w;
    let kk = g.kernel * g.kernel;

    for oc in 0..g.out_channels {
        let out_base = oc * out_spatial;
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                let mut sum = biases[oc];
                for ic in 0..g.in_channels {
                    let w_base = (oc * g.in_channels + ic) * kk;
                    let in_base = ic * in_spatial;
                    for ky in 0..g.kernel {
                        for kx in 0..g.kernel {
                            if let Some((iy, ix)) = g.input_pos(oy, ox, ky, kx) {
                                sum += input[in_base + iy * g.in_w + ix]
                                    * weights[w_base + ky * g.kernel + kx];
                            }
                        }
                    }
                }
                output[out_base + oy * g.out_w + ox] = sum;
            }
        }
    }
}

impl Layer for Conv2DLayer {
    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        if input_shape != self.input_shape() {
            return Err(Error::shape("conv2d input", &self.input_shape(), input_shape));
        }
        Ok(self.output_sample_shape().to_vec())
    }

    fn forward(&mut self, input: &TensorBuffer, _mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        expect_batched("conv2d forward input", input, &self.input_shape())?;
        let g = self.geometry;
        let batch = input.batch_size();
        let mut output = TensorBuffer::zeros(&[batch, g.out_channels, g.out_h, g.out_w]);
        if batch == 0 {
            return Ok(output);
        }

        let weights = &self.weights;
        let biases = &self.biases;
        output
            .data_mut()
            .par_chunks_mut(g.out_len())
            .zip(input.data().par_chunks(g.in_len()))
            .for_each(|(out_b, in_b)| correlate_sample(g, weights, biases, in_b, out_b));

        Ok(output)
    }

    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer) -> Result<TensorBuffer> {
        expect_batched("conv2d backward input", input, &self.input_shape())?;
        expect_batched("conv2d grad_output", grad_output, &self.output_sample_shape())?;
        if input.batch_size() != grad_output.batch_size() {
            return Err(Error::shape(
                "conv2d grad_output batch",
                &[input.batch_size()],
                &[grad_output.batch_size()],
            ));
        }

        let g = self.geometry;
        let batch = input.batch_size();
        let in_spatial = g.in_h * g.in_w;
        let out_spatial = g.out_h * g.out_w;
        let kk = g.kernel * g.kernel;
        let x = input.data();
        let dy = grad_output.data();

        // Bias gradient: sum of the output gradient per channel.
        for (oc, gb) in self.grad_biases.iter_mut().enumerate() {
            for b in 0..batch {
                let base = b * g.out_len() + oc * out_spatial;
                *gb += dy[base..base + out_spatial].iter().sum::<f32>();
            }
        }

        // Kernel gradient: correlation of the input with the output gradient.
        // Each output channel owns a disjoint slice of grad_weights.
        self.grad_weights
            .par_chunks_mut(g.filter_len())
            .enumerate()
            .for_each(|(oc, gw)| {
                for b in 0..batch {
                    let x_b = &x[b * g.in_len()..(b + 1) * g.in_len()];
                    let dy_base = b * g.out_len() + oc * out_spatial;
                    for ic in 0..g.in_channels {
                        let in_base = ic * in_spatial;
                        for ky in 0..g.kernel {
                            for kx in 0..g.kernel {
                                let mut acc = 0.0f32;
                                for oy in 0..g.out_h {
                                    for ox in 0..g.out_w {
                                        if let Some((iy, ix)) = g.input_pos(oy, ox, ky, kx) {
                                            acc += dy[dy_base + oy * g.out_w + ox]
                                                * x_b[in_base + iy * g.in_w + ix];
                                        }
                                    }
                                }
                                gw[ic * kk + ky * g.kernel + kx] += acc;
                            }
                        }
                    }
                }
            });

        // Input gradient: full correlation of the output gradient with the
        // flipped kernel, written as a scatter from every output position.
        let weights = &self.weights;
        let mut grad_input = TensorBuffer::zeros(input.shape());
        grad_input
            .data_mut()
            .par_chunks_mut(g.in_len())
            .zip(dy.par_chunks(g.out_len()))
            .for_each(|(dx_b, dy_b)| {
                for oc in 0..g.out_channels {
                    for ic in 0..g.in_channels {
                        let w_base = (oc * g.in_channels + ic) * kk;
                        let in_base = ic * in_spatial;
                        for oy in 0..g.out_h {
                            for ox in 0..g.out_w {
                                let grad = dy_b[oc * out_spatial + oy * g.out_w + ox];
                                for ky in 0..g.kernel {
                                    for kx in 0..g.kernel {
                                        if let Some((iy, ix)) = g.input_pos(oy, ox, ky, kx) {
                                            dx_b[in_base + iy * g.in_w + ix] +=
                                                grad * weights[w_base + ky * g.kernel + kx];
                                        }
                                    }
                                }
                            }
                        }
                    }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(in_c: usize, out_c: usize, k: usize, padding: Padding, h: usize, w: usize) -> Conv2DLayer {
        let mut rng = SimpleRng::new(42);
        Conv2DLayer::new(in_c, out_c, k, padding, h, w, &mut rng).unwrap()
    }

    #[test]
    fn test_conv2d_parameter_count() {
        // weights: 32 * 1 * 3 * 3 = 288, biases: 32
        assert_eq!(layer(1, 32, 3, Padding::Valid, 28, 28).parameter_count(), 320);
        // second reference conv: 64 * 32 * 9 + 64
        assert_eq!(layer(32, 64, 3, Padding::Valid, 26, 26).parameter_count(), 18_496);
    }

    #[test]
    fn test_conv2d_output_dimensions() {
        let valid = layer(1, 8, 3, Padding::Valid, 28, 28);
        assert_eq!((valid.output_height(), valid.output_width()), (26, 26));

        let same = layer(1, 8, 3, Padding::Same, 28, 28);
        assert_eq!((same.output_height(), same.output_width()), (28, 28));
    }

    #[test]
    fn test_conv2d_rejects_invalid_settings() {
        let mut rng = SimpleRng::new(1);
        assert!(Conv2DLayer::new(1, 8, 0, Padding::Valid, 28, 28, &mut rng).is_err());
        assert!(Conv2DLayer::new(1, 8, 2, Padding::Same, 28, 28, &mut rng).is_err());
        assert!(Conv2DLayer::new(1, 8, 5, Padding::Valid, 4, 4, &mut rng).is_err());
        assert!(Conv2DLayer::new(0, 8, 3, Padding::Valid, 28, 28, &mut rng).is_err());
    }

    #[test]
    fn test_conv2d_xavier_initialization_bounds() {
        let layer = layer(1, 8, 3, Padding::Valid, 28, 28);
        let limit = (6.0f32 / (9.0 + 72.0)).sqrt();

        assert!(layer.weights.iter().all(|w| w.abs() <= limit));
        assert!(layer.biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_conv2d_known_values() {
        // 1x3x3 input, single 2x2 kernel of ones, bias 0.5
        let mut conv = layer(1, 1, 2, Padding::Valid, 3, 3);
        conv.weights = vec![1.0; 4];
        conv.biases = vec![0.5];
        let input = TensorBuffer::from_vec(
            &[1, 1, 3, 3],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        )
        .unwrap();

        let out = conv.forward(&input, &mut ForwardMode::Infer).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2, 2]);
        assert_eq!(out.data(), &[12.5, 16.5, 24.5, 28.5]);
    }

    #[test]
    fn test_conv2d_backward_accumulates_and_zeroes() {
        let mut conv = layer(1, 2, 3, Padding::Valid, 5, 5);
        let input = TensorBuffer::filled(&[2, 1, 5, 5], 1.0);
        let grad = TensorBuffer::filled(&[2, 2, 3, 3], 1.0);

        let dx = conv.backward(&input, &grad).unwrap();
        assert_eq!(dx.shape(), input.shape());
        // 2 samples x 9 output positions per channel
        assert_eq!(conv.grad_biases, vec![18.0, 18.0]);
        assert!(conv.grad_weights.iter().all(|&g| g == 18.0));

        conv.zero_grad();
        assert!(conv.grad_weights.iter().all(|&g| g == 0.0));
        assert!(conv.grad_biases.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_conv2d_wrong_input_shape() {
        let mut conv = layer(1, 2, 3, Padding::Valid, 5, 5);
        let input = TensorBuffer::zeros(&[1, 1, 6, 6]);
        let err = conv.forward(&input, &mut ForwardMode::Infer).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_conv2d_deterministic_initialization() {
        let a = layer(3, 16, 5, Padding::Same, 32, 32);
        let b = layer(3, 16, 5, Padding::Same, 32, 32);
        assert_eq!(a.weights, b.weights);
    }
}
