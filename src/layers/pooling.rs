//! 2D max pooling over channel-first feature maps.

use crate::error::{Error, Result};
use crate::layers::r#trait::{expect_batched, ForwardMode, Layer};
use crate::tensor::TensorBuffer;

/// Non-overlapping max pooling (stride equals the pool size).
///
/// Input `[C, H, W]` maps to `[C, H / ph, W / pw]`; trailing rows or columns
/// that do not fill a whole window are dropped. The backward pass routes each
/// output gradient to the first position in scan order that attained the
/// window maximum.
pub struct MaxPool2DLayer {
    pool_height: usize,
    pool_width: usize,
}

impl MaxPool2DLayer {
    pub fn new(pool_height: usize, pool_width: usize) -> Result<Self> {
        if pool_height == 0 || pool_width == 0 {
            return Err(Error::config(format!(
                "max pool size must be positive, got {}x{}",
                pool_height, pool_width
            )));
        }
        Ok(Self {
            pool_height,
            pool_width,
        })
    }

    pub fn pool_size(&self) -> (usize, usize) {
        (self.pool_height, self.pool_width)
    }

    // Flat index (within one channel plane) of the window maximum for output
    // cell (py, px). Strict `>` keeps the first maximum.
    fn window_argmax(&self, plane: &[f32], width: usize, py: usize, px: usize) -> usize {
        let y0 = py * self.pool_height;
        let x0 = px * self.pool_width;
        let mut best = y0 * width + x0;
        for dy in 0..self.pool_height {
            for dx in 0..self.pool_width {
                let idx = (y0 + dy) * width + x0 + dx;
                if plane[idx] > plane[best] {
                    best = idx;
                }
            }
        }
        best
    }

    fn dims(&self, input: &TensorBuffer) -> Result<(usize, usize, usize, usize, usize)> {
        let shape = input.shape();
        if shape.len() != 4 {
            return Err(Error::shape("max_pool2d input rank", &[0, 0, 0, 0], shape));
        }
        let sample = self.output_shape(&shape[1..])?;
        Ok((shape[0], shape[1], shape[2], shape[3], sample[1] * sample[2]))
    }
}

impl Layer for MaxPool2DLayer {
    fn name(&self) -> &'static str {
        "max_pool2d"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match *input_shape {
            [c, h, w] if h >= self.pool_height && w >= self.pool_width => {
                Ok(vec![c, h / self.pool_height, w / self.pool_width])
            }
            _ => Err(Error::shape(
                "max_pool2d input",
                &[0, self.pool_height, self.pool_width],
                input_shape,
            )),
        }
    }

    fn forward(&mut self, input: &TensorBuffer, _mode: &mut ForwardMode<'_>) -> Result<TensorBuffer> {
        let (batch, channels, h, w, _) = self.dims(input)?;
        let (out_h, out_w) = (h / self.pool_height, w / self.pool_width);
        let mut output = TensorBuffer::zeros(&[batch, channels, out_h, out_w]);

        let planes = input.data().chunks_exact(h * w);
        let out_planes = output.data_mut().chunks_exact_mut(out_h * out_w);
        for (plane, out) in planes.zip(out_planes) {
            for py in 0..out_h {
                for px in 0..out_w {
                    out[py * out_w + px] = plane[self.window_argmax(plane, w, py, px)];
                }
            }
        }

        Ok(output)
    }

    fn backward(&mut self, input: &TensorBuffer, grad_output: &TensorBuffer) -> Result<TensorBuffer> {
        let (batch, channels, h, w, out_spatial) = self.dims(input)?;
        let out_h = h / self.pool_height;
        let out_w = w / self.pool_width;
        expect_batched("max_pool2d grad_output", grad_output, &[channels, out_h, out_w])?;
        if grad_output.batch_size() != batch {
            return Err(Error::shape(
                "max_pool2d grad_output batch",
                &[batch],
                &[grad_output.batch_size()],
            ));
        }

        let mut grad_input = TensorBuffer::zeros(input.shape());
        let planes = input.data().chunks_exact(h * w);
        let grad_planes = grad_output.data().chunks_exact(out_spatial);
        let dx_planes = grad_input.data_mut().chunks_exact_mut(h * w);
        for ((plane, g), dx) in planes.zip(grad_planes).zip(dx_planes) {
            for py in 0..out_h {
                for px in 0..out_w {
                    dx[self.window_argmax(plane, w, py, px)] += g[py * out_w + px];
                }
            }
        }

        Ok(grad_input)
    }
}
