//! Dense N-dimensional f32 storage
//!
//! `TensorBuffer` is the value every layer consumes and produces. Storage is a
//! contiguous row-major `Vec<f32>`; the first dimension is the batch dimension
//! wherever a buffer travels through a network.
//!
//! Operations come in two flavours:
//! - out-of-place (`add`, `sub`, `mul`, `scale`, `map`) return a new buffer
//!   and leave `self` untouched;
//! - in-place (`add_assign`, `mul_assign`, `scale_inplace`) mutate `self`.

use crate::error::{Error, Result};

/// Contiguous f32 array with shape metadata.
///
/// Invariant: `data.len() == shape.iter().product()`.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl TensorBuffer {
    /// Zero-filled buffer of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Buffer of the given shape with every element set to `value`.
    pub fn filled(shape: &[usize], value: f32) -> Self {
        Self {
            data: vec![value; shape.iter().product()],
            shape: shape.to_vec(),
        }
    }

    /// Wrap existing storage. Fails if `data.len()` disagrees with `shape`.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::shape("tensor construction", shape, &[data.len()]));
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Size of the leading (batch) dimension; 0 for a rank-0 buffer.
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of elements per sample (product of all but the first dimension).
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Borrow the elements of sample `index` along the batch dimension, or
    /// `None` past the end of the batch.
    pub fn sample(&self, index: usize) -> Option<&[f32]> {
        if index >= self.batch_size() {
            return None;
        }
        let len = self.sample_len();
        self.data.get(index * len..(index + 1) * len)
    }

    /// Reinterpret the storage under a new shape.
    ///
    /// Consumes the buffer so the storage is reused rather than copied.
    pub fn reshape(self, new_shape: &[usize]) -> Result<Self> {
        let expected: usize = new_shape.iter().product();
        if expected != self.data.len() {
            return Err(Error::shape("reshape", new_shape, &self.shape));
        }
        Ok(Self {
            data: self.data,
            shape: new_shape.to_vec(),
        })
    }

    /// True if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Elementwise sum, broadcasting `other` over leading dimensions.
    pub fn add(&self, other: &TensorBuffer) -> Result<TensorBuffer> {
        self.zip_broadcast(other, "add", |a, b| a + b)
    }

    /// Elementwise difference, broadcasting `other` over leading dimensions.
    pub fn sub(&self, other: &TensorBuffer) -> Result<TensorBuffer> {
        self.zip_broadcast(other, "sub", |a, b| a - b)
    }

    /// Elementwise product, broadcasting `other` over leading dimensions.
    pub fn mul(&self, other: &TensorBuffer) -> Result<TensorBuffer> {
        self.zip_broadcast(other, "mul", |a, b| a * b)
    }

    /// New buffer with every element multiplied by `factor`.
    pub fn scale(&self, factor: f32) -> TensorBuffer {
        self.map(|v| v * factor)
    }

    /// New buffer with `f` applied to every element.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> TensorBuffer {
        TensorBuffer {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// In-place elementwise sum.
    pub fn add_assign(&mut self, other: &TensorBuffer) -> Result<()> {
        self.zip_broadcast_inplace(other, "add_assign", |a, b| *a += b)
    }

    /// In-place elementwise product.
    pub fn mul_assign(&mut self, other: &TensorBuffer) -> Result<()> {
        self.zip_broadcast_inplace(other, "mul_assign", |a, b| *a *= b)
    }

    /// In-place scaling.
    pub fn scale_inplace(&mut self, factor: f32) {
        for v in self.data.iter_mut() {
            *v *= factor;
        }
    }

    // Shapes broadcast when they are equal or when `other` is a trailing
    // suffix of `self`, in which case `other` is tiled over the leading dims.
    fn check_broadcast(&self, other: &TensorBuffer, op: &str) -> Result<()> {
        let compatible = other.shape.len() <= self.shape.len()
            && self.shape[self.shape.len() - other.shape.len()..] == other.shape[..];
        if compatible {
            Ok(())
        } else {
            Err(Error::shape(op, &self.shape, &other.shape))
        }
    }

    fn zip_broadcast(
        &self,
        other: &TensorBuffer,
        op: &str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<TensorBuffer> {
        self.check_broadcast(other, op)?;
        let period = other.data.len().max(1);
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, &a)| f(a, other.data[i % period]))
            .collect();
        Ok(TensorBuffer {
            data,
            shape: self.shape.clone(),
        })
    }

    fn zip_broadcast_inplace(
        &mut self,
        other: &TensorBuffer,
        op: &str,
        f: impl Fn(&mut f32, f32),
    ) -> Result<()> {
        self.check_broadcast(other, op)?;
        let period = other.data.len().max(1);
        for (i, a) in self.data.iter_mut().enumerate() {
            f(a, other.data[i % period]);
        }
        Ok(())
    }
}
