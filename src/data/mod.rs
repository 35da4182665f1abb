//! In-memory datasets and batching
//!
//! A `Dataset` holds normalised images and integer labels. Decoding any
//! on-disk distribution format is left to the caller: hand the raw `u8`
//! pixels to [`Dataset::from_u8_pixels`], which performs the usual MNIST
//! preprocessing (reshape to `[1, 28, 28]`, scale to `[0, 1]`).

pub mod synthetic;

pub use synthetic::synthetic_digits;

use crate::error::{Error, Result};
use crate::tensor::TensorBuffer;

/// MNIST image height.
pub const IMG_H: usize = 28;
/// MNIST image width.
pub const IMG_W: usize = 28;
/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

/// Labelled samples with a fixed per-sample shape.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Vec<f32>,
    labels: Vec<u8>,
    sample_shape: Vec<usize>,
    num_classes: usize,
}

/// One materialised mini-batch.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[n, sample_shape...]`
    pub images: TensorBuffer,
    /// One-hot targets, `[n, num_classes]`
    pub targets: TensorBuffer,
    pub labels: Vec<u8>,
}

impl Dataset {
    /// Build a dataset from already-normalised images.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `images` does not hold exactly one sample per label,
    /// `InvalidConfiguration` for a label outside `0..num_classes`.
    pub fn new(
        images: Vec<f32>,
        labels: Vec<u8>,
        sample_shape: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        let sample_len: usize = sample_shape.iter().product();
        if images.len() != labels.len() * sample_len {
            return Err(Error::shape(
                "dataset images",
                &[labels.len() * sample_len],
                &[images.len()],
            ));
        }
        if let Some((index, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, &l)| l as usize >= num_classes)
        {
            return Err(Error::config(format!(
                "label {} at index {} is outside 0..{}",
                label, index, num_classes
            )));
        }
        Ok(Self {
            images,
            labels,
            sample_shape: sample_shape.to_vec(),
            num_classes,
        })
    }

    /// Build a dataset from raw 8-bit pixels, scaling them to `[0, 1]`.
    pub fn from_u8_pixels(
        pixels: &[u8],
        labels: Vec<u8>,
        sample_shape: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        let images = pixels.iter().map(|&p| p as f32 / 255.0).collect();
        Self::new(images, labels, sample_shape, num_classes)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sample_shape(&self) -> &[usize] {
        &self.sample_shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    fn sample_len(&self) -> usize {
        self.sample_shape.iter().product()
    }

    /// Image and label of sample `index`.
    pub fn sample(&self, index: usize) -> Option<(&[f32], u8)> {
        let len = self.sample_len();
        let label = *self.labels.get(index)?;
        Some((&self.images[index * len..(index + 1) * len], label))
    }

    /// Gather the samples at `indices` into one batch.
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        let len = self.sample_len();
        let mut images = Vec::with_capacity(indices.len() * len);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            let (image, label) = self.sample(i).ok_or_else(|| {
                Error::config(format!("sample index {} out of range 0..{}", i, self.len()))
            })?;
            images.extend_from_slice(image);
            labels.push(label);
        }

        let mut shape = vec![indices.len()];
        shape.extend_from_slice(&self.sample_shape);
        Ok(Batch {
            images: TensorBuffer::from_vec(&shape, images)?,
            targets: one_hot(&labels, self.num_classes)?,
            labels,
        })
    }

    /// Split off the last `holdout` samples as a second dataset.
    pub fn split(mut self, holdout: usize) -> Result<(Dataset, Dataset)> {
        if holdout > self.len() {
            return Err(Error::config(format!(
                "cannot hold out {} of {} samples",
                holdout,
                self.len()
            )));
        }
        let keep = self.len() - holdout;
        let tail_images = self.images.split_off(keep * self.sample_len());
        let tail_labels = self.labels.split_off(keep);
        let tail = Dataset {
            images: tail_images,
            labels: tail_labels,
            sample_shape: self.sample_shape.clone(),
            num_classes: self.num_classes,
        };
        Ok((self, tail))
    }
}

/// Encode integer labels as rows of a `[n, num_classes]` one-hot tensor.
pub fn one_hot(labels: &[u8], num_classes: usize) -> Result<TensorBuffer> {
    let mut out = TensorBuffer::zeros(&[labels.len(), num_classes]);
    for (row, &label) in labels.iter().enumerate() {
        let class = label as usize;
        if class >= num_classes {
            return Err(Error::config(format!(
                "label {} is outside 0..{}",
                label, num_classes
            )));
        }
        out.data_mut()[row * num_classes + class] = 1.0;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Dataset {
        let images = (0..12).map(|v| v as f32).collect();
        Dataset::new(images, vec![0, 1, 2], &[1, 2, 2], 3).unwrap()
    }

    #[test]
    fn test_one_hot() {
        let t = one_hot(&[2, 0], 3).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.data(), &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        let err = Dataset::new(vec![0.0; 4], vec![0, 10], &[2], 10).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rejects_wrong_image_count() {
        assert!(Dataset::new(vec![0.0; 5], vec![0, 1], &[2], 10).is_err());
    }

    #[test]
    fn test_from_u8_pixels_normalises() {
        let ds = Dataset::from_u8_pixels(&[0, 255, 51, 102], vec![4], &[1, 2, 2], 10).unwrap();
        let (image, label) = ds.sample(0).unwrap();
        assert_eq!(label, 4);
        assert_eq!(image, &[0.0, 1.0, 0.2, 0.4]);
    }

    #[test]
    fn test_batch_gathers_in_index_order() {
        let ds = tiny();
        let batch = ds.batch(&[2, 0]).unwrap();
        assert_eq!(batch.images.shape(), &[2, 1, 2, 2]);
        assert_eq!(batch.images.data(), &[8.0, 9.0, 10.0, 11.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(batch.labels, vec![2, 0]);
        assert_eq!(batch.targets.data(), &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(ds.batch(&[3]).is_err());
    }

    #[test]
    fn test_split() {
        let (train, holdout) = tiny().split(1).unwrap();
        assert_eq!(train.len(), 2);
        assert_eq!(holdout.len(), 1);
        assert_eq!(holdout.sample(0).unwrap().1, 2);
        assert!(tiny().split(4).is_err());
    }
}
