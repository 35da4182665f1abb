//! Error types shared by every module of the crate.

use crate::trainer::EpochMetrics;
use thiserror::Error;

/// Errors surfaced by tensor operations, layers, configuration and training.
#[derive(Debug, Error)]
pub enum Error {
    /// Two shapes that must agree do not.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A hyperparameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The training or validation loss became NaN or infinite.
    ///
    /// For a validation loss, `batch` is the number of batches the epoch ran.
    /// `last_finite` holds the metrics of the last epoch that completed with a
    /// finite loss, if any.
    #[error("non-finite loss {loss} at epoch {epoch}, batch {batch}")]
    NumericInstability {
        epoch: usize,
        batch: usize,
        loss: f32,
        last_finite: Option<Box<EpochMetrics>>,
    },

    /// An error raised by a specific layer of a network.
    #[error("layer {index} ({name}): {source}")]
    Layer {
        index: usize,
        name: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a `ShapeMismatch` error.
    pub fn shape(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Build an `InvalidConfiguration` error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration(message.into())
    }

    /// Attach the position and name of the layer that raised this error.
    pub fn at_layer(self, index: usize, name: &'static str) -> Self {
        Error::Layer {
            index,
            name,
            source: Box::new(self),
        }
    }

    /// Strip any `Layer` wrappers and return the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Layer { source, .. } => source.root(),
            other => other,
        }
    }
}
