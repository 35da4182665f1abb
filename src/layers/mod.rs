//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the layer types used by the MNIST
//! network: convolution, activations, max pooling, dropout, flatten and dense.

mod r#trait;
pub mod activation;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod flatten;
pub mod pooling;

// Re-export the Layer trait for convenience
pub use r#trait::{ForwardMode, Layer, Parameter};
pub use activation::{ActivationKind, ActivationLayer};
pub use conv2d::{Conv2DLayer, Padding};
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use flatten::FlattenLayer;
pub use pooling::MaxPool2DLayer;
