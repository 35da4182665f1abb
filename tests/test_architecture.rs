//! Tests for architecture parsing and building
//!
//! This file tests the architecture module including:
//! - Loading the bundled JSON architecture configs
//! - Building networks and tracking shapes between layers
//! - Handling invalid JSON and missing files
//! - Reporting the failing layer for incompatible stacks

use mnist_convnet::architecture::{load_architecture, ArchitectureConfig, LayerConfig};
use mnist_convnet::config::ModelConfig;
use mnist_convnet::layers::{ForwardMode, Padding};
use mnist_convnet::tensor::TensorBuffer;
use mnist_convnet::utils::SimpleRng;
use mnist_convnet::Error;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

// ============================================================================
// Valid Architecture Loading Tests
// ============================================================================

mod valid_architecture_tests {
    use super::*;

    #[test]
    fn test_bundled_reference_matches_model_config() {
        let arch = load_architecture("config/architectures/mnist_cnn.json")
            .expect("Failed to load reference architecture");
        assert_eq!(arch, ModelConfig::default().architecture());

        let net = arch.build_network(&mut SimpleRng::new(1)).unwrap();
        assert_eq!(net.parameter_count(), 1_199_882);
    }

    #[test]
    fn test_same_padding_architecture() {
        let arch = load_architecture("config/architectures/small_same_padding.json").unwrap();
        assert_eq!(
            arch.layers[0],
            LayerConfig::Conv2d {
                out_channels: 8,
                kernel_size: 3,
                padding: Padding::Same
            }
        );
        let mut net = arch.build_network(&mut SimpleRng::new(1)).unwrap();
        // conv 8*9+8, dense 8*14*14*10+10
        assert_eq!(net.parameter_count(), 80 + 15_690);

        let x = TensorBuffer::filled(&[2, 1, 28, 28], 0.1);
        let y = net.forward(&x, &mut ForwardMode::Infer).unwrap();
        assert_eq!(y.shape(), &[2, 10]);
    }

    #[test]
    fn test_single_layer_architecture() {
        let file = write_temp_config(
            r#"{ "input_shape": [5], "layers": [ { "layer_type": "dense", "output_size": 2 } ] }"#,
        );
        let arch = load_architecture(file.path()).unwrap();
        let net = arch.build_network(&mut SimpleRng::new(1)).unwrap();
        assert_eq!(net.output_shape(), &[2]);
        assert_eq!(net.parameter_count(), 12);
    }
}

// ============================================================================
// Invalid Architecture Tests
// ============================================================================

mod invalid_architecture_tests {
    use super::*;

    #[test]
    fn test_invalid_json_syntax() {
        let file = write_temp_config(r#"{ "input_shape": [1, 28, 28], "layers": [ "#);
        assert!(matches!(load_architecture(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_unknown_layer_type() {
        let file = write_temp_config(
            r#"{ "input_shape": [8], "layers": [ { "layer_type": "batchnorm" } ] }"#,
        );
        assert!(matches!(load_architecture(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_missing_layer_field() {
        let file = write_temp_config(
            r#"{ "input_shape": [8], "layers": [ { "layer_type": "dense" } ] }"#,
        );
        assert!(matches!(load_architecture(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_empty_layers() {
        let file = write_temp_config(r#"{ "input_shape": [1, 28, 28], "layers": [] }"#);
        assert!(matches!(
            load_architecture(file.path()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_architecture("config/architectures/nope.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_conv_after_flatten_reports_layer() {
        let arch = ArchitectureConfig {
            input_shape: vec![1, 8, 8],
            layers: vec![
                LayerConfig::Flatten,
                LayerConfig::Conv2d {
                    out_channels: 2,
                    kernel_size: 3,
                    padding: Padding::Valid,
                },
            ],
        };
        let err = arch.build_network(&mut SimpleRng::new(1)).unwrap_err();
        assert!(matches!(err, Error::Layer { index: 1, name: "conv2d", .. }));
        assert!(matches!(err.root(), Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_invalid_dropout_rate_reports_layer() {
        let arch = ArchitectureConfig {
            input_shape: vec![4],
            layers: vec![
                LayerConfig::Dropout { drop_rate: 1.5 },
                LayerConfig::Dense { output_size: 2 },
            ],
        };
        let err = arch.build_network(&mut SimpleRng::new(1)).unwrap_err();
        assert!(matches!(err, Error::Layer { index: 0, name: "dropout", .. }));
        assert!(matches!(err.root(), Error::InvalidConfiguration(_)));
    }
}
