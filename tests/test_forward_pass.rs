// Integration tests for forward shapes through individual layers and the
// reference MNIST network.

use mnist_convnet::config::ModelConfig;
use mnist_convnet::data::synthetic_digits;
use mnist_convnet::layers::{
    ActivationLayer, Conv2DLayer, DenseLayer, DropoutLayer, FlattenLayer, ForwardMode, Layer,
    MaxPool2DLayer, Padding,
};
use mnist_convnet::tensor::TensorBuffer;
use mnist_convnet::utils::SimpleRng;
use mnist_convnet::Error;

// ============================================================================
// Per-layer output shapes
// ============================================================================

mod layer_shape_tests {
    use super::*;

    #[test]
    fn test_conv2d_valid_shrinks_by_kernel() {
        let mut rng = SimpleRng::new(1);
        let mut conv = Conv2DLayer::new(1, 4, 3, Padding::Valid, 28, 28, &mut rng).unwrap();
        assert_eq!(conv.output_shape(&[1, 28, 28]).unwrap(), vec![4, 26, 26]);

        let x = TensorBuffer::filled(&[2, 1, 28, 28], 0.5);
        let y = conv.forward(&x, &mut ForwardMode::Infer).unwrap();
        assert_eq!(y.shape(), &[2, 4, 26, 26]);
    }

    #[test]
    fn test_conv2d_same_keeps_size() {
        let mut rng = SimpleRng::new(1);
        let conv = Conv2DLayer::new(3, 2, 5, Padding::Same, 9, 7, &mut rng).unwrap();
        assert_eq!(conv.output_shape(&[3, 9, 7]).unwrap(), vec![2, 9, 7]);
    }

    #[test]
    fn test_max_pool_floors_odd_sizes() {
        let pool = MaxPool2DLayer::new(2, 2).unwrap();
        assert_eq!(pool.output_shape(&[64, 24, 24]).unwrap(), vec![64, 12, 12]);
        assert_eq!(pool.output_shape(&[1, 5, 7]).unwrap(), vec![1, 2, 3]);

        let pool3 = MaxPool2DLayer::new(3, 2).unwrap();
        assert_eq!(pool3.output_shape(&[2, 7, 7]).unwrap(), vec![2, 2, 3]);
    }

    #[test]
    fn test_flatten_and_dense() {
        let mut rng = SimpleRng::new(1);
        let flatten = FlattenLayer::new();
        assert_eq!(flatten.output_shape(&[64, 12, 12]).unwrap(), vec![9216]);

        let dense = DenseLayer::new(9216, 128, &mut rng).unwrap();
        assert_eq!(dense.output_shape(&[9216]).unwrap(), vec![128]);
        assert!(matches!(
            dense.output_shape(&[100]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_shape_preserving_layers() {
        let relu = ActivationLayer::relu();
        let dropout = DropoutLayer::new(0.25).unwrap();
        assert_eq!(relu.output_shape(&[4, 5, 5]).unwrap(), vec![4, 5, 5]);
        assert_eq!(dropout.output_shape(&[4, 5, 5]).unwrap(), vec![4, 5, 5]);
        assert!(ActivationLayer::softmax().output_shape(&[4, 5, 5]).is_err());
    }

    #[test]
    fn test_softmax_rows_are_probability_distributions() {
        let mut softmax = ActivationLayer::softmax();
        let mut rng = SimpleRng::new(2);
        let data = (0..40).map(|_| rng.gen_range_f32(-20.0, 20.0)).collect();
        let x = TensorBuffer::from_vec(&[4, 10], data).unwrap();
        let y = softmax.forward(&x, &mut ForwardMode::Infer).unwrap();
        for row in y.data().chunks(10) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {}", sum);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }
}

// ============================================================================
// Reference network
// ============================================================================

mod reference_network_tests {
    use super::*;

    #[test]
    fn test_reference_parameter_count() {
        let config = ModelConfig::default();
        let net = config.build_network(&mut SimpleRng::new(1)).unwrap();
        // conv 320 + conv 18,496 + dense 1,179,776 + dense 1,290
        assert_eq!(net.parameter_count(), 1_199_882);
        assert_eq!(net.len(), 12);
        assert_eq!(net.input_shape(), &[1, 28, 28]);
        assert_eq!(net.output_shape(), &[10]);
        assert!(net.summary().contains("total params: 1199882"));

        let names: Vec<&str> = net.layers().iter().map(|l| l.name()).collect();
        assert_eq!(
            names,
            vec![
                "conv2d",
                "relu",
                "conv2d",
                "relu",
                "max_pool2d",
                "dropout",
                "flatten",
                "dense",
                "relu",
                "dropout",
                "dense",
                "softmax",
            ]
        );
    }

    #[test]
    fn test_reference_forward_produces_distributions() {
        let config = ModelConfig::default();
        let mut net = config.build_network(&mut SimpleRng::new(1)).unwrap();
        let data = synthetic_digits(3, &mut SimpleRng::new(2));
        let batch = data.batch(&[0, 1, 2]).unwrap();

        let probs = net.predict(&batch.images).unwrap();
        assert_eq!(probs.shape(), &[3, 10]);
        let first = probs.sample(0).unwrap().to_vec();
        let flat = probs.into_vec();
        assert_eq!(&flat[..10], first.as_slice());
        for row in flat.chunks(10) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_wrong_input_shape_is_rejected() {
        let config = ModelConfig {
            num_filters: 4,
            dense_units: 8,
            ..ModelConfig::default()
        };
        let mut net = config.build_network(&mut SimpleRng::new(1)).unwrap();
        let x = TensorBuffer::zeros(&[2, 1, 27, 28]);
        assert!(matches!(net.predict(&x), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let config = ModelConfig {
            num_filters: 4,
            dense_units: 8,
            ..ModelConfig::default()
        };
        let mut a = config.build_network(&mut SimpleRng::new(5)).unwrap();
        let mut b = config.build_network(&mut SimpleRng::new(5)).unwrap();
        let x = TensorBuffer::filled(&[1, 1, 28, 28], 0.3);
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }
}
