//! Forward pass tests for layers and whole networks
//!
//! Weights are set explicitly so every expected output can be computed by hand.

use approx::assert_relative_eq;
use iml_mapper::layers::DenseLayer;
use iml_mapper::utils::{sigmoid, Activation, Loss};
use iml_mapper::{Mlp, MlpError};

// 2 -> 2 (linear) -> 1 (sigmoid), all biases zero.
fn hand_built_network(loss: Loss) -> Mlp {
    let mut mlp = Mlp::new(&[2, 2, 1], &[Activation::Linear, Activation::Sigmoid], loss, Some(1))
        .unwrap();
    mlp.set_weights(&vec![
        vec![vec![1.0, -1.0], vec![0.5, 0.5]],
        vec![vec![2.0, 1.0]],
    ])
    .unwrap();
    mlp
}

// ============================================================================
// Layer Forward Tests
// ============================================================================

mod layer_forward_tests {
    use super::*;

    #[test]
    fn test_zeroed_layer_outputs_activation_of_zero() {
        let mut layer = DenseLayer::zeroed(3, 2, Activation::Sigmoid);
        let mut out = Vec::new();
        layer.forward(&[1.0, 2.0, 3.0], &mut out).unwrap();
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn test_leaky_relu_layer() {
        let mut layer = DenseLayer::zeroed(2, 1, Activation::LeakyRelu);
        layer.set_weights(&[vec![-1.0, -1.0]]).unwrap();
        let mut out = Vec::new();
        layer.forward(&[1.0, 1.0], &mut out).unwrap();
        assert_relative_eq!(out[0], -0.02, epsilon = 1e-7);
        assert_relative_eq!(layer.nodes()[0].pre_activation(), -2.0);
    }

    #[test]
    fn test_wrong_width_leaves_output_untouched() {
        let mut layer = DenseLayer::zeroed(2, 1, Activation::Linear);
        let mut out = vec![9.0];
        let err = layer.forward(&[1.0], &mut out).unwrap_err();
        assert!(matches!(err, MlpError::InputSize { expected: 2, actual: 1 }));
        assert_eq!(out, vec![9.0]);
    }

    #[test]
    fn test_output_cache() {
        let mut layer = DenseLayer::zeroed(1, 2, Activation::Linear);
        layer.set_weights(&[vec![2.0], vec![3.0]]).unwrap();
        let mut out = Vec::new();
        layer.forward(&[1.0], &mut out).unwrap();
        assert!(layer.cached_outputs().is_empty());

        layer.set_cache_outputs(true);
        layer.forward(&[1.0], &mut out).unwrap();
        assert_eq!(layer.cached_outputs(), &[2.0, 3.0]);

        layer.set_cache_outputs(false);
        assert!(layer.cached_outputs().is_empty());
    }
}

// ============================================================================
// Network Forward Tests
// ============================================================================

mod network_forward_tests {
    use super::*;

    #[test]
    fn test_hand_computed_output() {
        let mut mlp = hand_built_network(Loss::MeanSquaredError);
        // hidden = [0.2 - 0.4, 0.1 + 0.2] = [-0.2, 0.3]; out = sigmoid(-0.4 + 0.3)
        let out = mlp.predict(&[0.2, 0.4]).unwrap();
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0], sigmoid(-0.1), epsilon = 1e-6);
    }

    #[test]
    fn test_records_one_activation_per_layer() {
        let mut mlp = hand_built_network(Loss::MeanSquaredError);
        let mut out = Vec::new();
        let mut activations = vec![vec![42.0]];
        mlp.forward(&[0.2, 0.4], &mut out, Some(&mut activations), false)
            .unwrap();
        assert_eq!(activations.len(), 2);
        assert_eq!(activations[0], vec![0.2, 0.4]);
        assert_relative_eq!(activations[1][0], -0.2, epsilon = 1e-6);
        assert_relative_eq!(activations[1][1], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_input_width() {
        let mut mlp = hand_built_network(Loss::MeanSquaredError);
        let mut out = vec![1.0, 2.0];
        assert!(mlp.forward(&[0.1], &mut out, None, true).is_err());
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn test_softmax_only_for_cross_entropy_inference() {
        let weights = vec![vec![vec![1.0], vec![2.0], vec![3.0]]];

        let mut cce = Mlp::new(
            &[1, 3],
            &[Activation::Linear],
            Loss::CategoricalCrossEntropy,
            Some(1),
        )
        .unwrap();
        cce.set_weights(&weights).unwrap();
        let probs = cce.predict(&[1.0]).unwrap();
        assert_relative_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_eq!(Mlp::output_class(&probs), 2);

        let mut logits = Vec::new();
        cce.forward(&[1.0], &mut logits, None, false).unwrap();
        assert_eq!(logits, vec![1.0, 2.0, 3.0]);

        let mut mse = Mlp::new(&[1, 3], &[Activation::Linear], Loss::MeanSquaredError, Some(1))
            .unwrap();
        mse.set_weights(&weights).unwrap();
        assert_eq!(mse.predict(&[1.0]).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_single_output_cross_entropy_skips_softmax() {
        let mut mlp = Mlp::new(
            &[1, 1],
            &[Activation::Linear],
            Loss::CategoricalCrossEntropy,
            Some(1),
        )
        .unwrap();
        mlp.set_weights(&vec![vec![vec![4.0]]]).unwrap();
        assert_eq!(mlp.predict(&[1.0]).unwrap(), vec![4.0]);
    }

    #[test]
    fn test_cached_layer_outputs() {
        let mut mlp = hand_built_network(Loss::MeanSquaredError);
        mlp.set_cached_layer_outputs(true);
        mlp.predict(&[0.2, 0.4]).unwrap();
        assert_eq!(mlp.layers()[0].cached_outputs().len(), 2);
        assert_eq!(mlp.layers()[1].cached_outputs().len(), 1);
    }
}
