//! Tests for activation and loss functions
//!
//! This file covers:
//! - Values of every activation at characteristic points
//! - Persisted activation codes and name parsing
//! - Softmax and argmax helpers
//! - Mean squared error and cross-entropy losses

use approx::assert_relative_eq;
use iml_mapper::utils::activations::{argmax, sigmoid, softmax_in_place, LEAKY_RELU_SLOPE};
use iml_mapper::utils::{Activation, Loss};

// ============================================================================
// Activation Values
// ============================================================================

mod activation_value_tests {
    use super::*;

    #[test]
    fn test_sigmoid_symmetry() {
        for &x in &[0.1f32, 1.0, 2.5, 7.0] {
            assert_relative_eq!(sigmoid(x) + sigmoid(-x), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!(sigmoid(50.0) > 0.999_999);
        assert!(sigmoid(-50.0) < 1e-6);
        assert!(sigmoid(-100.0).is_finite());
    }

    #[test]
    fn test_leaky_relu() {
        assert_eq!(Activation::LeakyRelu.apply(2.0), 2.0);
        assert_relative_eq!(Activation::LeakyRelu.apply(-2.0), -2.0 * LEAKY_RELU_SLOPE);
        assert_eq!(Activation::LeakyRelu.derivative(2.0), 1.0);
        assert_eq!(Activation::LeakyRelu.derivative(-2.0), LEAKY_RELU_SLOPE);
    }

    #[test]
    fn test_hard_sigmoid_range() {
        assert_eq!(Activation::HardSigmoid.apply(-10.0), 0.0);
        assert_eq!(Activation::HardSigmoid.apply(10.0), 1.0);
        assert_relative_eq!(Activation::HardSigmoid.apply(0.0), 0.5);
    }

    #[test]
    fn test_hard_swish_pieces() {
        assert_eq!(Activation::HardSwish.apply(-4.0), 0.0);
        assert_eq!(Activation::HardSwish.apply(4.0), 4.0);
        assert_relative_eq!(Activation::HardSwish.apply(1.0), 4.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hard_tanh_clamps() {
        assert_eq!(Activation::HardTanh.apply(3.0), 1.0);
        assert_eq!(Activation::HardTanh.apply(-3.0), -1.0);
        assert_eq!(Activation::HardTanh.apply(0.3), 0.3);
        assert_eq!(Activation::HardTanh.derivative(3.0), 0.0);
    }

    #[test]
    fn test_linear_identity() {
        assert_eq!(Activation::Linear.apply(-3.5), -3.5);
        assert_eq!(Activation::Linear.derivative(-3.5), 1.0);
    }

    #[test]
    fn test_tanh_matches_std() {
        assert_relative_eq!(Activation::Tanh.apply(0.7), 0.7f32.tanh());
    }
}

// ============================================================================
// Codes and Names
// ============================================================================

mod activation_code_tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_and_unique() {
        for (i, activation) in Activation::ALL.iter().enumerate() {
            assert_eq!(activation.code(), i as u32);
            assert_eq!(Activation::from_code(i as u32), Some(*activation));
        }
        assert_eq!(Activation::from_code(7), None);
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("relu".parse::<Activation>(), Ok(Activation::LeakyRelu));
        assert_eq!("Sigmoid".parse::<Activation>(), Ok(Activation::Sigmoid));
        assert_eq!("hardswish".parse::<Activation>(), Ok(Activation::HardSwish));
        assert!("gelu".parse::<Activation>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for activation in Activation::ALL {
            assert_eq!(activation.to_string().parse::<Activation>(), Ok(activation));
        }
    }

    #[test]
    fn test_xavier_limits() {
        assert_relative_eq!(Activation::LeakyRelu.xavier_limit(6, 100), 1.0);
        assert_relative_eq!(Activation::Sigmoid.xavier_limit(3, 3), 1.0);
        assert_eq!(Activation::Tanh.xavier_limit(0, 0), 0.0);
    }
}

// ============================================================================
// Softmax and Argmax
// ============================================================================

mod softmax_tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let mut values = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut values);
        assert_relative_eq!(values.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(values[2] > values[1] && values[1] > values[0]);
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let mut values = vec![1000.0, 1000.0];
        softmax_in_place(&mut values);
        assert_relative_eq!(values[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_empty() {
        let mut values: Vec<f32> = Vec::new();
        softmax_in_place(&mut values);
        assert!(values.is_empty());
    }

    #[test]
    fn test_argmax_ties_and_empty() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}

// ============================================================================
// Losses
// ============================================================================

mod loss_tests {
    use super::*;

    #[test]
    fn test_mse_scaled() {
        let mut deriv = vec![0.0; 2];
        let loss = Loss::MeanSquaredError.evaluate(&[1.0, 0.0], &[0.5, 0.5], &mut deriv, 0.5);
        // ((0.25 + 0.25) / 2) * 0.5
        assert_relative_eq!(loss, 0.125, epsilon = 1e-6);
        assert_relative_eq!(deriv[0], -0.25, epsilon = 1e-6);
        assert_relative_eq!(deriv[1], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_confident() {
        let mut deriv = vec![0.0; 3];
        let loss = Loss::CategoricalCrossEntropy.evaluate(
            &[0.0, 1.0, 0.0],
            &[-10.0, 10.0, -10.0],
            &mut deriv,
            1.0,
        );
        assert!(loss < 1e-6);
        assert!(deriv.iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn test_cross_entropy_derivative_sums_to_zero() {
        let mut deriv = vec![0.0; 3];
        Loss::CategoricalCrossEntropy.evaluate(
            &[0.0, 0.0, 1.0],
            &[0.3, -1.2, 2.0],
            &mut deriv,
            1.0,
        );
        assert_relative_eq!(deriv.iter().sum::<f32>(), 0.0, epsilon = 1e-6);
        assert!(deriv[2] < 0.0);
    }
}
