// Gradient checks for activation functions using finite differences.
// Analytical derivatives must match central differences away from kinks.

use approx::assert_relative_eq;
use iml_mapper::utils::Activation;

const H: f32 = 1e-3;

// Central difference approximation of f'(x).
fn numerical_derivative(activation: Activation, x: f32) -> f32 {
    (activation.apply(x + H) - activation.apply(x - H)) / (2.0 * H)
}

fn check(activation: Activation, points: &[f32]) {
    for &x in points {
        let analytical = activation.derivative(x);
        let numerical = numerical_derivative(activation, x);
        assert_relative_eq!(analytical, numerical, epsilon = 2e-3);
    }
}

// ============================================================================
// Smooth Activations
// ============================================================================

mod smooth_activation_tests {
    use super::*;

    #[test]
    fn test_sigmoid_gradient() {
        check(Activation::Sigmoid, &[-4.0, -1.0, 0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_tanh_gradient() {
        check(Activation::Tanh, &[-2.0, -0.3, 0.0, 0.8, 2.0]);
    }

    #[test]
    fn test_linear_gradient() {
        check(Activation::Linear, &[-5.0, 0.0, 5.0]);
    }
}

// ============================================================================
// Piecewise Activations (points chosen away from the breakpoints)
// ============================================================================

mod piecewise_activation_tests {
    use super::*;

    #[test]
    fn test_leaky_relu_gradient() {
        check(Activation::LeakyRelu, &[-3.0, -0.5, 0.5, 3.0]);
    }

    #[test]
    fn test_hard_sigmoid_gradient() {
        check(Activation::HardSigmoid, &[-5.0, -1.0, 0.0, 2.0, 5.0]);
    }

    #[test]
    fn test_hard_swish_gradient() {
        check(Activation::HardSwish, &[-5.0, -2.0, -0.5, 1.0, 2.5, 5.0]);
    }

    #[test]
    fn test_hard_tanh_gradient() {
        check(Activation::HardTanh, &[-2.0, -0.5, 0.0, 0.5, 2.0]);
    }
}
