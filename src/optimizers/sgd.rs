//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Performs the basic gradient descent update:
//! `parameter = parameter - learning_rate * gradient`

use crate::optimizers::Optimizer;

/// Stochastic Gradient Descent optimizer.
///
/// `w = w - η * ∇L/∂w`
///
/// Used for the immediate per-example update, where the gradient of a weight is
/// `-(error_signal * input)` and is applied as soon as it is computed.
///
/// # Example
///
/// ```
/// use iml_mapper::optimizers::{Optimizer, Sgd};
///
/// let optimizer = Sgd::new(0.1);
/// let mut params = vec![1.0, 2.0, 3.0];
/// optimizer.update(&mut params, &[0.1, 0.2, 0.3], 1.0, &mut []);
/// assert!((params[0] - 0.99).abs() < 1e-6);
/// assert!((params[2] - 2.97).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    /// Creates a new SGD optimizer with the specified learning rate.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    /// Pairs parameters with gradients element-wise; any surplus in the longer
    /// slice is ignored. SGD keeps no state.
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &[f32],
        gradient_scale: f32,
        _state: &mut [f32],
    ) {
        for (param, grad) in parameters.iter_mut().zip(gradients) {
            *param -= self.learning_rate * grad * gradient_scale;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
