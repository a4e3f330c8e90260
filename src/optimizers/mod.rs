//! Optimizer abstractions for neural network parameter updates
//!
//! Optimizers define how gradients move parameters. Per-parameter statistics
//! (such as RMSProp's running squared-gradient average) live next to the
//! parameters they describe inside each [`crate::layers::Node`], so the
//! optimizer objects themselves only carry hyperparameters and can be shared
//! across every node of a network.
//!
//! # Available Optimizers
//!
//! - [`Sgd`]: plain gradient step, used by the immediate (online) update path
//! - [`RmsProp`]: clipped RMSProp, used when applying accumulated batch gradients
//!
//! # Example
//!
//! ```
//! use iml_mapper::optimizers::{Optimizer, RmsProp};
//!
//! let optimizer = RmsProp::new(0.1);
//! let mut weights = vec![0.5, -0.5];
//! let mut sq_avg = vec![0.0, 0.0];
//! optimizer.update(&mut weights, &[1.0, -1.0], 1.0, &mut sq_avg);
//! assert!(weights[0] < 0.5);
//! assert!(weights[1] > -0.5);
//! ```

pub mod rmsprop;
pub mod sgd;

pub use rmsprop::RmsProp;
pub use sgd::Sgd;

/// Core trait for parameter update rules.
pub trait Optimizer {
    /// Update parameters in place from their gradients.
    ///
    /// # Arguments
    ///
    /// * `parameters` - Parameters to update (weights or a single bias)
    /// * `gradients` - Gradient of the loss with respect to each parameter
    /// * `gradient_scale` - Multiplier applied to every gradient first, e.g. `1 / batch_size`
    /// * `state` - Per-parameter optimizer state; may be empty for stateless rules
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &[f32],
        gradient_scale: f32,
        state: &mut [f32],
    );

    /// Base learning rate.
    fn learning_rate(&self) -> f32;
}
