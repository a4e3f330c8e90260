//! RMSProp optimizer with gradient and step clamping.
//!
//! The update keeps a running average of squared gradients per parameter and
//! divides each step by its square root. Every intermediate is clamped so a
//! single bad batch cannot blow the weights up:
//!
//! ```text
//! g      = clamp(grad * scale, -10, 10)
//! sq     = min(0.9 * sq + 0.1 * g², 1e6)
//! lr_eff = min(lr / (sqrt(sq) + 1e-6), 1)
//! w      = w - lr_eff * g
//! ```

use crate::optimizers::Optimizer;

/// Absolute bound on a scaled gradient before it enters the average.
pub const GRADIENT_CLAMP: f32 = 10.0;
/// Weight given to the previous squared-gradient average.
pub const DECAY: f32 = 0.9;
pub const EPSILON: f32 = 1e-6;
/// Upper bound on the running squared-gradient average.
pub const MAX_SQ_AVG: f32 = 1e6;
/// Upper bound on the per-parameter effective learning rate.
pub const MAX_EFFECTIVE_LR: f32 = 1.0;

/// RMSProp optimizer.
///
/// The squared-gradient averages are owned by the caller and passed in as
/// `state`, one entry per parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmsProp {
    learning_rate: f32,
}

impl RmsProp {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    /// One clamped RMSProp step for a single parameter.
    pub fn step(&self, param: &mut f32, gradient: f32, sq_avg: &mut f32) {
        let g = gradient.clamp(-GRADIENT_CLAMP, GRADIENT_CLAMP);
        *sq_avg = (DECAY * *sq_avg + (1.0 - DECAY) * g * g).min(MAX_SQ_AVG);
        let lr_eff = (self.learning_rate / (sq_avg.sqrt() + EPSILON)).min(MAX_EFFECTIVE_LR);
        *param -= lr_eff * g;
    }
}

impl Optimizer for RmsProp {
    /// Steps each parameter with its gradient and squared-average slot; the
    /// three slices are paired element-wise and any surplus is ignored.
    fn update(
        &self,
        parameters: &mut [f32],
        gradients: &[f32],
        gradient_scale: f32,
        state: &mut [f32],
    ) {
        let slots = parameters
            .iter_mut()
            .zip(gradients)
            .zip(state.iter_mut());
        for ((param, &grad), sq_avg) in slots {
            self.step(param, grad * gradient_scale, sq_avg);
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_from_zero_state() {
        let optimizer = RmsProp::new(0.01);
        let mut w = 1.0;
        let mut sq = 0.0;
        optimizer.step(&mut w, 2.0, &mut sq);

        // sq = 0.1 * 4 = 0.4, lr_eff = 0.01 / (sqrt(0.4) + 1e-6)
        assert!((sq - 0.4).abs() < 1e-6);
        let lr_eff = 0.01 / (0.4f32.sqrt() + EPSILON);
        assert!((w - (1.0 - lr_eff * 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_is_clamped() {
        let optimizer = RmsProp::new(0.01);
        let mut w = 0.0;
        let mut sq = 0.0;
        optimizer.step(&mut w, 1e9, &mut sq);
        assert!((sq - 0.1 * GRADIENT_CLAMP * GRADIENT_CLAMP).abs() < 1e-3);
        assert!(w.is_finite());
    }

    #[test]
    fn test_effective_rate_capped() {
        // Tiny gradient with a large learning rate would step far past 1 * g.
        let optimizer = RmsProp::new(100.0);
        let mut w = 0.0;
        let mut sq = 0.0;
        optimizer.step(&mut w, 1e-4, &mut sq);
        assert!((w + 1e-4).abs() < 1e-9);
    }

    #[test]
    fn test_update_applies_scale() {
        let optimizer = RmsProp::new(0.01);
        let mut a = vec![0.0];
        let mut sa = vec![0.0];
        optimizer.update(&mut a, &[4.0], 0.25, &mut sa);

        let mut b = 0.0;
        let mut sb = 0.0;
        optimizer.step(&mut b, 1.0, &mut sb);
        assert_eq!(a[0], b);
        assert_eq!(sa[0], sb);
    }
}
