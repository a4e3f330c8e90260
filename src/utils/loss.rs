//! Loss functions used to drive training.

use serde::{Deserialize, Serialize};

/// Loss kinds a network can be trained against.
///
/// The loss also decides whether inference applies a softmax to the outputs:
/// only [`Loss::CategoricalCrossEntropy`] does, and only for more than one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[default]
    #[serde(alias = "mse")]
    MeanSquaredError,
    #[serde(alias = "cce")]
    CategoricalCrossEntropy,
}

impl Loss {
    /// Compute the loss and write dL/d(actual) into `deriv`.
    ///
    /// `scale` multiplies both the loss and the derivative; the online trainer
    /// passes `1 / n_samples`, the batch trainer passes 1 and averages later.
    /// `actual` holds raw network outputs (logits for cross-entropy).
    pub fn evaluate(self, expected: &[f32], actual: &[f32], deriv: &mut [f32], scale: f32) -> f32 {
        debug_assert_eq!(expected.len(), actual.len());
        debug_assert_eq!(deriv.len(), actual.len());
        match self {
            Loss::MeanSquaredError => mean_squared_error(expected, actual, deriv, scale),
            Loss::CategoricalCrossEntropy => cross_entropy(expected, actual, deriv, scale),
        }
    }
}

fn mean_squared_error(expected: &[f32], actual: &[f32], deriv: &mut [f32], scale: f32) -> f32 {
    if actual.is_empty() {
        return 0.0;
    }
    let inv_n = 1.0 / actual.len() as f32;
    let mut loss = 0.0;
    for ((d, &e), &a) in deriv.iter_mut().zip(expected).zip(actual) {
        let diff = e - a;
        loss += diff * diff * inv_n;
        *d = -2.0 * inv_n * diff * scale;
    }
    loss * scale
}

fn cross_entropy(expected: &[f32], actual: &[f32], deriv: &mut [f32], scale: f32) -> f32 {
    let Some(max_logit) = actual.iter().copied().reduce(f32::max) else {
        return 0.0;
    };
    let sum_exp: f32 = actual.iter().map(|&a| (a - max_logit).exp()).sum();
    let log_sum_exp = max_logit + sum_exp.ln();

    // One-hot target: the first label above 0.5.
    let loss = expected
        .iter()
        .zip(actual)
        .find(|(&e, _)| e > 0.5)
        .map(|(_, &a)| log_sum_exp - a)
        .unwrap_or(0.0);

    for ((d, &e), &a) in deriv.iter_mut().zip(expected).zip(actual) {
        let prob = (a - max_logit).exp() / sum_exp;
        *d = (prob - e) * scale;
    }
    loss * scale
}
