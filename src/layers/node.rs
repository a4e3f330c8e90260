//! A single neuron: weights, bias and per-parameter optimizer state.

use crate::error::{MlpError, Result};
use crate::optimizers::{Optimizer, RmsProp, Sgd};
use crate::persistence::{NetworkReader, NetworkWriter};
use crate::utils::Activation;
use std::io::{Read, Write};

/// One neuron of a dense layer.
///
/// The number of weights (`fan_in`) is fixed at construction. Every setter
/// validates against it, so `weights.len() == fan_in` holds for the node's
/// whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    weights: Vec<f32>,
    bias: f32,
    pre_activation: f32,
    grad_accum: Vec<f32>,
    bias_grad_accum: f32,
    sq_grad_avg: Vec<f32>,
    bias_sq_grad_avg: f32,
}

impl Node {
    /// Create a node with `fan_in` zero weights and a zero bias.
    pub fn new(fan_in: usize) -> Self {
        Self {
            weights: vec![0.0; fan_in],
            bias: 0.0,
            pre_activation: 0.0,
            grad_accum: vec![0.0; fan_in],
            bias_grad_accum: 0.0,
            sq_grad_avg: vec![0.0; fan_in],
            bias_sq_grad_avg: 0.0,
        }
    }

    /// Create a node from explicit parameters; optimizer state starts at zero.
    pub fn with_weights(weights: Vec<f32>, bias: f32) -> Self {
        let fan_in = weights.len();
        Self {
            weights,
            bias,
            ..Self::new(fan_in)
        }
    }

    pub fn fan_in(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Replace the weights, copying from `weights`.
    ///
    /// Fails without mutation if the length differs from `fan_in`.
    pub fn set_weights(&mut self, weights: &[f32]) -> Result<()> {
        if weights.len() != self.fan_in() {
            return Err(MlpError::Shape(format!(
                "node expects {} weights, got {}",
                self.fan_in(),
                weights.len()
            )));
        }
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.bias = bias;
    }

    /// Weighted sum cached by the last [`Node::forward`].
    pub fn pre_activation(&self) -> f32 {
        self.pre_activation
    }

    pub fn grad_accum(&self) -> &[f32] {
        &self.grad_accum
    }

    pub fn bias_grad_accum(&self) -> f32 {
        self.bias_grad_accum
    }

    /// Evaluate `activation(Σ w_i x_i + bias)`, caching the weighted sum.
    ///
    /// `input` must have `fan_in` values; the layer checks this once for all nodes.
    pub fn forward(&mut self, input: &[f32], activation: Activation) -> f32 {
        debug_assert_eq!(input.len(), self.fan_in());
        let sum: f32 = self
            .weights
            .iter()
            .zip(input)
            .map(|(w, x)| w * x)
            .sum();
        self.pre_activation = sum + self.bias;
        activation.apply(self.pre_activation)
    }

    /// Add `x[i] * error_signal` to each weight's gradient accumulator.
    pub fn accumulate_gradients(&mut self, input: &[f32], error_signal: f32) {
        for (acc, &x) in self.grad_accum.iter_mut().zip(input) {
            *acc += x * error_signal;
        }
        self.bias_grad_accum += error_signal;
    }

    pub fn clear_gradients(&mut self) {
        self.grad_accum.fill(0.0);
        self.bias_grad_accum = 0.0;
    }

    /// Σ (grad_accum[i] * batch_size_inv)² over the weights.
    pub fn grad_sum_squared(&self, batch_size_inv: f32) -> f32 {
        self.grad_accum
            .iter()
            .map(|g| {
                let scaled = g * batch_size_inv;
                scaled * scaled
            })
            .sum()
    }

    /// Multiply the raw weight accumulators by `coef`. The bias accumulator is
    /// outside the clipped norm and is left as is.
    pub fn scale_gradients(&mut self, coef: f32) {
        for acc in &mut self.grad_accum {
            *acc *= coef;
        }
    }

    /// One RMSProp step from the accumulated gradients, then clear them.
    pub fn apply_accumulated_gradients(&mut self, optimizer: &RmsProp, batch_size_inv: f32) {
        optimizer.update(
            &mut self.weights,
            &self.grad_accum,
            batch_size_inv,
            &mut self.sq_grad_avg,
        );
        optimizer.update(
            std::slice::from_mut(&mut self.bias),
            std::slice::from_ref(&self.bias_grad_accum),
            batch_size_inv,
            std::slice::from_mut(&mut self.bias_sq_grad_avg),
        );
        self.clear_gradients();
    }

    /// Immediate update `w[i] += lr * error * x[i]`.
    ///
    /// The bias is left unchanged on this path; the appended 1.0 input column
    /// carries the bias term for per-sample training.
    pub fn update_weights(&mut self, input: &[f32], error: f32, learning_rate: f32) {
        // The gradient of w[i] is -(error * x[i]): pass `input` scaled by -error.
        Sgd::new(learning_rate).update(&mut self.weights, input, -error, &mut []);
    }

    /// `w = (1 - alpha) * w + alpha * other.w` for every weight.
    ///
    /// Only the first `min(fan_in, other.fan_in)` weights are blended; the
    /// layer rejects mismatched shapes before calling this.
    pub fn smooth_update(&mut self, other: &Node, alpha: f32) {
        for (w, &o) in self.weights.iter_mut().zip(&other.weights) {
            *w = (1.0 - alpha) * *w + alpha * o;
        }
    }

    pub fn reset_optimizer_state(&mut self) {
        self.sq_grad_avg.fill(0.0);
        self.bias_sq_grad_avg = 0.0;
    }

    /// Reset any non-finite weight or bias to zero together with its optimizer
    /// state. Returns whether anything was repaired.
    pub fn check_and_fix_weights(&mut self) -> bool {
        let mut repaired = false;
        for (w, sq) in self.weights.iter_mut().zip(self.sq_grad_avg.iter_mut()) {
            if !w.is_finite() {
                *w = 0.0;
                *sq = 0.0;
                repaired = true;
            }
        }
        if !self.bias.is_finite() {
            self.bias = 0.0;
            self.bias_sq_grad_avg = 0.0;
            repaired = true;
        }
        repaired
    }

    /// Σ w² over the weights.
    pub fn weight_sum_squared(&self) -> f32 {
        self.weights.iter().map(|w| w * w).sum()
    }

    /// Mutable access for in-crate weight initialization and perturbation.
    pub(crate) fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    /// Record: `fan_in: u64`, `bias: f32`, `weights[fan_in]: f32`.
    pub fn write_to<W: Write>(&self, writer: &mut NetworkWriter<W>) -> Result<()> {
        writer.write_count(self.fan_in())?;
        writer.write_f32(self.bias)?;
        writer.write_f32_slice(&self.weights)
    }

    /// Read a node record whose `fan_in` must equal `expected_fan_in`.
    pub fn read_from<R: Read>(
        reader: &mut NetworkReader<R>,
        expected_fan_in: usize,
    ) -> Result<Self> {
        let fan_in = reader.read_count()?;
        if fan_in != expected_fan_in {
            return Err(MlpError::SizeMismatch(format!(
                "node fan_in {fan_in} does not match layer input width {expected_fan_in}"
            )));
        }
        let bias = reader.read_f32()?;
        let weights = reader.read_f32_vec(fan_in)?;
        Ok(Self::with_weights(weights, bias))
    }
}
