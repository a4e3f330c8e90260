//! Dense (fully connected) layer implementation
//!
//! A [`DenseLayer`] is an ordered list of `output_size` [`Node`]s that all read
//! the same `input_size`-wide input vector and share one [`Activation`].
//! Forward evaluation, backpropagation of error signals, gradient accumulation
//! and the optimizer step are all driven from here, node by node.

use crate::error::{MlpError, Result};
use crate::layers::Node;
use crate::optimizers::RmsProp;
use crate::persistence::{NetworkReader, NetworkWriter};
use crate::utils::{Activation, SeededRng};
use std::io::{Read, Write};

/// Dense (fully connected) layer of [`Node`]s.
///
/// # Fields
///
/// * `input_size` - Fan-in of every node (`n_in`)
/// * `activation` - Activation shared by all nodes
/// * `nodes` - `output_size` nodes in output order
/// * `cache_outputs` - When set, the last forward output is kept for inspection
/// * `grads` - Gradient w.r.t. this layer's input from the last [`DenseLayer::calc_gradients`]
///
/// # Example
///
/// ```
/// use iml_mapper::layers::DenseLayer;
/// use iml_mapper::utils::{Activation, SeededRng};
///
/// let mut rng = SeededRng::new(42);
/// let layer = DenseLayer::new(3, 2, Activation::Sigmoid, &mut rng);
/// assert_eq!(layer.input_size(), 3);
/// assert_eq!(layer.output_size(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    input_size: usize,
    activation: Activation,
    nodes: Vec<Node>,
    cache_outputs: bool,
    cached_outputs: Vec<f32>,
    grads: Vec<f32>,
}

impl DenseLayer {
    /// Create a new layer with Xavier initialization and zero biases.
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features (fan-in of every node)
    /// * `output_size` - Number of nodes
    /// * `activation` - Activation applied by every node
    /// * `rng` - Random number generator for weight initialization
    pub fn new(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut SeededRng,
    ) -> Self {
        let mut layer = Self::zeroed(input_size, output_size, activation);
        layer.init_xavier(rng);
        layer
    }

    /// Create a layer whose weights and biases are all zero.
    pub fn zeroed(input_size: usize, output_size: usize, activation: Activation) -> Self {
        Self::from_nodes(input_size, activation, vec![Node::new(input_size); output_size])
    }

    fn from_nodes(input_size: usize, activation: Activation, nodes: Vec<Node>) -> Self {
        Self {
            input_size,
            activation,
            nodes,
            cache_outputs: false,
            cached_outputs: Vec::new(),
            grads: Vec::new(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.nodes.len()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of trainable weights (biases excluded).
    pub fn parameter_count(&self) -> usize {
        self.input_size * self.nodes.len()
    }

    /// Evaluate every node against `input`, writing `output_size` values into `output`.
    ///
    /// # Errors
    ///
    /// [`MlpError::InputSize`] when `input` is not `input_size` wide.
    pub fn forward(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<()> {
        if input.len() != self.input_size {
            return Err(MlpError::InputSize {
                expected: self.input_size,
                actual: input.len(),
            });
        }
        let activation = self.activation;
        output.clear();
        output.extend(self.nodes.iter_mut().map(|node| node.forward(input, activation)));
        if self.cache_outputs {
            self.cached_outputs.clone_from(output);
        }
        Ok(())
    }

    /// Backpropagate `deriv_error` through this layer.
    ///
    /// For node i, `error_signal = deriv_error[i] * f'(pre_activation_i)` using the
    /// pre-activation cached by the last [`DenseLayer::forward`]. With `accumulate`
    /// the signal is added to the node's gradient accumulators; otherwise the
    /// node's weights are updated immediately with `learning_rate`.
    ///
    /// `deltas` receives `Σ_i error_signal_i * w_ij` for every input j, computed
    /// with the weights as they were before this call.
    pub fn update_weights(
        &mut self,
        input_activation: &[f32],
        deriv_error: &[f32],
        learning_rate: f32,
        deltas: &mut Vec<f32>,
        accumulate: bool,
    ) {
        debug_assert_eq!(input_activation.len(), self.input_size);
        debug_assert_eq!(deriv_error.len(), self.nodes.len());
        let activation = self.activation;
        deltas.clear();
        deltas.resize(self.input_size, 0.0);

        for (node, &d_err) in self.nodes.iter_mut().zip(deriv_error) {
            let error_signal = d_err * activation.derivative(node.pre_activation());
            for (delta, &w) in deltas.iter_mut().zip(node.weights()) {
                *delta += error_signal * w;
            }
            if accumulate {
                node.accumulate_gradients(input_activation, error_signal);
            } else {
                node.update_weights(input_activation, -error_signal, learning_rate);
            }
        }
    }

    /// Compute the input gradient for `deriv_error` without touching any weight.
    ///
    /// The result is written into `deltas` and also kept as this layer's grads.
    pub fn calc_gradients(&mut self, deriv_error: &[f32], deltas: &mut Vec<f32>) {
        debug_assert_eq!(deriv_error.len(), self.nodes.len());
        deltas.clear();
        deltas.resize(self.input_size, 0.0);
        for (node, &d_err) in self.nodes.iter().zip(deriv_error) {
            let error_signal = d_err * self.activation.derivative(node.pre_activation());
            for (delta, &w) in deltas.iter_mut().zip(node.weights()) {
                *delta += error_signal * w;
            }
        }
        self.grads.clone_from(deltas);
    }

    /// Gradients stored by the last [`DenseLayer::calc_gradients`].
    pub fn grads(&self) -> &[f32] {
        &self.grads
    }

    pub fn set_grads(&mut self, grads: Vec<f32>) {
        self.grads = grads;
    }

    /// Zero every node's gradient accumulators.
    pub fn clear_accumulated_gradients(&mut self) {
        for node in &mut self.nodes {
            node.clear_gradients();
        }
    }

    /// One RMSProp step per node from its accumulated gradients.
    pub fn apply_accumulated_gradients(&mut self, optimizer: &RmsProp, batch_size_inv: f32) {
        for node in &mut self.nodes {
            node.apply_accumulated_gradients(optimizer, batch_size_inv);
        }
    }

    /// Σ over nodes of the squared batch-averaged weight gradients.
    pub fn grad_sum_squared(&self, batch_size_inv: f32) -> f32 {
        self.nodes
            .iter()
            .map(|node| node.grad_sum_squared(batch_size_inv))
            .sum()
    }

    pub fn scale_gradients(&mut self, coef: f32) {
        for node in &mut self.nodes {
            node.scale_gradients(coef);
        }
    }

    pub fn reset_optimizer_state(&mut self) {
        for node in &mut self.nodes {
            node.reset_optimizer_state();
        }
    }

    /// Repair non-finite parameters in every node. Returns whether any node changed.
    pub fn check_and_fix_weights(&mut self) -> bool {
        let mut repaired = false;
        for node in &mut self.nodes {
            repaired |= node.check_and_fix_weights();
        }
        repaired
    }

    /// Xavier/Glorot re-initialization of the weights; biases are zeroed.
    ///
    /// The limit depends on the activation, see [`Activation::xavier_limit`].
    pub fn init_xavier(&mut self, rng: &mut SeededRng) {
        let limit = self
            .activation
            .xavier_limit(self.input_size, self.nodes.len());
        for node in &mut self.nodes {
            for w in node.weights_mut() {
                *w = rng.symmetric(limit);
            }
            node.set_bias(0.0);
        }
    }

    /// Draw every weight uniformly from `[-scale, scale]`. Biases are untouched.
    pub fn draw_weights(&mut self, scale: f32, rng: &mut SeededRng) {
        for node in &mut self.nodes {
            for w in node.weights_mut() {
                *w = rng.symmetric(1.0) * scale;
            }
        }
    }

    /// Add Gaussian noise with standard deviation `speed` to every weight.
    pub fn move_weights(&mut self, speed: f32, rng: &mut SeededRng) {
        for node in &mut self.nodes {
            for w in node.weights_mut() {
                *w += rng.gaussian(0.0, speed);
            }
        }
    }

    /// Draw every weight uniformly between `weights.0` and `weights.1`, and
    /// every bias between `biases.0` and `biases.1`.
    pub fn randomise_weights_and_biases(
        &mut self,
        weights: (f32, f32),
        biases: (f32, f32),
        rng: &mut SeededRng,
    ) {
        for node in &mut self.nodes {
            for w in node.weights_mut() {
                *w = rng.gen_range_f32(weights.0, weights.1);
            }
            node.set_bias(rng.gen_range_f32(biases.0, biases.1));
        }
    }

    /// Add `noise` to weight `weight` of node `node`.
    ///
    /// Out-of-range indices are ignored.
    pub fn perturb_weight(&mut self, node: usize, weight: usize, noise: f32) {
        if let Some(w) = self
            .nodes
            .get_mut(node)
            .and_then(|n| n.weights_mut().get_mut(weight))
        {
            *w += noise;
        }
    }

    /// Copy of every node's weights, in node order.
    pub fn weights(&self) -> Vec<Vec<f32>> {
        self.nodes.iter().map(|node| node.weights().to_vec()).collect()
    }

    /// Replace every node's weights.
    ///
    /// All shapes are validated before anything is written, so a rejected call
    /// leaves the layer untouched.
    pub fn set_weights(&mut self, weights: &[Vec<f32>]) -> Result<()> {
        if weights.len() != self.nodes.len() {
            return Err(MlpError::Shape(format!(
                "layer has {} nodes, got weights for {}",
                self.nodes.len(),
                weights.len()
            )));
        }
        if let Some(row) = weights.iter().find(|row| row.len() != self.input_size) {
            return Err(MlpError::Shape(format!(
                "layer nodes expect {} weights, got {}",
                self.input_size,
                row.len()
            )));
        }
        for (node, row) in self.nodes.iter_mut().zip(weights) {
            node.set_weights(row)?;
        }
        Ok(())
    }

    /// Copy of every node's bias.
    pub fn biases(&self) -> Vec<f32> {
        self.nodes.iter().map(Node::bias).collect()
    }

    /// Polyak blend `w = (1 - alpha) * w + alpha * other.w` for every weight.
    pub fn smooth_update_weights(&mut self, other: &DenseLayer, alpha: f32) -> Result<()> {
        if other.input_size != self.input_size || other.nodes.len() != self.nodes.len() {
            return Err(MlpError::Shape(format!(
                "cannot blend a {}x{} layer into a {}x{} layer",
                other.nodes.len(),
                other.input_size,
                self.nodes.len(),
                self.input_size
            )));
        }
        for (node, other_node) in self.nodes.iter_mut().zip(&other.nodes) {
            node.smooth_update(other_node, alpha);
        }
        Ok(())
    }

    /// Σ w² over every weight in the layer.
    pub fn weight_sum_squared(&self) -> f32 {
        self.nodes.iter().map(Node::weight_sum_squared).sum()
    }

    /// L2 norm of the layer's weights.
    pub fn weight_norm(&self) -> f32 {
        self.weight_sum_squared().sqrt()
    }

    /// Keep a copy of each forward output for [`DenseLayer::cached_outputs`].
    pub fn set_cache_outputs(&mut self, enabled: bool) {
        self.cache_outputs = enabled;
        if !enabled {
            self.cached_outputs.clear();
        }
    }

    pub fn cached_outputs(&self) -> &[f32] {
        &self.cached_outputs
    }

    /// Record: `n_out: u64`, `n_in: u64`, `activation: u32`, then each node.
    pub fn write_to<W: Write>(&self, writer: &mut NetworkWriter<W>) -> Result<()> {
        writer.write_count(self.nodes.len())?;
        writer.write_count(self.input_size)?;
        writer.write_u32(self.activation.code())?;
        for node in &self.nodes {
            node.write_to(writer)?;
        }
        Ok(())
    }

    /// Read a layer record and check it against the expected shape.
    pub fn read_from<R: Read>(
        reader: &mut NetworkReader<R>,
        expected_in: usize,
        expected_out: usize,
    ) -> Result<Self> {
        let n_out = reader.read_count()?;
        let n_in = reader.read_count()?;
        if n_out != expected_out || n_in != expected_in {
            return Err(MlpError::SizeMismatch(format!(
                "layer record is {n_out}x{n_in}, header says {expected_out}x{expected_in}"
            )));
        }
        let code = reader.read_u32()?;
        let activation = Activation::from_code(code).ok_or(MlpError::UnknownActivation(code))?;

        let mut nodes = Vec::new();
        for _ in 0..n_out {
            nodes.push(Node::read_from(reader, n_in)?);
        }
        Ok(Self::from_nodes(n_in, activation, nodes))
    }
}
