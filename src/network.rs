//! Feed-forward multilayer perceptron
//!
//! [`Mlp`] is an ordered stack of [`DenseLayer`]s trained with one of two fixed
//! algorithms:
//!
//! - [`Mlp::train_batch`]: shuffled mini-batches, gradient accumulation,
//!   global-norm clipping and one RMSProp step per batch
//! - [`Mlp::train`]: per-sample SGD in dataset order
//!
//! Backpropagation always runs from the output layer towards the input; the
//! deltas computed by layer `i` become the error fed into layer `i - 1`.
//!
//! The first layer width already counts the constant bias column that callers
//! append to every feature vector (see [`crate::dataset::Dataset::features`]).
//!
//! # Example
//!
//! ```
//! use iml_mapper::network::Mlp;
//! use iml_mapper::utils::{Activation, Loss};
//!
//! let mut mlp = Mlp::new(
//!     &[3, 4, 1],
//!     &[Activation::LeakyRelu, Activation::Sigmoid],
//!     Loss::MeanSquaredError,
//!     Some(7),
//! )
//! .unwrap();
//! let output = mlp.predict(&[0.5, 0.5, 1.0]).unwrap();
//! assert_eq!(output.len(), 1);
//! ```

use crate::error::{MlpError, Result};
use crate::layers::DenseLayer;
use crate::optimizers::RmsProp;
use crate::persistence::{NetworkReader, NetworkWriter};
use crate::utils::{argmax, softmax_in_place, Activation, Loss, SeededRng};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Global L2 norm above which batch gradients are rescaled.
pub const MAX_GRADIENT_NORM: f32 = 5.0;

/// Epochs between corruption sweeps in [`Mlp::train_batch`].
pub const CORRUPTION_CHECK_INTERVAL: usize = 10;

/// Epochs between progress log lines.
const LOG_INTERVAL: usize = 100;

/// Epochs between progress callbacks in [`Mlp::train`].
const ONLINE_CALLBACK_INTERVAL: usize = 32;

/// Weights of a whole network: `[layer][node][input]`.
pub type MlpWeights = Vec<Vec<Vec<f32>>>;

/// Called with `(epoch, epoch_loss)` while training.
pub type ProgressCallback = Box<dyn FnMut(usize, f32) + Send>;

/// Buffers reused across training examples.
#[derive(Default)]
struct Scratch {
    output: Vec<f32>,
    activations: Vec<Vec<f32>>,
    deriv: Vec<f32>,
}

/// Multilayer perceptron with a fixed topology.
pub struct Mlp {
    layer_widths: Vec<usize>,
    layers: Vec<DenseLayer>,
    loss: Loss,
    rng: SeededRng,
    progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for Mlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mlp")
            .field("layer_widths", &self.layer_widths)
            .field("layers", &self.layers)
            .field("loss", &self.loss)
            .field("has_progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Mlp {
    /// Build a network with Xavier-initialized weights.
    ///
    /// # Arguments
    ///
    /// * `layer_widths` - `[n_inputs, hidden..., n_outputs]`, at least two entries, all positive
    /// * `activations` - One activation per layer (`layer_widths.len() - 1` entries)
    /// * `loss` - Training loss; also decides whether inference applies softmax
    /// * `seed` - RNG seed for initialization and shuffling; entropy when `None`
    ///
    /// # Errors
    ///
    /// [`MlpError::Topology`] when the widths or activation count are invalid.
    pub fn new(
        layer_widths: &[usize],
        activations: &[Activation],
        loss: Loss,
        seed: Option<u64>,
    ) -> Result<Self> {
        validate_topology(layer_widths)?;
        if activations.len() != layer_widths.len() - 1 {
            return Err(MlpError::Topology(format!(
                "{} layers need {} activations, got {}",
                layer_widths.len() - 1,
                layer_widths.len() - 1,
                activations.len()
            )));
        }

        let mut rng = SeededRng::from_optional_seed(seed);
        let layers = layer_widths
            .windows(2)
            .zip(activations)
            .map(|(pair, &activation)| DenseLayer::new(pair[0], pair[1], activation, &mut rng))
            .collect();

        Ok(Self::from_parts(layer_widths.to_vec(), layers, loss, rng))
    }

    fn from_parts(
        layer_widths: Vec<usize>,
        layers: Vec<DenseLayer>,
        loss: Loss,
        rng: SeededRng,
    ) -> Self {
        Self {
            layer_widths,
            layers,
            loss,
            rng,
            progress_callback: None,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.layer_widths[0]
    }

    pub fn num_outputs(&self) -> usize {
        self.layer_widths[self.layer_widths.len() - 1]
    }

    pub fn num_hidden_layers(&self) -> usize {
        self.layer_widths.len() - 2
    }

    pub fn layer_widths(&self) -> &[usize] {
        &self.layer_widths
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    /// Replace the RNG with one seeded from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SeededRng::new(seed);
    }

    /// Register a callback invoked with `(epoch, loss)` during training.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(usize, f32) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    pub fn clear_progress_callback(&mut self) {
        self.progress_callback = None;
    }

    /// Propagate `input` through every layer.
    ///
    /// When `activations` is given it is cleared and receives the input of each
    /// layer in order (one entry per layer), as needed for backpropagation.
    /// Softmax is applied to the result only when `for_inference` is set, the
    /// loss is cross-entropy and there is more than one output.
    ///
    /// # Errors
    ///
    /// [`MlpError::InputSize`] if `input.len() != num_inputs()`; `output` is left unchanged.
    pub fn forward(
        &mut self,
        input: &[f32],
        output: &mut Vec<f32>,
        mut activations: Option<&mut Vec<Vec<f32>>>,
        for_inference: bool,
    ) -> Result<()> {
        if input.len() != self.num_inputs() {
            warn!(
                expected = self.num_inputs(),
                actual = input.len(),
                "rejecting input with wrong width"
            );
            return Err(MlpError::InputSize {
                expected: self.num_inputs(),
                actual: input.len(),
            });
        }

        if let Some(acts) = activations.as_mut() {
            acts.clear();
        }

        let mut current = input.to_vec();
        for layer in &mut self.layers {
            let mut next = Vec::with_capacity(layer.output_size());
            layer.forward(&current, &mut next)?;
            let layer_input = std::mem::replace(&mut current, next);
            if let Some(acts) = activations.as_mut() {
                acts.push(layer_input);
            }
        }

        if for_inference && self.loss == Loss::CategoricalCrossEntropy && current.len() > 1 {
            softmax_in_place(&mut current);
        }

        *output = current;
        Ok(())
    }

    /// Inference forward pass returning a fresh output vector.
    pub fn predict(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let mut output = Vec::new();
        self.forward(input, &mut output, None, true)?;
        Ok(output)
    }

    /// Index of the strongest output.
    pub fn output_class(output: &[f32]) -> usize {
        argmax(output)
    }

    /// Push `deriv_error` back through every layer, output first.
    fn backpropagate(
        &mut self,
        activations: &[Vec<f32>],
        deriv_error: &[f32],
        learning_rate: f32,
        accumulate: bool,
    ) {
        let mut error = deriv_error.to_vec();
        let mut deltas = Vec::new();
        for (layer, input) in self.layers.iter_mut().zip(activations).rev() {
            layer.update_weights(input, &error, learning_rate, &mut deltas, accumulate);
            std::mem::swap(&mut error, &mut deltas);
        }
    }

    fn check_output_width(&self, values: &[f32], what: &str) -> Result<()> {
        if values.len() != self.num_outputs() {
            return Err(MlpError::Shape(format!(
                "{what} has {} values, network has {} outputs",
                values.len(),
                self.num_outputs()
            )));
        }
        Ok(())
    }

    fn validate_training_set(&self, features: &[Vec<f32>], labels: &[Vec<f32>]) -> Result<()> {
        if features.is_empty() {
            return Err(MlpError::EmptyTrainingSet);
        }
        if features.len() != labels.len() {
            return Err(MlpError::TrainingSet(format!(
                "{} feature vectors but {} label vectors",
                features.len(),
                labels.len()
            )));
        }
        if let Some((i, f)) = features
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != self.num_inputs())
        {
            return Err(MlpError::TrainingSet(format!(
                "feature {i} has {} values, network expects {}",
                f.len(),
                self.num_inputs()
            )));
        }
        if let Some((i, l)) = labels
            .iter()
            .enumerate()
            .find(|(_, l)| l.len() != self.num_outputs())
        {
            return Err(MlpError::TrainingSet(format!(
                "label {i} has {} values, network has {} outputs",
                l.len(),
                self.num_outputs()
            )));
        }
        Ok(())
    }

    fn report_progress(&mut self, epoch: usize, loss: f32) {
        if let Some(callback) = self.progress_callback.as_mut() {
            callback(epoch, loss);
        }
    }

    /// Forward, loss and backpropagation for one example using reusable buffers.
    fn train_on_example(
        &mut self,
        feature: &[f32],
        label: &[f32],
        scale: f32,
        scratch: &mut Scratch,
    ) -> Result<f32> {
        self.forward(feature, &mut scratch.output, Some(&mut scratch.activations), false)?;
        scratch.deriv.clear();
        scratch.deriv.resize(scratch.output.len(), 0.0);
        Ok(self
            .loss
            .evaluate(label, &scratch.output, &mut scratch.deriv, scale))
    }

    /// Per-sample SGD over the whole set, in order, for up to `max_iterations` epochs.
    ///
    /// Each example's loss and gradient are scaled by `1 / n_samples` and weights
    /// move immediately after every example. Stops early once the epoch loss
    /// (the mean over examples) drops below `convergence_threshold`. The progress
    /// callback fires every 32 epochs and once more at the end.
    ///
    /// Returns the last epoch's loss.
    pub fn train(
        &mut self,
        features: &[Vec<f32>],
        labels: &[Vec<f32>],
        learning_rate: f32,
        max_iterations: usize,
        convergence_threshold: f32,
    ) -> Result<f32> {
        self.validate_training_set(features, labels)?;
        let scale = 1.0 / features.len() as f32;
        info!(
            samples = features.len(),
            max_iterations, learning_rate, "starting online training"
        );

        let mut scratch = Scratch::default();
        let mut epoch_loss = 0.0;
        let mut epoch = 0;

        while epoch < max_iterations {
            epoch_loss = 0.0;
            for (feature, label) in features.iter().zip(labels) {
                epoch_loss += self.train_on_example(feature, label, scale, &mut scratch)?;
                self.backpropagate(&scratch.activations, &scratch.deriv, learning_rate, false);
            }

            if epoch % LOG_INTERVAL == 0 {
                debug!(epoch, loss = epoch_loss, "online training progress");
            }
            if epoch % ONLINE_CALLBACK_INTERVAL == 0 {
                self.report_progress(epoch, epoch_loss);
            }
            if epoch_loss < convergence_threshold {
                break;
            }
            epoch += 1;
        }

        info!(epochs = epoch, loss = epoch_loss, "online training finished");
        self.report_progress(epoch, epoch_loss);
        Ok(epoch_loss)
    }

    /// Mini-batch RMSProp training, the canonical trainer.
    ///
    /// Every epoch shuffles the example order and splits it into batches of
    /// `batch_size` (the last one may be shorter). Per batch, gradients are
    /// accumulated over all samples, the global L2 norm of the batch-averaged
    /// weight gradients is clipped to [`MAX_GRADIENT_NORM`] by rescaling the raw
    /// accumulators, and each node takes one RMSProp step.
    ///
    /// The epoch loss is the mean of the per-batch mean losses; training stops
    /// early once it drops below `convergence_threshold`. Weights are swept
    /// for NaN/Inf every [`CORRUPTION_CHECK_INTERVAL`] epochs.
    ///
    /// Returns the last epoch's loss.
    pub fn train_batch(
        &mut self,
        features: &[Vec<f32>],
        labels: &[Vec<f32>],
        learning_rate: f32,
        max_iterations: usize,
        batch_size: usize,
        convergence_threshold: f32,
    ) -> Result<f32> {
        if batch_size == 0 {
            return Err(MlpError::Config("batch_size must be at least 1".to_string()));
        }
        self.validate_training_set(features, labels)?;

        let n_samples = features.len();
        let n_batches = n_samples.div_ceil(batch_size);
        let optimizer = RmsProp::new(learning_rate);
        info!(
            samples = n_samples,
            batch_size, max_iterations, learning_rate, "starting batch training"
        );

        let mut scratch = Scratch::default();
        let mut epoch_loss = 0.0;
        let mut epochs_run = 0;

        for epoch in 0..max_iterations {
            epochs_run = epoch + 1;
            epoch_loss = 0.0;
            let indices = self.rng.shuffled_indices(n_samples);

            for batch in indices.chunks(batch_size) {
                let batch_size_inv = 1.0 / batch.len() as f32;
                self.clear_accumulated_gradients();

                let mut batch_loss = 0.0;
                for &idx in batch {
                    batch_loss +=
                        self.train_on_example(&features[idx], &labels[idx], 1.0, &mut scratch)?;
                    self.backpropagate(&scratch.activations, &scratch.deriv, 0.0, true);
                }

                self.clip_accumulated_gradients(batch_size_inv);
                self.apply_accumulated_gradients(&optimizer, batch_size_inv);
                epoch_loss += batch_loss * batch_size_inv;
            }
            epoch_loss /= n_batches as f32;

            if epoch % CORRUPTION_CHECK_INTERVAL == 0 && self.check_and_fix_weights() {
                warn!(epoch, "repaired non-finite weights during training");
            }
            if epoch % LOG_INTERVAL == 0 {
                debug!(epoch, loss = epoch_loss, "batch training progress");
            }
            self.report_progress(epoch, epoch_loss);

            if epoch_loss < convergence_threshold {
                break;
            }
        }

        info!(epochs = epochs_run, loss = epoch_loss, "batch training finished");
        Ok(epoch_loss)
    }

    /// Rescale raw accumulators so the batch-averaged gradient norm is at most
    /// [`MAX_GRADIENT_NORM`]. Returns the norm before clipping.
    fn clip_accumulated_gradients(&mut self, batch_size_inv: f32) -> f32 {
        let grad_norm = self
            .layers
            .iter()
            .map(|layer| layer.grad_sum_squared(batch_size_inv))
            .sum::<f32>()
            .sqrt();
        if grad_norm > MAX_GRADIENT_NORM {
            let coef = MAX_GRADIENT_NORM / grad_norm;
            for layer in &mut self.layers {
                layer.scale_gradients(coef);
            }
        }
        grad_norm
    }

    /// Zero every node's gradient accumulators.
    pub fn clear_accumulated_gradients(&mut self) {
        for layer in &mut self.layers {
            layer.clear_accumulated_gradients();
        }
    }

    /// One RMSProp step for every node from its accumulated gradients.
    pub fn apply_accumulated_gradients(&mut self, optimizer: &RmsProp, batch_size_inv: f32) {
        for layer in &mut self.layers {
            layer.apply_accumulated_gradients(optimizer, batch_size_inv);
        }
    }

    /// Compute gradients of `deriv_error_output` with respect to every layer's input.
    ///
    /// No weight changes. Each layer keeps its gradient (see
    /// [`DenseLayer::grads`]); the first layer's is the gradient with respect to
    /// the network input, available from [`Mlp::input_gradients`].
    pub fn calc_gradients(&mut self, input: &[f32], deriv_error_output: &[f32]) -> Result<()> {
        self.check_output_width(deriv_error_output, "output gradient")?;
        let mut output = Vec::new();
        self.forward(input, &mut output, None, false)?;

        let mut error = deriv_error_output.to_vec();
        let mut deltas = Vec::new();
        for layer in self.layers.iter_mut().rev() {
            layer.calc_gradients(&error, &mut deltas);
            std::mem::swap(&mut error, &mut deltas);
        }
        Ok(())
    }

    /// Gradient w.r.t. the network input from the last [`Mlp::calc_gradients`].
    pub fn input_gradients(&self) -> &[f32] {
        self.layers[0].grads()
    }

    /// Drop the gradients stored by [`Mlp::calc_gradients`].
    pub fn clear_gradients(&mut self) {
        for layer in &mut self.layers {
            layer.set_grads(Vec::new());
        }
    }

    /// Immediate SGD update driven by a caller-supplied output error vector.
    pub fn apply_loss(&mut self, input: &[f32], loss: &[f32], learning_rate: f32) -> Result<()> {
        self.check_output_width(loss, "loss vector")?;
        let mut output = Vec::new();
        let mut activations = Vec::new();
        self.forward(input, &mut output, Some(&mut activations), false)?;
        self.backpropagate(&activations, loss, learning_rate, false);
        Ok(())
    }

    /// Accumulate gradients that ascend `action_gradient` from `state`.
    ///
    /// The gradient is negated before backpropagation, so a following
    /// [`Mlp::apply_accumulated_gradients`] moves the outputs along it.
    pub fn accumulate_policy_gradient(
        &mut self,
        state: &[f32],
        action_gradient: &[f32],
    ) -> Result<()> {
        self.check_output_width(action_gradient, "action gradient")?;
        let mut output = Vec::new();
        let mut activations = Vec::new();
        self.forward(state, &mut output, Some(&mut activations), false)?;
        let negated: Vec<f32> = action_gradient.iter().map(|g| -g).collect();
        self.backpropagate(&activations, &negated, 0.0, true);
        Ok(())
    }

    /// Polyak blend towards `other`: `w = (1 - alpha) * w + alpha * other.w`.
    ///
    /// Both networks must have the same layer widths; nothing changes otherwise.
    pub fn smooth_update_weights(&mut self, other: &Mlp, alpha: f32) -> Result<()> {
        if other.layer_widths != self.layer_widths {
            return Err(MlpError::Shape(format!(
                "cannot blend network {:?} into {:?}",
                other.layer_widths, self.layer_widths
            )));
        }
        for (layer, other_layer) in self.layers.iter_mut().zip(&other.layers) {
            layer.smooth_update_weights(other_layer, alpha)?;
        }
        Ok(())
    }

    /// Add uniform noise in `[-scale, scale]` to `count` randomly chosen weights.
    pub fn perturb_weights(&mut self, count: usize, scale: f32) {
        for _ in 0..count {
            let layer_idx = self.rng.gen_usize(self.layers.len());
            let layer = &mut self.layers[layer_idx];
            let node = self.rng.gen_usize(layer.output_size());
            let weight = self.rng.gen_usize(layer.input_size());
            let noise = self.rng.symmetric(scale);
            layer.perturb_weight(node, weight, noise);
        }
    }

    /// L2 norm over every weight in the network.
    pub fn global_weight_norm(&self) -> f32 {
        self.layers
            .iter()
            .map(DenseLayer::weight_sum_squared)
            .sum::<f32>()
            .sqrt()
    }

    pub fn reset_optimizer_state(&mut self) {
        for layer in &mut self.layers {
            layer.reset_optimizer_state();
        }
    }

    /// Network-wide NaN/Inf sweep. Returns whether anything was repaired.
    pub fn check_and_fix_weights(&mut self) -> bool {
        let mut repaired = false;
        for layer in &mut self.layers {
            repaired |= layer.check_and_fix_weights();
        }
        if repaired {
            warn!("reset non-finite weights to zero");
        }
        repaired
    }

    /// Copy of every weight, `[layer][node][input]`.
    pub fn weights(&self) -> MlpWeights {
        self.layers.iter().map(DenseLayer::weights).collect()
    }

    /// Replace every weight. Shapes are checked for all layers before any write.
    pub fn set_weights(&mut self, weights: &MlpWeights) -> Result<()> {
        if weights.len() != self.layers.len() {
            return Err(MlpError::Shape(format!(
                "network has {} layers, got weights for {}",
                self.layers.len(),
                weights.len()
            )));
        }
        for (i, (layer, layer_weights)) in self.layers.iter().zip(weights).enumerate() {
            let rows_ok = layer_weights.len() == layer.output_size()
                && layer_weights.iter().all(|row| row.len() == layer.input_size());
            if !rows_ok {
                return Err(MlpError::Shape(format!(
                    "weights for layer {i} do not match its {}x{} shape",
                    layer.output_size(),
                    layer.input_size()
                )));
            }
        }
        for (layer, layer_weights) in self.layers.iter_mut().zip(weights) {
            layer.set_weights(layer_weights)?;
        }
        Ok(())
    }

    /// Copy of one layer's weights, or `None` for an out-of-range index.
    pub fn layer_weights(&self, layer: usize) -> Option<Vec<Vec<f32>>> {
        self.layers.get(layer).map(DenseLayer::weights)
    }

    pub fn set_layer_weights(&mut self, layer: usize, weights: &[Vec<f32>]) -> Result<()> {
        let count = self.layers.len();
        self.layers
            .get_mut(layer)
            .ok_or_else(|| MlpError::Shape(format!("layer {layer} out of range ({count} layers)")))?
            .set_weights(weights)
    }

    /// Draw every weight uniformly from `[-scale, scale]`; biases are untouched.
    pub fn draw_weights(&mut self, scale: f32) {
        for layer in &mut self.layers {
            layer.draw_weights(scale, &mut self.rng);
        }
    }

    /// Jitter every weight with Gaussian noise of standard deviation `speed`.
    pub fn move_weights(&mut self, speed: f32) {
        for layer in &mut self.layers {
            layer.move_weights(speed, &mut self.rng);
        }
    }

    /// Uniform re-draw of every weight in `[weight_min, weight_max]` and every
    /// bias in `[bias_min, bias_max]`.
    pub fn randomise_weights_and_biases(
        &mut self,
        weight_min: f32,
        weight_max: f32,
        bias_min: f32,
        bias_max: f32,
    ) {
        for layer in &mut self.layers {
            layer.randomise_weights_and_biases(
                (weight_min, weight_max),
                (bias_min, bias_max),
                &mut self.rng,
            );
        }
    }

    /// Xavier re-initialization of every layer.
    pub fn init_xavier(&mut self) {
        for layer in &mut self.layers {
            layer.init_xavier(&mut self.rng);
        }
    }

    /// Enable or disable output caching on every layer.
    pub fn set_cached_layer_outputs(&mut self, enabled: bool) {
        for layer in &mut self.layers {
            layer.set_cache_outputs(enabled);
        }
    }

    /// Write the network to `path` in the little-endian network format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))?;
        debug!(path = %path.as_ref().display(), "saved network");
        Ok(())
    }

    /// Header (`n_inputs`, `n_outputs`, `n_hidden_layers`, every width as u64)
    /// followed by each layer record.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = NetworkWriter::new(writer);
        writer.write_count(self.num_inputs())?;
        writer.write_count(self.num_outputs())?;
        writer.write_count(self.num_hidden_layers())?;
        for &width in &self.layer_widths {
            writer.write_count(width)?;
        }
        for layer in &self.layers {
            layer.write_to(&mut writer)?;
        }
        writer.flush()
    }

    /// Load a network saved with [`Mlp::save`].
    ///
    /// The loss is not part of the file and is supplied by the caller. Either a
    /// fully validated network is returned or an error; there is no partial state.
    pub fn load(path: impl AsRef<Path>, loss: Loss) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mlp = Self::read_from(BufReader::new(file), loss)?;
        debug!(path = %path.as_ref().display(), widths = ?mlp.layer_widths, "loaded network");
        Ok(mlp)
    }

    pub fn read_from<R: Read>(reader: R, loss: Loss) -> Result<Self> {
        let mut reader = NetworkReader::new(reader);
        let n_inputs = reader.read_count()?;
        let n_outputs = reader.read_count()?;
        let n_hidden = reader.read_count()?;
        let n_widths = n_hidden.checked_add(2).ok_or_else(|| {
            MlpError::SizeMismatch(format!("hidden layer count {n_hidden} is too large"))
        })?;

        let mut layer_widths = Vec::new();
        for _ in 0..n_widths {
            layer_widths.push(reader.read_count()?);
        }
        if layer_widths[0] != n_inputs || layer_widths[n_widths - 1] != n_outputs {
            return Err(MlpError::SizeMismatch(format!(
                "header declares {n_inputs} inputs and {n_outputs} outputs but widths are {layer_widths:?}"
            )));
        }
        validate_topology(&layer_widths)
            .map_err(|e| MlpError::SizeMismatch(e.to_string()))?;

        let mut layers = Vec::new();
        for pair in layer_widths.windows(2) {
            layers.push(DenseLayer::read_from(&mut reader, pair[0], pair[1])?);
        }

        Ok(Self::from_parts(
            layer_widths,
            layers,
            loss,
            SeededRng::from_entropy(),
        ))
    }
}

fn validate_topology(layer_widths: &[usize]) -> Result<()> {
    if layer_widths.len() < 2 {
        return Err(MlpError::Topology(format!(
            "need at least an input and an output width, got {layer_widths:?}"
        )));
    }
    if layer_widths.contains(&0) {
        return Err(MlpError::Topology(format!(
            "layer widths must be positive, got {layer_widths:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_net(seed: u64) -> Mlp {
        Mlp::new(
            &[3, 4, 2],
            &[Activation::Tanh, Activation::Linear],
            Loss::MeanSquaredError,
            Some(seed),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_topology() {
        let acts = [Activation::Sigmoid];
        assert!(Mlp::new(&[3], &[], Loss::MeanSquaredError, None).is_err());
        assert!(Mlp::new(&[3, 0], &acts, Loss::MeanSquaredError, None).is_err());
        assert!(Mlp::new(&[3, 2, 1], &acts, Loss::MeanSquaredError, None).is_err());
    }

    #[test]
    fn test_forward_records_layer_inputs() {
        let mut mlp = small_net(1);
        let mut output = Vec::new();
        let mut acts = Vec::new();
        mlp.forward(&[0.1, 0.2, 1.0], &mut output, Some(&mut acts), false)
            .unwrap();
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[0], vec![0.1, 0.2, 1.0]);
        assert_eq!(acts[1].len(), 4);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_forward_wrong_width_leaves_output() {
        let mut mlp = small_net(1);
        let mut output = vec![42.0];
        assert!(mlp.forward(&[0.1], &mut output, None, true).is_err());
        assert_eq!(output, vec![42.0]);
    }

    #[test]
    fn test_softmax_only_for_cce_inference() {
        let mut mlp = Mlp::new(
            &[2, 3],
            &[Activation::Linear],
            Loss::CategoricalCrossEntropy,
            Some(5),
        )
        .unwrap();
        let inference = mlp.predict(&[1.0, -1.0]).unwrap();
        let sum: f32 = inference.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        let mut raw = Vec::new();
        mlp.forward(&[1.0, -1.0], &mut raw, None, false).unwrap();
        assert_ne!(raw, inference);
    }

    #[test]
    fn test_clipping_bounds_gradient_norm() {
        let mut mlp = small_net(3);
        let mut output = Vec::new();
        let mut acts = Vec::new();
        mlp.forward(&[10.0, -10.0, 1.0], &mut output, Some(&mut acts), false)
            .unwrap();
        mlp.backpropagate(&acts, &[1000.0, -1000.0], 0.0, true);
        let bias_grads = |mlp: &Mlp| -> Vec<f32> {
            mlp.layers
                .iter()
                .flat_map(|l| l.nodes().iter().map(|n| n.bias_grad_accum()))
                .collect()
        };
        let bias_before = bias_grads(&mlp);

        let before = mlp.clip_accumulated_gradients(1.0);
        assert!(before > MAX_GRADIENT_NORM);
        assert_eq!(bias_grads(&mlp), bias_before);
        let after: f32 = mlp
            .layers
            .iter()
            .map(|l| l.grad_sum_squared(1.0))
            .sum::<f32>()
            .sqrt();
        assert!((after - MAX_GRADIENT_NORM).abs() < 1e-2);
    }

    #[test]
    fn test_train_batch_rejects_zero_batch() {
        let mut mlp = small_net(2);
        let result = mlp.train_batch(&[vec![0.0, 0.0, 1.0]], &[vec![0.0, 0.0]], 0.1, 10, 0, 0.0);
        assert!(matches!(result, Err(MlpError::Config(_))));
    }

    #[test]
    fn test_train_rejects_empty_and_ragged_sets() {
        let mut mlp = small_net(2);
        assert!(matches!(
            mlp.train(&[], &[], 0.1, 10, 0.0),
            Err(MlpError::EmptyTrainingSet)
        ));
        assert!(matches!(
            mlp.train(&[vec![0.0, 1.0]], &[vec![0.0, 0.0]], 0.1, 10, 0.0),
            Err(MlpError::TrainingSet(_))
        ));
    }

    #[test]
    fn test_perturb_changes_at_most_count_weights() {
        let mut mlp = small_net(9);
        let before = mlp.weights();
        mlp.perturb_weights(3, 0.5);
        let after = mlp.weights();

        let changed = before
            .iter()
            .flatten()
            .flatten()
            .zip(after.iter().flatten().flatten())
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed <= 3);
    }
}
