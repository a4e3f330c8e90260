//! Interactive machine-learning mapper.
//!
//! [`Iml`] ties a [`Dataset`] and an [`Mlp`] together behind a small state
//! machine that control code drives once per tick:
//!
//! - **Inference**: [`Iml::process`] maps the current inputs to outputs.
//! - **Training**: the operator demonstrates input/output pairs with the
//!   two-phase [`Iml::save_example`] protocol. Leaving training mode retrains
//!   the network on everything collected so far.
//!
//! All state is owned by one `Iml`; callers that touch it from several threads
//! must serialize access themselves.
//!
//! # Example
//!
//! ```
//! use iml_mapper::mapper::{Iml, Mode};
//!
//! let mut iml = Iml::new(2, 1, &[8, 8], 200, 1.0, 1e-5).unwrap();
//! iml.set_mode(Mode::Training);
//! iml.set_inputs(&[0.2, 0.2]);
//! iml.save_example(); // arm: output is frozen
//! iml.set_output(0, 0.8);
//! iml.save_example(); // store ([0.2, 0.2], [0.8])
//! assert_eq!(iml.dataset().len(), 1);
//! iml.set_mode(Mode::Inference); // trains
//! ```

use crate::config::{validate_config, MapperConfig, TrainingAlgorithm};
use crate::dataset::Dataset;
use crate::error::{DatasetError, MlpError, Result};
use crate::network::{Mlp, MlpWeights};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Initial value of every input.
const INITIAL_INPUT: f32 = 0.5;

/// Scale of the uniform draw used by [`Iml::randomise_weights`].
const RANDOMISE_SCALE: f32 = 1.0;

/// Operating mode of the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Inference,
    Training,
}

/// Diagnostic sink receiving human-readable progress and error messages.
pub type Logger = Box<dyn Fn(&str) + Send>;

/// Interactive mapper from `n_inputs` control values to `n_outputs` parameters.
///
/// Inputs and outputs are kept in `[0, 1]`. The network sees the inputs with a
/// constant `1.0` appended, so its first layer is `n_inputs + 1` wide.
pub struct Iml {
    n_inputs: usize,
    n_outputs: usize,
    config: MapperConfig,
    mode: Mode,
    input_updated: bool,
    capture_armed: bool,
    input_state: Vec<f32>,
    output_state: Vec<f32>,
    dataset: Dataset,
    mlp: Mlp,
    stored_weights: Option<MlpWeights>,
    logger: Option<Logger>,
}

impl fmt::Debug for Iml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iml")
            .field("n_inputs", &self.n_inputs)
            .field("n_outputs", &self.n_outputs)
            .field("mode", &self.mode)
            .field("capture_armed", &self.capture_armed)
            .field("input_state", &self.input_state)
            .field("output_state", &self.output_state)
            .field("examples", &self.dataset.len())
            .finish_non_exhaustive()
    }
}

impl Iml {
    /// Mapper with leaky-ReLU hidden layers, a sigmoid output layer and MSE loss.
    ///
    /// Other settings take their [`MapperConfig`] defaults.
    pub fn new(
        n_inputs: usize,
        n_outputs: usize,
        hidden_layers: &[usize],
        max_iterations: usize,
        learning_rate: f32,
        convergence_threshold: f32,
    ) -> Result<Self> {
        let config = MapperConfig {
            hidden_layers: hidden_layers.to_vec(),
            max_iterations,
            learning_rate,
            convergence_threshold,
            ..MapperConfig::default()
        };
        Self::with_config(n_inputs, n_outputs, config)
    }

    /// Mapper built from a full configuration.
    ///
    /// # Errors
    ///
    /// [`MlpError::Config`] for invalid settings, [`MlpError::Topology`] when
    /// `n_inputs` or `n_outputs` is zero.
    pub fn with_config(n_inputs: usize, n_outputs: usize, config: MapperConfig) -> Result<Self> {
        validate_config(&config)?;
        if n_inputs == 0 || n_outputs == 0 {
            return Err(MlpError::Topology(format!(
                "mapper needs at least one input and one output, got {n_inputs}x{n_outputs}"
            )));
        }

        let mut widths = Vec::with_capacity(config.hidden_layers.len() + 2);
        widths.push(n_inputs + 1);
        widths.extend_from_slice(&config.hidden_layers);
        widths.push(n_outputs);

        let mut activations = vec![config.hidden_activation; config.hidden_layers.len()];
        activations.push(config.output_activation);

        let mlp = Mlp::new(&widths, &activations, config.loss, config.seed)?;

        let mut dataset = Dataset::seeded(config.max_examples, config.seed);
        dataset.set_eviction_enabled(config.eviction_enabled);
        dataset.set_eviction_policy(config.eviction_policy);

        Ok(Self {
            n_inputs,
            n_outputs,
            config,
            mode: Mode::Inference,
            input_updated: false,
            capture_armed: false,
            input_state: vec![INITIAL_INPUT; n_inputs],
            output_state: vec![0.0; n_outputs],
            dataset,
            mlp,
            stored_weights: None,
            logger: None,
        })
    }

    pub fn num_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn network(&self) -> &Mlp {
        &self.mlp
    }

    pub fn inputs(&self) -> &[f32] {
        &self.input_state
    }

    /// Current outputs, `n_outputs` values in `[0, 1]`.
    pub fn outputs(&self) -> &[f32] {
        &self.output_state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the first half of [`Iml::save_example`] has happened.
    pub fn is_capture_armed(&self) -> bool {
        self.capture_armed
    }

    /// Install a diagnostic sink. Messages also go to `tracing`.
    pub fn set_logger<F>(&mut self, logger: F)
    where
        F: Fn(&str) + Send + 'static,
    {
        self.logger = Some(Box::new(logger));
    }

    fn log(&self, message: &str) {
        info!("{message}");
        if let Some(logger) = &self.logger {
            logger(message);
        }
    }

    /// Store `clamp(value, 0, 1)` as input `index` and mark the inputs dirty.
    ///
    /// Out-of-range indices and NaN values are ignored.
    pub fn set_input(&mut self, index: usize, value: f32) {
        if value.is_nan() {
            return;
        }
        if let Some(slot) = self.input_state.get_mut(index) {
            *slot = value.clamp(0.0, 1.0);
            self.input_updated = true;
        }
    }

    /// Set inputs from the start; extra values are ignored.
    pub fn set_inputs(&mut self, values: &[f32]) {
        for (i, &value) in values.iter().enumerate().take(self.n_inputs) {
            self.set_input(i, value);
        }
    }

    /// Store `clamp(value, 0, 1)` directly as output `index`.
    ///
    /// Out-of-range indices and NaN values are ignored.
    pub fn set_output(&mut self, index: usize, value: f32) {
        if value.is_nan() {
            return;
        }
        if let Some(slot) = self.output_state.get_mut(index) {
            *slot = value.clamp(0.0, 1.0);
        }
    }

    pub fn set_outputs(&mut self, values: &[f32]) {
        for (i, &value) in values.iter().enumerate().take(self.n_outputs) {
            self.set_output(i, value);
        }
    }

    /// Refresh the outputs from the network if the inputs changed and capture
    /// is not armed. Returns the current outputs either way.
    pub fn process(&mut self) -> &[f32] {
        if self.input_updated && !self.capture_armed {
            self.run_inference();
            self.input_updated = false;
        }
        &self.output_state
    }

    fn network_input(&self) -> Vec<f32> {
        let mut input = Vec::with_capacity(self.n_inputs + 1);
        input.extend_from_slice(&self.input_state);
        input.push(1.0);
        input
    }

    /// One forward pass from the current inputs into `output_state`.
    fn run_inference(&mut self) {
        let input = self.network_input();
        match self.mlp.predict(&input) {
            Ok(output) => {
                for (slot, value) in self.output_state.iter_mut().zip(output) {
                    *slot = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
                }
            }
            Err(err) => self.log(&format!("Inference failed: {err}")),
        }
    }

    /// Switch mode. Leaving [`Mode::Training`] for [`Mode::Inference`] trains
    /// the network on the dataset and then refreshes the outputs.
    ///
    /// The training pass blocks for as long as training takes.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Inference && self.mode == Mode::Training {
            self.train();
        }
        if mode != self.mode {
            debug!(from = ?self.mode, to = ?mode, "mode switch");
        }
        self.mode = mode;
    }

    fn train(&mut self) {
        if let Some(weights) = self.stored_weights.take() {
            if let Err(err) = self.mlp.set_weights(&weights) {
                self.log(&format!("Could not restore weights: {err}"));
            }
        }

        if self.dataset.is_empty() {
            self.log("Empty dataset, skipping training.");
        } else {
            let (features, labels) = self.dataset.sample(true);
            self.log("Training...");
            let result = match self.config.algorithm {
                TrainingAlgorithm::Batch => self.mlp.train_batch(
                    &features,
                    &labels,
                    self.config.learning_rate,
                    self.config.max_iterations,
                    self.config.batch_size,
                    self.config.convergence_threshold,
                ),
                TrainingAlgorithm::Online => self.mlp.train(
                    &features,
                    &labels,
                    self.config.learning_rate,
                    self.config.max_iterations,
                    self.config.convergence_threshold,
                ),
            };
            match result {
                Ok(loss) => self.log(&format!("Training complete, loss {loss:.6}.")),
                Err(err) => self.log(&format!("Training failed: {err}")),
            }
            self.mlp.check_and_fix_weights();
        }

        self.run_inference();
        self.input_updated = false;
    }

    /// Two-phase example capture.
    ///
    /// The first call arms capture and freezes the outputs so the operator can
    /// position them with [`Iml::set_output`]. The second call stores
    /// `(inputs, outputs)` in the dataset, disarms capture and runs one
    /// inference pass with the current network.
    pub fn save_example(&mut self) {
        if !self.capture_armed {
            self.capture_armed = true;
            self.log("Move to desired output position...");
            return;
        }

        let feature = self.input_state.clone();
        let label = self.output_state.clone();
        match self.dataset.add(&feature, &label) {
            Ok(()) => self.log("Example saved."),
            Err(err) => self.log(&format!("Example not saved: {err}")),
        }
        self.capture_armed = false;
        self.run_inference();
    }

    /// Insert an example directly, independent of the capture state.
    ///
    /// # Errors
    ///
    /// [`DatasetError::WidthMismatch`] unless `feature` has `n_inputs` values and
    /// `label` has `n_outputs`; otherwise whatever [`Dataset::add`] reports.
    pub fn add_example(
        &mut self,
        feature: &[f32],
        label: &[f32],
    ) -> std::result::Result<(), DatasetError> {
        if feature.len() != self.n_inputs || label.len() != self.n_outputs {
            let err = DatasetError::WidthMismatch {
                expected_feature: self.n_inputs,
                expected_label: self.n_outputs,
                feature: feature.len(),
                label: label.len(),
            };
            warn!(%err, "rejected example");
            return Err(err);
        }
        self.dataset.add(feature, label)
    }

    /// Remove every example. Only effective in [`Mode::Training`].
    pub fn clear_dataset(&mut self) {
        if self.mode == Mode::Training {
            self.dataset.clear();
            self.log("Dataset cleared.");
        }
    }

    /// Try random weights, keeping the current ones for the next training pass.
    ///
    /// Only effective in [`Mode::Training`]. The snapshot replaces any earlier
    /// one and is restored when training mode is left.
    pub fn randomise_weights(&mut self) {
        if self.mode != Mode::Training {
            return;
        }
        self.stored_weights = Some(self.mlp.weights());
        self.mlp.draw_weights(RANDOMISE_SCALE);
        self.run_inference();
        self.log("Weights randomised.");
    }

    /// Save the network in the binary network format.
    pub fn save_network(&self, path: impl AsRef<Path>) -> Result<()> {
        self.mlp.save(path)
    }

    /// Replace the network with one loaded from `path`.
    ///
    /// The file must describe a network with `n_inputs + 1` inputs and
    /// `n_outputs` outputs; on any error the current network is kept.
    pub fn load_network(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut mlp = Mlp::load(path, self.config.loss)?;
        if mlp.num_inputs() != self.n_inputs + 1 || mlp.num_outputs() != self.n_outputs {
            return Err(MlpError::SizeMismatch(format!(
                "network is {}x{}, mapper needs {}x{}",
                mlp.num_inputs(),
                mlp.num_outputs(),
                self.n_inputs + 1,
                self.n_outputs
            )));
        }
        if let Some(seed) = self.config.seed {
            mlp.reseed(seed);
        }
        self.mlp = mlp;
        self.stored_weights = None;
        self.input_updated = true;
        self.log("Network loaded.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> Iml {
        let config = MapperConfig {
            hidden_layers: vec![4],
            max_iterations: 50,
            seed: Some(11),
            ..MapperConfig::default()
        };
        Iml::with_config(2, 2, config).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let iml = mapper();
        assert_eq!(iml.inputs(), &[0.5, 0.5]);
        assert_eq!(iml.outputs(), &[0.0, 0.0]);
        assert_eq!(iml.mode(), Mode::Inference);
        assert!(!iml.is_capture_armed());
        assert_eq!(iml.network().layer_widths(), &[3, 4, 2]);
    }

    #[test]
    fn test_rejects_empty_io() {
        assert!(Iml::new(0, 1, &[4], 10, 1.0, 1e-5).is_err());
        assert!(Iml::new(1, 0, &[4], 10, 1.0, 1e-5).is_err());
    }

    #[test]
    fn test_out_of_range_index_is_noop() {
        let mut iml = mapper();
        iml.set_input(5, 0.1);
        iml.set_output(5, 0.1);
        assert_eq!(iml.inputs(), &[0.5, 0.5]);
        assert_eq!(iml.outputs(), &[0.0, 0.0]);
    }

    #[test]
    fn test_nan_input_ignored() {
        let mut iml = mapper();
        iml.set_input(0, f32::NAN);
        assert_eq!(iml.inputs()[0], 0.5);
    }

    #[test]
    fn test_clear_dataset_requires_training_mode() {
        let mut iml = mapper();
        iml.add_example(&[0.1, 0.2], &[0.3, 0.4]).unwrap();
        iml.clear_dataset();
        assert_eq!(iml.dataset().len(), 1);

        iml.set_mode(Mode::Training);
        iml.clear_dataset();
        assert!(iml.dataset().is_empty());
    }

    #[test]
    fn test_add_example_checks_widths() {
        let mut iml = mapper();
        assert!(iml.add_example(&[0.1], &[0.3, 0.4]).is_err());
        assert!(iml.add_example(&[0.1, 0.2], &[0.3]).is_err());
        assert!(iml.dataset().is_empty());
    }

    #[test]
    fn test_randomise_and_restore() {
        let mut iml = mapper();
        let original = iml.network().weights();

        iml.randomise_weights();
        assert_eq!(iml.network().weights(), original);

        iml.set_mode(Mode::Training);
        iml.randomise_weights();
        assert_ne!(iml.network().weights(), original);

        // Empty dataset: restore happens, training is skipped.
        iml.set_mode(Mode::Inference);
        assert_eq!(iml.network().weights(), original);
    }
}
