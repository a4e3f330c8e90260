//! Configuration structures for the interactive mapper
//!
//! A [`MapperConfig`] gathers everything an [`crate::mapper::Iml`] needs beyond
//! its input and output counts: hidden topology, training hyperparameters and
//! dataset behaviour. Every field has a default, so a JSON file only needs to
//! name the values it changes.

use crate::dataset::{EvictionPolicy, DEFAULT_MAX_EXAMPLES};
use crate::error::{MlpError, Result};
use crate::utils::{Activation, Loss};
use serde::{Deserialize, Serialize};
use std::fs;

/// Which training algorithm the mapper runs when leaving training mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingAlgorithm {
    /// Mini-batch RMSProp with gradient clipping.
    #[default]
    Batch,
    /// Per-sample SGD in dataset order.
    Online,
}

/// Mapper configuration.
///
/// # Example
///
/// ```json
/// {
///   "hidden_layers": [8, 8],
///   "max_iterations": 3000,
///   "learning_rate": 1.0,
///   "convergence_threshold": 1e-5,
///   "batch_size": 8,
///   "algorithm": "batch",
///   "eviction_enabled": true,
///   "eviction_policy": "random_older",
///   "seed": 42
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Width of each hidden layer, input side first.
    pub hidden_layers: Vec<usize>,

    /// Upper bound on training epochs per training pass.
    pub max_iterations: usize,

    pub learning_rate: f32,

    /// Training stops once the epoch loss drops below this value.
    pub convergence_threshold: f32,

    /// Examples per mini-batch (batch algorithm only).
    pub batch_size: usize,

    pub algorithm: TrainingAlgorithm,

    pub hidden_activation: Activation,

    pub output_activation: Activation,

    pub loss: Loss,

    /// Dataset capacity.
    pub max_examples: usize,

    /// Evict an old example instead of rejecting a new one when the dataset is full.
    pub eviction_enabled: bool,

    pub eviction_policy: EvictionPolicy,

    /// Seed for weight initialization, shuffling and eviction. Entropy when absent.
    pub seed: Option<u64>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![10, 10, 14],
            max_iterations: 1000,
            learning_rate: 1.0,
            convergence_threshold: 1e-5,
            batch_size: 8,
            algorithm: TrainingAlgorithm::Batch,
            hidden_activation: Activation::LeakyRelu,
            output_activation: Activation::Sigmoid,
            loss: Loss::MeanSquaredError,
            max_examples: DEFAULT_MAX_EXAMPLES,
            eviction_enabled: false,
            eviction_policy: EvictionPolicy::Fifo,
            seed: None,
        }
    }
}

/// Loads a mapper configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a [`MapperConfig`] (missing
/// fields take their defaults) and validates the result.
///
/// # Examples
///
/// ```no_run
/// use iml_mapper::config::load_config;
///
/// let cfg = load_config("config/mapper_default.json").unwrap();
/// assert_eq!(cfg.hidden_layers, vec![10, 10, 14]);
/// ```
pub fn load_config(path: &str) -> Result<MapperConfig> {
    let contents = fs::read_to_string(path)?;
    let config: MapperConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Check value ranges that serde cannot express.
pub fn validate_config(config: &MapperConfig) -> Result<()> {
    if let Some(i) = config.hidden_layers.iter().position(|&w| w == 0) {
        return Err(MlpError::Config(format!(
            "hidden layer {i} must have at least one node"
        )));
    }

    if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
        return Err(MlpError::Config(
            "learning_rate must be positive and finite".to_string(),
        ));
    }

    if config.convergence_threshold.is_nan() || config.convergence_threshold < 0.0 {
        return Err(MlpError::Config(
            "convergence_threshold must be non-negative".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(MlpError::Config(
            "batch_size must be at least 1".to_string(),
        ));
    }

    if config.max_iterations == 0 {
        return Err(MlpError::Config(
            "max_iterations must be at least 1".to_string(),
        ));
    }

    Ok(())
}
