//! Architecture configuration structures
//!
//! Describes a network as a JSON list of dense layers so topologies can be
//! tried without code changes. [`build_network`] turns a validated
//! [`ArchitectureConfig`] into an [`Mlp`].

use crate::error::{MlpError, Result};
use crate::network::Mlp;
use crate::utils::{Activation, Loss};
use serde::{Deserialize, Serialize};
use std::fs;

/// Configuration for a single layer in the network.
///
/// Only `"dense"` layers exist; each needs `input_size`, `output_size` and
/// `activation`.
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "dense",
///   "input_size": 3,
///   "output_size": 8,
///   "activation": "leaky_relu"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Type of layer: "dense"
    pub layer_type: String,
    /// Input size (fan-in of every node)
    pub input_size: Option<usize>,
    /// Output size (number of nodes)
    pub output_size: Option<usize>,
    /// Activation shared by the layer's nodes
    pub activation: Option<Activation>,
}

impl LayerConfig {
    /// Dense layer description with every field set.
    pub fn dense(input_size: usize, output_size: usize, activation: Activation) -> Self {
        Self {
            layer_type: "dense".to_string(),
            input_size: Some(input_size),
            output_size: Some(output_size),
            activation: Some(activation),
        }
    }
}

/// Configuration for the entire network.
///
/// Layers are applied in the order they appear. The first layer's
/// `input_size` counts the appended bias column.
///
/// # Example
///
/// ```json
/// {
///   "loss": "mse",
///   "layers": [
///     { "layer_type": "dense", "input_size": 3, "output_size": 8, "activation": "leaky_relu" },
///     { "layer_type": "dense", "input_size": 8, "output_size": 4, "activation": "sigmoid" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
    /// Training loss; mean squared error when absent
    #[serde(default)]
    pub loss: Loss,
}

impl ArchitectureConfig {
    /// `[n_inputs, hidden..., n_outputs]` for a validated config.
    pub fn layer_widths(&self) -> Result<Vec<usize>> {
        let mut widths = Vec::with_capacity(self.layers.len() + 1);
        if let Some(first) = self.layers.first() {
            widths.push(get_layer_input_size(first, 0)?);
        }
        for (i, layer) in self.layers.iter().enumerate() {
            widths.push(get_layer_output_size(layer, i)?);
        }
        Ok(widths)
    }

    /// Activation of each layer, in order.
    pub fn activations(&self) -> Result<Vec<Activation>> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                layer.activation.ok_or_else(|| {
                    MlpError::Config(format!("Layer {}: Dense layer missing activation", i))
                })
            })
            .collect()
    }
}

/// Loads an architecture configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use iml_mapper::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/xy_to_four.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn get_layer_input_size(layer: &LayerConfig, index: usize) -> Result<usize> {
    layer.input_size.ok_or_else(|| {
        MlpError::Config(format!("Layer {}: Dense layer missing input_size", index))
    })
}

fn get_layer_output_size(layer: &LayerConfig, index: usize) -> Result<usize> {
    layer.output_size.ok_or_else(|| {
        MlpError::Config(format!("Layer {}: Dense layer missing output_size", index))
    })
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Each layer is a dense layer with positive sizes and an activation
/// - Layer connections are valid (output size of layer i matches input size of layer i+1)
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(MlpError::Config(
            "Architecture must have at least one layer".to_string(),
        ));
    }

    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }

    for (i, pair) in config.layers.windows(2).enumerate() {
        let current_output = get_layer_output_size(&pair[0], i)?;
        let next_input = get_layer_input_size(&pair[1], i + 1)?;

        if current_output != next_input {
            return Err(MlpError::Config(format!(
                "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                i,
                current_output,
                i + 1,
                next_input
            )));
        }
    }

    Ok(())
}

fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    if !layer.layer_type.eq_ignore_ascii_case("dense") {
        return Err(MlpError::Config(format!(
            "Layer {}: Invalid layer type '{}'. Must be: dense",
            index, layer.layer_type
        )));
    }
    if get_layer_input_size(layer, index)? == 0 {
        return Err(MlpError::Config(format!(
            "Layer {}: input_size must be greater than 0",
            index
        )));
    }
    if get_layer_output_size(layer, index)? == 0 {
        return Err(MlpError::Config(format!(
            "Layer {}: output_size must be greater than 0",
            index
        )));
    }
    if layer.activation.is_none() {
        return Err(MlpError::Config(format!(
            "Layer {}: Dense layer requires 'activation'",
            index
        )));
    }
    Ok(())
}

/// Builds an [`Mlp`] from a configuration.
///
/// The configuration is validated first; `seed` makes the initial weights reproducible.
///
/// # Examples
///
/// ```
/// use iml_mapper::architecture::{build_network, ArchitectureConfig, LayerConfig};
/// use iml_mapper::utils::{Activation, Loss};
///
/// let config = ArchitectureConfig {
///     layers: vec![
///         LayerConfig::dense(3, 8, Activation::LeakyRelu),
///         LayerConfig::dense(8, 2, Activation::Sigmoid),
///     ],
///     loss: Loss::MeanSquaredError,
/// };
/// let mlp = build_network(&config, Some(42)).unwrap();
/// assert_eq!(mlp.layer_widths(), &[3, 8, 2]);
/// ```
pub fn build_network(config: &ArchitectureConfig, seed: Option<u64>) -> Result<Mlp> {
    validate_architecture(config)?;
    let widths = config.layer_widths()?;
    let activations = config.activations()?;
    Mlp::new(&widths, &activations, config.loss, seed)
}
