//! Interactively trained multilayer perceptron
//!
//! This library maps a handful of live control inputs onto continuous output
//! parameters with a small feed-forward network that the operator trains by
//! demonstration.
//!
//! # Modules
//!
//! - `layers`: Node and DenseLayer building blocks
//! - `network`: The MLP, its two training algorithms and persistence
//! - `optimizers`: RMSProp and SGD update rules
//! - `dataset`: Bounded example store with eviction policies
//! - `mapper`: The interactive mapper state machine
//! - `utils`: RNG, activation and loss functions
//! - `config`: Mapper configuration
//! - `architecture`: Network architecture configuration and building
//! - `persistence`: Little-endian field codec for saved networks
//! - `error`: Error types

pub mod architecture;
pub mod config;
pub mod dataset;
pub mod error;
pub mod layers;
pub mod mapper;
pub mod network;
pub mod optimizers;
pub mod persistence;
pub mod utils;

pub use dataset::{Dataset, EvictionPolicy};
pub use error::{DatasetError, MlpError, Result};
pub use mapper::{Iml, Mode};
pub use network::Mlp;
