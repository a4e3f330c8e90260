//! Shared utilities for the learning engine
//!
//! Random number generation, activation functions and loss functions used
//! across layers, networks and datasets.

pub mod activations;
pub mod loss;
pub mod rng;

pub use activations::{argmax, sigmoid, softmax_in_place, Activation};
pub use loss::Loss;
pub use rng::SeededRng;
