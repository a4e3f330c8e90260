//! Layer building blocks for feed-forward networks
//!
//! A network is a stack of [`DenseLayer`]s, each an ordered list of [`Node`]s.

pub mod dense;
pub mod node;

pub use dense::DenseLayer;
pub use node::Node;
