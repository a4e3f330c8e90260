//! Error types shared by the network, dataset and mapper modules.

use thiserror::Error;

/// Result alias used by network, configuration and persistence operations.
pub type Result<T> = std::result::Result<T, MlpError>;

/// Errors raised while building, running, training or persisting a network.
#[derive(Debug, Error)]
pub enum MlpError {
    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("input has {actual} values but the network expects {expected}")]
    InputSize { expected: usize, actual: usize },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("invalid training set: {0}")]
    TrainingSet(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("network file is truncated")]
    Truncated,

    #[error("network file does not match its header: {0}")]
    SizeMismatch(String),

    #[error("unknown activation code {0}")]
    UnknownActivation(u32),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a [`crate::dataset::Dataset`] rejects an example.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error(
        "example is {feature}x{label} but the dataset holds {expected_feature}x{expected_label} examples"
    )]
    WidthMismatch {
        expected_feature: usize,
        expected_label: usize,
        feature: usize,
        label: usize,
    },

    #[error("dataset is full ({capacity} examples) and eviction is disabled")]
    Full { capacity: usize },

    #[error("{features} feature vectors but {labels} label vectors")]
    CountMismatch { features: usize, labels: usize },
}
