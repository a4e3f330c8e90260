//! Activation functions for neural networks
//!
//! The set of activations is closed: every layer picks one [`Activation`] and
//! evaluates both the value and the derivative from the cached pre-activation.
//! The numeric codes are part of the persisted network format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Negative-side slope of the leaky ReLU.
pub const LEAKY_RELU_SLOPE: f32 = 0.01;

const ONE_SIXTH: f32 = 1.0 / 6.0;

/// Activation kinds supported by dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Sigmoid,
    Tanh,
    Linear,
    LeakyRelu,
    HardSigmoid,
    HardSwish,
    HardTanh,
}

impl Activation {
    /// Every supported activation, in persisted-code order.
    pub const ALL: [Activation; 7] = [
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Linear,
        Activation::LeakyRelu,
        Activation::HardSigmoid,
        Activation::HardSwish,
        Activation::HardTanh,
    ];

    /// f(x) for pre-activation `x`.
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
            Activation::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_RELU_SLOPE * x
                }
            }
            Activation::HardSigmoid => ((x + 3.0) * ONE_SIXTH).clamp(0.0, 1.0),
            Activation::HardSwish => {
                if x <= -3.0 {
                    0.0
                } else if x >= 3.0 {
                    x
                } else {
                    x * (x + 3.0) * ONE_SIXTH
                }
            }
            Activation::HardTanh => x.clamp(-1.0, 1.0),
        }
    }

    /// f'(x) for pre-activation `x`.
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Linear => 1.0,
            Activation::LeakyRelu => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_RELU_SLOPE
                }
            }
            Activation::HardSigmoid => {
                if x > -3.0 && x < 3.0 {
                    ONE_SIXTH
                } else {
                    0.0
                }
            }
            Activation::HardSwish => {
                if x <= -3.0 {
                    0.0
                } else if x >= 3.0 {
                    1.0
                } else {
                    (2.0 * x + 3.0) * ONE_SIXTH
                }
            }
            Activation::HardTanh => {
                if x > -1.0 && x < 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Whether Xavier initialization should use the He-style `sqrt(6/fan_in)` limit.
    pub fn is_relu_family(self) -> bool {
        matches!(self, Activation::LeakyRelu | Activation::HardSwish)
    }

    /// Uniform initialization bound for a layer of this kind.
    ///
    /// `sqrt(6 / fan_in)` for the relu family, `sqrt(6 / (fan_in + fan_out))` otherwise.
    pub fn xavier_limit(self, fan_in: usize, fan_out: usize) -> f32 {
        let denom = if self.is_relu_family() {
            fan_in
        } else {
            fan_in + fan_out
        };
        if denom == 0 {
            return 0.0;
        }
        (6.0f32 / denom as f32).sqrt()
    }

    /// Code used in the persisted network format.
    pub fn code(self) -> u32 {
        match self {
            Activation::Sigmoid => 0,
            Activation::Tanh => 1,
            Activation::Linear => 2,
            Activation::LeakyRelu => 3,
            Activation::HardSigmoid => 4,
            Activation::HardSwish => 5,
            Activation::HardTanh => 6,
        }
    }

    /// Inverse of [`Activation::code`].
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Linear => "linear",
            Activation::LeakyRelu => "leaky_relu",
            Activation::HardSigmoid => "hard_sigmoid",
            Activation::HardSwish => "hard_swish",
            Activation::HardTanh => "hard_tanh",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        match lowered.as_str() {
            "relu" | "leaky_relu" => Ok(Activation::LeakyRelu),
            "hardsigmoid" => Ok(Activation::HardSigmoid),
            "hardswish" => Ok(Activation::HardSwish),
            "hardtanh" => Ok(Activation::HardTanh),
            other => Self::ALL
                .into_iter()
                .find(|a| a.name() == other)
                .ok_or_else(|| {
                    format!(
                        "Invalid activation function '{}'. Must be one of: {}",
                        s,
                        Self::ALL.map(Activation::name).join(", ")
                    )
                }),
        }
    }
}

/// Logistic sigmoid: 1 / (1 + exp(-x)).
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax applied in place.
///
/// Uses the max-subtraction trick for numerical stability to avoid overflow
/// with large logits. Empty slices are left untouched.
pub fn softmax_in_place(values: &mut [f32]) {
    let Some(max_value) = values.iter().copied().reduce(f32::max) else {
        return;
    };

    let mut sum = 0.0f32;
    for value in values.iter_mut() {
        *value = (*value - max_value).exp();
        sum += *value;
    }

    let inv_sum = 1.0f32 / sum;
    for value in values.iter_mut() {
        *value *= inv_sum;
    }
}

/// Index of the largest element, first one on ties. 0 for an empty slice.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = i;
        }
    }
    best
}
