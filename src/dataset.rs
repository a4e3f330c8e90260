//! Bounded store of training examples with pluggable eviction.
//!
//! A [`Dataset`] holds `(feature, label)` pairs plus the logical time each pair
//! was added. Once the dataset is full, new examples are either rejected or make
//! room by evicting one existing example according to an [`EvictionPolicy`].

use crate::error::DatasetError;
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default capacity of a new dataset.
pub const DEFAULT_MAX_EXAMPLES: usize = 100;

/// Rule choosing which example to drop when the dataset is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Drop the oldest example.
    #[default]
    Fifo,
    /// Drop a uniformly random example.
    RandomEqual,
    /// Drop an example with probability proportional to its age.
    RandomOlder,
}

/// Training examples as parallel feature and label vectors.
pub type Examples = (Vec<Vec<f32>>, Vec<Vec<f32>>);

/// Bounded example store.
///
/// Once non-empty, every feature vector has the same width and every label
/// vector has the same width; `len() <= capacity()` always holds.
///
/// # Example
///
/// ```
/// use iml_mapper::dataset::{Dataset, EvictionPolicy};
///
/// let mut dataset = Dataset::with_capacity(2);
/// dataset.set_eviction_enabled(true);
/// dataset.set_eviction_policy(EvictionPolicy::Fifo);
/// dataset.add(&[0.1], &[0.2]).unwrap();
/// dataset.add(&[0.3], &[0.4]).unwrap();
/// dataset.add(&[0.5], &[0.6]).unwrap();
/// assert_eq!(dataset.len(), 2);
/// assert_eq!(dataset.raw_features()[0], vec![0.3]);
/// ```
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<Vec<f32>>,
    labels: Vec<Vec<f32>>,
    timestamps: Vec<u64>,
    clock: u64,
    capacity: usize,
    policy: EvictionPolicy,
    eviction_enabled: bool,
    rng: SeededRng,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    /// Empty dataset with [`DEFAULT_MAX_EXAMPLES`] capacity and eviction disabled.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EXAMPLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::seeded(capacity, None)
    }

    /// Dataset whose shuffling and random eviction are reproducible when `seed` is set.
    pub fn seeded(capacity: usize, seed: Option<u64>) -> Self {
        Self {
            features: Vec::new(),
            labels: Vec::new(),
            timestamps: Vec::new(),
            clock: 0,
            capacity,
            policy: EvictionPolicy::default(),
            eviction_enabled: false,
            rng: SeededRng::from_optional_seed(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn eviction_enabled(&self) -> bool {
        self.eviction_enabled
    }

    /// Logical time of the next insertion.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    /// Width of stored feature vectors, plus one when `with_bias`. `None` while empty.
    pub fn feature_width(&self, with_bias: bool) -> Option<usize> {
        self.features
            .first()
            .map(|f| f.len() + usize::from(with_bias))
    }

    /// Width of stored label vectors. `None` while empty.
    pub fn label_width(&self) -> Option<usize> {
        self.labels.first().map(Vec::len)
    }

    /// Append one example.
    ///
    /// # Errors
    ///
    /// * [`DatasetError::WidthMismatch`] if the dataset is non-empty and either
    ///   width differs from the stored examples
    /// * [`DatasetError::Full`] if the dataset is at capacity and eviction is disabled
    ///
    /// A rejected example leaves the dataset unchanged.
    pub fn add(&mut self, feature: &[f32], label: &[f32]) -> Result<(), DatasetError> {
        if let (Some(fw), Some(lw)) = (self.feature_width(false), self.label_width()) {
            if feature.len() != fw || label.len() != lw {
                let err = DatasetError::WidthMismatch {
                    expected_feature: fw,
                    expected_label: lw,
                    feature: feature.len(),
                    label: label.len(),
                };
                warn!(%err, "rejected example");
                return Err(err);
            }
        }

        if self.len() >= self.capacity {
            if !self.eviction_enabled || self.capacity == 0 {
                let err = DatasetError::Full {
                    capacity: self.capacity,
                };
                warn!(%err, "rejected example");
                return Err(err);
            }
            self.evict_one();
        }

        self.features.push(feature.to_vec());
        self.labels.push(label.to_vec());
        self.timestamps.push(self.clock);
        self.clock += 1;
        debug!(size = self.len(), "added example");
        Ok(())
    }

    /// Remove one example chosen by the eviction policy. Returns the removed index.
    pub fn evict_one(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let index = match self.policy {
            EvictionPolicy::Fifo => 0,
            EvictionPolicy::RandomEqual => self.rng.gen_usize(self.len()),
            EvictionPolicy::RandomOlder => {
                let ages: Vec<u64> = self
                    .timestamps
                    .iter()
                    .map(|&t| self.clock.saturating_sub(t))
                    .collect();
                match self.rng.weighted_index(&ages) {
                    Some(index) => index,
                    None => self.rng.gen_usize(self.len()),
                }
            }
        };
        self.features.remove(index);
        self.labels.remove(index);
        self.timestamps.remove(index);
        debug!(index, policy = ?self.policy, "evicted example");
        Some(index)
    }

    /// Remove every example and reset the clock.
    pub fn clear(&mut self) {
        self.features.clear();
        self.labels.clear();
        self.timestamps.clear();
        self.clock = 0;
    }

    /// Replace the contents in bulk. Timestamps become `0..n` and the clock `n`.
    ///
    /// # Errors
    ///
    /// Count or width disagreements, or more examples than the capacity. The
    /// dataset is unchanged on error.
    pub fn load(
        &mut self,
        features: Vec<Vec<f32>>,
        labels: Vec<Vec<f32>>,
    ) -> Result<(), DatasetError> {
        if features.len() != labels.len() {
            return Err(DatasetError::CountMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        if features.len() > self.capacity {
            return Err(DatasetError::Full {
                capacity: self.capacity,
            });
        }
        if let (Some(f0), Some(l0)) = (features.first(), labels.first()) {
            let (fw, lw) = (f0.len(), l0.len());
            if let Some((f, l)) = features
                .iter()
                .zip(&labels)
                .find(|(f, l)| f.len() != fw || l.len() != lw)
            {
                return Err(DatasetError::WidthMismatch {
                    expected_feature: fw,
                    expected_label: lw,
                    feature: f.len(),
                    label: l.len(),
                });
            }
        }

        let n = features.len();
        self.features = features;
        self.labels = labels;
        self.timestamps = (0..n as u64).collect();
        self.clock = n as u64;
        Ok(())
    }

    pub fn set_eviction_enabled(&mut self, enabled: bool) {
        self.eviction_enabled = enabled;
        debug!(enabled, "eviction toggled");
    }

    pub fn set_eviction_policy(&mut self, policy: EvictionPolicy) {
        self.policy = policy;
    }

    /// Change the capacity, shrinking the contents if needed.
    ///
    /// Excess examples are evicted by policy when eviction is enabled and
    /// truncated from the end otherwise.
    pub fn set_max_examples(&mut self, capacity: usize) {
        self.capacity = capacity;
        if self.eviction_enabled {
            while self.len() > capacity {
                self.evict_one();
            }
        } else {
            self.features.truncate(capacity);
            self.labels.truncate(capacity);
            self.timestamps.truncate(capacity);
        }
    }

    pub fn raw_features(&self) -> &[Vec<f32>] {
        &self.features
    }

    pub fn labels(&self) -> &[Vec<f32>] {
        &self.labels
    }

    /// Copy of every feature vector, each followed by a constant `1.0` when `with_bias`.
    pub fn features(&self, with_bias: bool) -> Vec<Vec<f32>> {
        self.features
            .iter()
            .map(|f| with_bias_column(f, with_bias))
            .collect()
    }

    /// The whole dataset as training pairs.
    ///
    /// With eviction enabled the pairs come back in a freshly shuffled order;
    /// otherwise in insertion order.
    pub fn sample(&mut self, with_bias: bool) -> Examples {
        if !self.eviction_enabled {
            return (self.features(with_bias), self.labels.clone());
        }
        let order = self.rng.shuffled_indices(self.len());
        order
            .into_iter()
            .map(|i| {
                (
                    with_bias_column(&self.features[i], with_bias),
                    self.labels[i].clone(),
                )
            })
            .unzip()
    }
}

fn with_bias_column(feature: &[f32], with_bias: bool) -> Vec<f32> {
    let mut out = Vec::with_capacity(feature.len() + usize::from(with_bias));
    out.extend_from_slice(feature);
    if with_bias {
        out.push(1.0);
    }
    out
}
