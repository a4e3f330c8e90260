//! Seedable random number generation owned by networks and datasets.
//!
//! Each [`crate::network::Mlp`] and [`crate::dataset::Dataset`] carries its own
//! generator so weight initialization, shuffling and eviction are reproducible
//! when a seed is supplied.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Owned RNG with the handful of draws the learning engine needs.
#[derive(Debug, Clone)]
pub struct SeededRng {
    inner: StdRng,
}

impl SeededRng {
    /// Create a generator with an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            inner: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is given, entropy otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::from_entropy(),
        }
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.inner.gen::<f32>()
    }

    /// Uniform sample between `low` and `high`.
    ///
    /// Returns `low` for an empty range or when either bound is not finite.
    /// The draw is interpolated, so ranges wider than `f32::MAX` such as
    /// `[-f32::MAX, f32::MAX]` are accepted.
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        if !(low < high) || !low.is_finite() || !high.is_finite() {
            return low;
        }
        let t = self.next_f32();
        (low * (1.0 - t) + high * t).clamp(low, high)
    }

    /// Uniform sample in [-limit, limit], drawn as `[-1, 1] * limit`.
    pub fn symmetric(&mut self, limit: f32) -> f32 {
        let limit = limit.abs();
        if limit == 0.0 || !limit.is_finite() {
            return 0.0;
        }
        self.inner.gen_range(-1.0f32..=1.0) * limit
    }

    /// Integer sample in [0, upper). Returns 0 when `upper` is 0.
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            self.inner.gen_range(0..upper)
        }
    }

    /// Index chosen with probability proportional to its weight.
    ///
    /// Returns `None` when the slice is empty or every weight is zero.
    pub fn weighted_index(&mut self, weights: &[u64]) -> Option<usize> {
        let dist = WeightedIndex::new(weights).ok()?;
        Some(dist.sample(&mut self.inner))
    }

    /// Gaussian sample with the given mean and standard deviation.
    pub fn gaussian(&mut self, mean: f32, std_dev: f32) -> f32 {
        match Normal::new(mean, std_dev.abs()) {
            Ok(normal) => normal.sample(&mut self.inner),
            Err(_) => mean,
        }
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, data: &mut [T]) {
        data.shuffle(&mut self.inner);
    }

    /// `0..len` in a freshly shuffled order.
    pub fn shuffled_indices(&mut self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        self.shuffle(&mut indices);
        indices
    }
}
