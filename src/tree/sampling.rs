//! Row subsampling for tree construction.

use crate::core::types::RowIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bernoulli row sampler. Its random state carries over from tree to tree.
#[derive(Debug)]
pub struct RowSampler {
    rng: StdRng,
}

impl RowSampler {
    /// Creates a sampler seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        RowSampler {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Keeps each of `num_rows` rows independently with probability
    /// `subsample`. The result is sorted; a ratio of one keeps every row
    /// without drawing.
    pub fn sample(&mut self, num_rows: usize, subsample: f64) -> Vec<RowIndex> {
        if subsample >= 1.0 {
            return (0..num_rows as RowIndex).collect();
        }
        (0..num_rows as RowIndex)
            .filter(|_| self.rng.gen::<f64>() < subsample)
            .collect()
    }
}
