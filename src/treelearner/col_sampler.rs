//! Column sampler for feature selection in tree learning.
//!
//! Sampling is nested: the tree-level set is drawn from all features, each
//! depth draws its level set from the tree set, and each node draws from
//! its level set. Every returned set is sorted by feature index.

use crate::config::TrainParam;
use crate::core::types::FeatureIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Random number generator wrapper for reproducible sampling
#[derive(Debug)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    /// Creates a generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws `k` of `features` without replacement, returned sorted.
    pub fn sample(&mut self, features: &[FeatureIndex], k: usize) -> Vec<FeatureIndex> {
        if k >= features.len() {
            return features.to_vec();
        }
        let mut pool = features.to_vec();
        let (chosen, _) = pool.partial_shuffle(&mut self.rng, k);
        let mut chosen = chosen.to_vec();
        chosen.sort_unstable();
        chosen
    }
}

/// Feature sampler for one grower, persisting its random state across trees.
#[derive(Debug)]
pub struct ColumnSampler {
    fraction_bytree: f64,
    fraction_bylevel: f64,
    fraction_bynode: f64,
    random: Random,
    by_tree: Vec<FeatureIndex>,
    by_level: BTreeMap<u32, Vec<FeatureIndex>>,
}

impl ColumnSampler {
    /// Creates a sampler from the `colsample_*` ratios of `param`.
    pub fn new(param: &TrainParam, seed: u64) -> Self {
        Self {
            fraction_bytree: param.colsample_bytree,
            fraction_bylevel: param.colsample_bylevel,
            fraction_bynode: param.colsample_bynode,
            random: Random::new(seed),
            by_tree: Vec::new(),
            by_level: BTreeMap::new(),
        }
    }

    /// Number of features kept out of `total_cnt`, at least one when any exist.
    pub fn get_cnt(total_cnt: usize, fraction: f64) -> usize {
        let min_val = total_cnt.min(1);
        let used = (total_cnt as f64 * fraction).round() as usize;
        used.max(min_val)
    }

    fn draw(&mut self, features: &[FeatureIndex], fraction: f64) -> Vec<FeatureIndex> {
        if fraction >= 1.0 {
            return features.to_vec();
        }
        let k = Self::get_cnt(features.len(), fraction);
        self.random.sample(features, k)
    }

    /// Starts a new tree over `num_features` features.
    pub fn init(&mut self, num_features: usize) {
        let all: Vec<FeatureIndex> = (0..num_features).collect();
        self.by_tree = self.draw(&all, self.fraction_bytree);
        self.by_level.clear();
        log::debug!(
            "column sampler kept {} of {} features for this tree",
            self.by_tree.len(),
            num_features
        );
    }

    /// Features sampled for the current tree.
    pub fn by_tree(&self) -> &[FeatureIndex] {
        &self.by_tree
    }

    /// Features sampled for `depth`, drawn once per tree and level.
    pub fn by_level(&mut self, depth: u32) -> Vec<FeatureIndex> {
        if self.fraction_bylevel >= 1.0 {
            return self.by_tree.clone();
        }
        if let Some(level) = self.by_level.get(&depth) {
            return level.clone();
        }
        let tree = self.by_tree.clone();
        let level = self.draw(&tree, self.fraction_bylevel);
        self.by_level.insert(depth, level.clone());
        level
    }

    /// Features offered to split search at one node of depth `depth`.
    pub fn by_node(&mut self, depth: u32) -> Vec<FeatureIndex> {
        let level = self.by_level(depth);
        self.draw(&level, self.fraction_bynode)
    }
}
