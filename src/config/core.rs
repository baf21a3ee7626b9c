//! Training parameters for tree growth and their builder.
//!
//! [`TrainParam`] holds every knob the tree builder reads. It can be built in
//! code through [`ConfigBuilder`], parsed from TOML or JSON, or overridden from
//! `QHIST_*` environment variables. All entry points finish with
//! [`TrainParam::validate`].

use crate::core::constants::*;
use crate::core::error::{GrowerError, Result};
use crate::core::types::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters controlling how a single tree is grown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParam {
    // Structure limits
    /// Maximum depth of a node; nodes at this depth become leaves
    pub max_depth: u32,
    /// Maximum number of leaves (0 for unlimited)
    pub max_leaves: u32,
    /// Node expansion order
    pub grow_policy: GrowPolicy,
    /// Maximum number of nodes expanded together in one depth-wise batch
    pub max_node_batch_size: usize,

    // Leaf values and regularization
    /// Shrinkage applied to every leaf value
    pub learning_rate: f64,
    /// Minimum loss reduction required to split (gamma)
    pub min_split_loss: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Maximum absolute leaf weight before shrinkage (0 for unlimited)
    pub max_delta_step: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,

    // Sampling
    /// Fraction of rows used to grow each tree
    pub subsample: f64,
    /// Fraction of features sampled once per tree
    pub colsample_bytree: f64,
    /// Fraction of the tree-level features sampled per depth
    pub colsample_bylevel: f64,
    /// Fraction of the level features sampled per node
    pub colsample_bynode: f64,

    // Constraints
    /// Per-feature monotone constraint: -1 decreasing, 0 none, 1 increasing
    pub monotone_constraints: Vec<i8>,
    /// Groups of features allowed to interact along one branch
    pub interaction_constraints: Vec<Vec<FeatureIndex>>,

    // Data layout
    /// Maximum number of bins a feature may use
    pub max_bin: usize,
    /// Present-value fraction below which a column is stored sparse
    pub sparse_threshold: f64,

    // Runtime
    /// Random seed for row and column sampling
    pub seed: u64,
    /// Number of worker threads (0 for all available cores)
    pub nthread: usize,
}

impl Default for TrainParam {
    fn default() -> Self {
        TrainParam {
            max_depth: DEFAULT_MAX_DEPTH,
            max_leaves: DEFAULT_MAX_LEAVES,
            grow_policy: GrowPolicy::DepthWise,
            max_node_batch_size: DEFAULT_MAX_NODE_BATCH_SIZE,

            learning_rate: DEFAULT_LEARNING_RATE,
            min_split_loss: 0.0,
            reg_lambda: DEFAULT_REG_LAMBDA,
            reg_alpha: 0.0,
            max_delta_step: 0.0,
            min_child_weight: DEFAULT_MIN_CHILD_WEIGHT,

            subsample: 1.0,
            colsample_bytree: 1.0,
            colsample_bylevel: 1.0,
            colsample_bynode: 1.0,

            monotone_constraints: Vec::new(),
            interaction_constraints: Vec::new(),

            max_bin: DEFAULT_MAX_BIN,
            sparse_threshold: DEFAULT_SPARSE_THRESHOLD,

            seed: DEFAULT_RANDOM_SEED,
            nthread: DEFAULT_NUM_THREADS,
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(GrowerError::invalid_parameter(
            name,
            value.to_string(),
            "must be in range (0.0, 1.0]",
        ));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !(value >= 0.0) {
        return Err(GrowerError::invalid_parameter(
            name,
            value.to_string(),
            "must be non-negative",
        ));
    }
    Ok(())
}

impl TrainParam {
    /// Create a new parameter set with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the parameters independently of any data
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(GrowerError::invalid_parameter(
                "max_depth",
                "0",
                "must be at least 1",
            ));
        }

        if self.max_leaves == 1 {
            return Err(GrowerError::invalid_parameter(
                "max_leaves",
                "1",
                "must be 0 (unlimited) or at least 2",
            ));
        }

        if self.max_node_batch_size == 0 {
            return Err(GrowerError::invalid_parameter(
                "max_node_batch_size",
                "0",
                "must be at least 1",
            ));
        }

        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(GrowerError::invalid_parameter(
                "learning_rate",
                self.learning_rate.to_string(),
                "must be a positive finite number",
            ));
        }

        check_non_negative("min_split_loss", self.min_split_loss)?;
        check_non_negative("reg_lambda", self.reg_lambda)?;
        check_non_negative("reg_alpha", self.reg_alpha)?;
        check_non_negative("max_delta_step", self.max_delta_step)?;
        check_non_negative("min_child_weight", self.min_child_weight)?;

        check_fraction("subsample", self.subsample)?;
        check_fraction("colsample_bytree", self.colsample_bytree)?;
        check_fraction("colsample_bylevel", self.colsample_bylevel)?;
        check_fraction("colsample_bynode", self.colsample_bynode)?;

        if let Some(bad) = self
            .monotone_constraints
            .iter()
            .find(|&&c| !(-1..=1).contains(&c))
        {
            return Err(GrowerError::invalid_parameter(
                "monotone_constraints",
                bad.to_string(),
                "entries must be -1, 0 or 1",
            ));
        }

        if self.interaction_constraints.iter().any(|group| group.is_empty()) {
            return Err(GrowerError::invalid_parameter(
                "interaction_constraints",
                format!("{:?}", self.interaction_constraints),
                "groups must not be empty",
            ));
        }

        if self.max_bin < 2 {
            return Err(GrowerError::invalid_parameter(
                "max_bin",
                self.max_bin.to_string(),
                "must be at least 2",
            ));
        }

        if !(self.sparse_threshold >= 0.0 && self.sparse_threshold <= 1.0) {
            return Err(GrowerError::invalid_parameter(
                "sparse_threshold",
                self.sparse_threshold.to_string(),
                "must be in range [0.0, 1.0]",
            ));
        }

        Ok(())
    }

    /// Validate the parameters against the shape of a matrix.
    pub fn validate_for_features(&self, num_features: usize, max_num_bins: usize) -> Result<()> {
        if self.monotone_constraints.len() > num_features {
            return Err(GrowerError::invalid_parameter(
                "monotone_constraints",
                self.monotone_constraints.len().to_string(),
                format!("more constraints than the {} features", num_features),
            ));
        }

        for group in &self.interaction_constraints {
            if let Some(&feature) = group.iter().find(|&&f| f >= num_features) {
                return Err(GrowerError::invalid_parameter(
                    "interaction_constraints",
                    feature.to_string(),
                    format!("feature index out of range for {} features", num_features),
                ));
            }
        }

        if max_num_bins > self.max_bin {
            return Err(GrowerError::invalid_parameter(
                "max_bin",
                self.max_bin.to_string(),
                format!("matrix has a feature with {} bins", max_num_bins),
            ));
        }

        Ok(())
    }

    /// Number of worker threads to use
    pub fn effective_num_threads(&self) -> usize {
        if self.nthread == 0 {
            num_cpus::get()
        } else {
            self.nthread
        }
    }

    /// Whether any monotone constraint is active
    pub fn has_monotone_constraints(&self) -> bool {
        self.monotone_constraints.iter().any(|&c| c != 0)
    }

    /// Parse parameters from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let param: TrainParam = toml::from_str(content)?;
        param.validate()?;
        Ok(param)
    }

    /// Parse parameters from a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let param: TrainParam = serde_json::from_str(content)?;
        param.validate()?;
        Ok(param)
    }

    /// Load parameters from a `.toml` or `.json` file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(GrowerError::config(
                "Unsupported config file format. Use .json or .toml",
            )),
        }
    }

    /// Save parameters to a `.toml` or `.json` file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| GrowerError::config(format!("Failed to serialize to TOML: {}", e)))?,
            _ => {
                return Err(GrowerError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `QHIST_NTHREAD`, `QHIST_SEED`, `QHIST_MAX_DEPTH` and
    /// `QHIST_GROW_POLICY` overrides from the environment.
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("QHIST_NTHREAD") {
            self.nthread = val
                .parse()
                .map_err(|_| GrowerError::config("Invalid QHIST_NTHREAD"))?;
        }

        if let Ok(val) = std::env::var("QHIST_SEED") {
            self.seed = val
                .parse()
                .map_err(|_| GrowerError::config("Invalid QHIST_SEED"))?;
        }

        if let Ok(val) = std::env::var("QHIST_MAX_DEPTH") {
            self.max_depth = val
                .parse()
                .map_err(|_| GrowerError::config("Invalid QHIST_MAX_DEPTH"))?;
        }

        if let Ok(val) = std::env::var("QHIST_GROW_POLICY") {
            self.grow_policy = val.parse().map_err(GrowerError::config)?;
        }

        self.validate()
    }
}

/// Builder for fluent parameter construction
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    param: TrainParam,
}

impl ConfigBuilder {
    /// Create a new builder starting from defaults
    pub fn new() -> Self {
        ConfigBuilder {
            param: TrainParam::default(),
        }
    }

    /// Set the maximum tree depth
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.param.max_depth = depth;
        self
    }

    /// Set the maximum number of leaves
    pub fn max_leaves(mut self, leaves: u32) -> Self {
        self.param.max_leaves = leaves;
        self
    }

    /// Set the growth policy
    pub fn grow_policy(mut self, policy: GrowPolicy) -> Self {
        self.param.grow_policy = policy;
        self
    }

    /// Set the depth-wise batch size
    pub fn max_node_batch_size(mut self, size: usize) -> Self {
        self.param.max_node_batch_size = size;
        self
    }

    /// Set the learning rate
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.param.learning_rate = rate;
        self
    }

    /// Set the minimum split loss (gamma)
    pub fn min_split_loss(mut self, gamma: f64) -> Self {
        self.param.min_split_loss = gamma;
        self
    }

    /// Set L2 regularization
    pub fn reg_lambda(mut self, lambda: f64) -> Self {
        self.param.reg_lambda = lambda;
        self
    }

    /// Set L1 regularization
    pub fn reg_alpha(mut self, alpha: f64) -> Self {
        self.param.reg_alpha = alpha;
        self
    }

    /// Set the maximum delta step
    pub fn max_delta_step(mut self, step: f64) -> Self {
        self.param.max_delta_step = step;
        self
    }

    /// Set the minimum child hessian sum
    pub fn min_child_weight(mut self, weight: f64) -> Self {
        self.param.min_child_weight = weight;
        self
    }

    /// Set the row subsample ratio
    pub fn subsample(mut self, ratio: f64) -> Self {
        self.param.subsample = ratio;
        self
    }

    /// Set the per-tree column sample ratio
    pub fn colsample_bytree(mut self, ratio: f64) -> Self {
        self.param.colsample_bytree = ratio;
        self
    }

    /// Set the per-level column sample ratio
    pub fn colsample_bylevel(mut self, ratio: f64) -> Self {
        self.param.colsample_bylevel = ratio;
        self
    }

    /// Set the per-node column sample ratio
    pub fn colsample_bynode(mut self, ratio: f64) -> Self {
        self.param.colsample_bynode = ratio;
        self
    }

    /// Set per-feature monotone constraints
    pub fn monotone_constraints(mut self, constraints: Vec<i8>) -> Self {
        self.param.monotone_constraints = constraints;
        self
    }

    /// Set interaction constraint groups
    pub fn interaction_constraints(mut self, groups: Vec<Vec<FeatureIndex>>) -> Self {
        self.param.interaction_constraints = groups;
        self
    }

    /// Set the maximum number of bins
    pub fn max_bin(mut self, max_bin: usize) -> Self {
        self.param.max_bin = max_bin;
        self
    }

    /// Set the sparse storage threshold
    pub fn sparse_threshold(mut self, threshold: f64) -> Self {
        self.param.sparse_threshold = threshold;
        self
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.param.seed = seed;
        self
    }

    /// Set the number of threads
    pub fn nthread(mut self, threads: usize) -> Self {
        self.param.nthread = threads;
        self
    }

    /// Build and validate the parameters
    pub fn build(self) -> Result<TrainParam> {
        self.param.validate()?;
        Ok(self.param)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
