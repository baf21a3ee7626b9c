//! Numerical constants and configuration defaults.

/// Minimum loss reduction for a split to count as an improvement.
/// Gains at or below this value are treated as zero.
pub const K_RT_EPS: f64 = 1e-6;

/// Default maximum tree depth.
pub const DEFAULT_MAX_DEPTH: u32 = 6;

/// Default maximum number of leaves. Zero means unlimited.
pub const DEFAULT_MAX_LEAVES: u32 = 0;

/// Default learning rate (shrinkage) applied to leaf values.
pub const DEFAULT_LEARNING_RATE: f64 = 0.3;

/// Default L2 regularization on leaf weights.
pub const DEFAULT_REG_LAMBDA: f64 = 1.0;

/// Default minimum hessian sum required in each child.
pub const DEFAULT_MIN_CHILD_WEIGHT: f64 = 1.0;

/// Default maximum number of bins per feature.
pub const DEFAULT_MAX_BIN: usize = 256;

/// Columns whose fraction of present values falls below this are stored sparse.
pub const DEFAULT_SPARSE_THRESHOLD: f64 = 0.2;

/// Default upper bound on nodes expanded together in depth-wise growth.
pub const DEFAULT_MAX_NODE_BATCH_SIZE: usize = 256;

/// Default number of threads. Zero means use all available cores.
pub const DEFAULT_NUM_THREADS: usize = 0;

/// Default random seed for reproducibility.
pub const DEFAULT_RANDOM_SEED: u64 = 0;

/// Rows per histogram accumulation block.
pub const HIST_ROWS_PER_BLOCK: usize = 4096;

/// Upper bound on partial histograms merged for one node.
pub const MAX_HIST_BLOCKS: usize = 64;

/// Rows per block when partitioning a node.
pub const PARTITION_BLOCK_SIZE: usize = 2048;

/// Library version string.
pub const QUANTILE_HIST_VERSION: &str = env!("CARGO_PKG_VERSION");
