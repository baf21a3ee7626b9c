//! # quantile-hist
//!
//! Histogram-based growth of a single regression tree over a quantized
//! training matrix, the inner loop of a gradient-boosted tree trainer.
//!
//! Given one gradient pair per row and a matrix whose features are already
//! mapped to bins, [`QuantileHistMaker::grow_tree`] returns the tree and the
//! leaf reached by every row. The grower keeps its buffers between calls, so
//! a boosting loop creates it once and calls it once per round.
//!
//! ## Features
//!
//! - **Histogram subtraction**: only the smaller child of a split is
//!   accumulated from rows; its sibling is the parent minus that child.
//! - **Deterministic parallelism**: histogram blocks, row partitioning and
//!   split search run on a Rayon pool, and results do not depend on the
//!   number of threads.
//! - **Growth policies**: depth-wise and loss-guided expansion, with
//!   `max_depth`, `max_leaves` and batched levels.
//! - **Constraints**: monotone constraints with bound propagation and
//!   feature interaction groups.
//! - **Sampling**: row subsampling plus column sampling by tree, level and
//!   node.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quantile_hist::{ConfigBuilder, GradientPair, QuantileHistMaker, QuantizedMatrix};
//!
//! # fn main() -> quantile_hist::Result<()> {
//! let matrix = QuantizedMatrix::from_column_bins(
//!     4,
//!     vec![vec![Some(0), Some(0), Some(1), Some(1)]],
//!     vec![vec![0.5, 1.5]],
//!     0.2,
//! )?;
//! let gradients: Vec<_> = [-2.0, -1.5, 1.0, 2.5]
//!     .iter()
//!     .map(|&g| GradientPair::new(g, 1.0))
//!     .collect();
//!
//! let param = ConfigBuilder::new()
//!     .max_depth(3)
//!     .min_child_weight(0.5)
//!     .build()?;
//! let mut maker = QuantileHistMaker::new(param)?;
//! let grown = maker.grow_tree(&gradients, &matrix)?;
//!
//! let mut predictions = vec![0.0; 4];
//! maker
//!     .update_prediction_cache(&matrix, &mut predictions)
//!     .expect("cache belongs to this matrix");
//! println!("{}", grown.tree);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    non_snake_case,
    non_upper_case_globals
)]

// Core infrastructure module - always available
pub mod core;

// Configuration management module
pub mod config;

// Quantized matrix module
pub mod dataset;

// Tree structures, histograms and split search
pub mod tree;

// Growth orchestration
pub mod treelearner;

// Re-export core functionality for convenience
pub use core::{
    constants::*,
    error::{CacheMismatch, GrowerError, Result},
    monitor::{Monitor, NoopMonitor, TimerMonitor},
    types::*,
};

// Re-export configuration functionality
pub use config::{ConfigBuilder, TrainParam};

// Re-export dataset functionality
pub use dataset::{value_to_bin, MatrixId, QuantizedMatrix};

// Re-export tree functionality
pub use tree::{RegTree, SplitCondition, TreeNode};

// Re-export growth functionality
pub use treelearner::{GrownTree, NodePositions, QuantileHistMaker};

// Version information
pub use core::constants::QUANTILE_HIST_VERSION as VERSION;

/// Initialize logging for the library.
///
/// Optional: the grower works without it, but nothing is logged until a
/// logger is installed.
///
/// # Examples
///
/// ```rust
/// quantile_hist::init();
/// assert!(quantile_hist::is_initialized());
/// ```
pub fn init() {
    core::initialize_core()
}

/// Check if the library has been initialized.
pub fn is_initialized() -> bool {
    core::is_core_initialized()
}
