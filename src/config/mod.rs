//! Configuration management for tree growth.
//!
//! Parameters are validated once when they enter the crate, and again against
//! the matrix shape when a tree is grown.

pub mod core;

pub use core::{ConfigBuilder, TrainParam};

/// Default configuration file name used by the `grow_tree` binary.
pub const DEFAULT_CONFIG_FILE: &str = "quantile_hist.toml";
