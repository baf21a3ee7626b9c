//! Tree growth orchestration.

/// Column sampler module
pub mod col_sampler;
/// Row partition module
pub mod data_partition;
/// Expansion queue module
pub mod driver;
/// Expansion entry module
pub mod expand_entry;
/// Quantile histogram grower module
pub mod quantile_hist;

pub use col_sampler::ColumnSampler;
pub use data_partition::{NodeSplit, RowPartitioner, RowRange};
pub use driver::Driver;
pub use expand_entry::{CpuExpandEntry, ExpandEntry};
pub use quantile_hist::{GrownTree, NodePositions, QuantileHistMaker};
