//! Gradient histograms per tree node.

pub mod builder;
pub mod pool;

pub use builder::{HistogramBuilder, SubtractionPlan};
pub use pool::{
    FeatureHistogram, HistogramLayout, HistogramPool, HistogramPoolStatistics, NodeHistogram,
};
