//! Training data in quantized form.
//!
//! Quantile sketching happens upstream; this module only stores the bin
//! indices and the bin upper bounds that came out of it.

pub mod quantized;

pub use quantized::{value_to_bin, FeatureColumn, MatrixId, QuantizedMatrix};
