//! Error handling and error types for the quantile histogram tree grower.
//!
//! Every fallible operation in the crate returns [`Result`], which carries a
//! [`GrowerError`]. The prediction cache refresh is the one exception: its
//! only failure mode is a stale cache, reported through [`CacheMismatch`] so
//! callers can fall back to a full re-prediction.

use std::io;
use thiserror::Error;

/// Main error type for tree growth.
#[derive(Error, Debug)]
pub enum GrowerError {
    /// Configuration and validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Rejected value
        value: String,
        /// Accepted range or rule
        reason: String,
    },

    /// Internal bookkeeping disagrees with the data (row sets, histograms, features)
    #[error("Data consistency error: {message}")]
    DataConsistency {
        /// Description of the inconsistency
        message: String,
    },

    /// Dimension mismatch errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected size
        expected: String,
        /// Size found
        actual: String,
    },

    /// Thread pool construction errors
    #[error("Threading error: {message}")]
    Threading {
        /// Pool construction failure
        message: String,
    },

    /// Internal library errors (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the broken invariant
        message: String,
    },

    /// File I/O errors
    #[error("I/O error: {source}")]
    IO {
        /// Underlying I/O error
        #[from]
        source: io::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {source}")]
    Json {
        /// Underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML error: {source}")]
    Toml {
        /// Underlying TOML error
        #[from]
        source: toml::de::Error,
    },
}

/// Reasons a prediction cache cannot be refreshed incrementally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheMismatch {
    /// No tree has been grown yet
    #[error("no tree has been grown")]
    NoTree,

    /// The cache belongs to a different matrix than the last grown tree
    #[error("prediction cache refers to a different matrix")]
    DifferentMatrix,

    /// The cache length does not match the number of rows
    #[error("prediction cache holds {actual} rows, expected {expected}")]
    RowCount {
        /// Rows in the matrix
        expected: usize,
        /// Entries in the cache
        actual: usize,
    },
}

/// Type alias for Results using GrowerError
pub type Result<T> = std::result::Result<T, GrowerError>;

impl GrowerError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GrowerError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        GrowerError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a data consistency error
    pub fn data_consistency<S: Into<String>>(message: S) -> Self {
        GrowerError::DataConsistency {
            message: message.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch<E, A>(expected: E, actual: A) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        GrowerError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a threading error
    pub fn threading<S: Into<String>>(message: S) -> Self {
        GrowerError::Threading {
            message: message.into(),
        }
    }

    /// Create an internal error (should be used sparingly)
    pub fn internal<S: Into<String>>(message: S) -> Self {
        GrowerError::Internal {
            message: message.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GrowerError::Config { .. } => "config",
            GrowerError::InvalidParameter { .. } => "invalid_parameter",
            GrowerError::DataConsistency { .. } => "data_consistency",
            GrowerError::DimensionMismatch { .. } => "dimension_mismatch",
            GrowerError::Threading { .. } => "threading",
            GrowerError::Internal { .. } => "internal",
            GrowerError::IO { .. } => "io",
            GrowerError::Json { .. } => "json",
            GrowerError::Toml { .. } => "toml",
        }
    }

    /// Whether the error stems from user-supplied configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GrowerError::Config { .. } | GrowerError::InvalidParameter { .. }
        )
    }
}
