//! Core infrastructure shared by every part of the tree grower.
//!
//! - [`types`]: gradient pairs, accumulated statistics and index aliases
//! - [`constants`]: numerical tolerances and configuration defaults
//! - [`error`]: the crate error type and the prediction cache mismatch
//! - [`monitor`]: phase timing hooks injected into the tree builder

pub mod constants;
pub mod error;
pub mod monitor;
pub mod types;

pub use constants::*;
pub use error::{CacheMismatch, GrowerError, Result};
pub use monitor::{Monitor, NoopMonitor, TimerMonitor};
pub use types::*;

use std::sync::Once;

static CORE_INIT: Once = Once::new();

/// Initialize logging for the library.
///
/// Safe to call more than once. An already installed logger is left in place.
pub fn initialize_core() {
    CORE_INIT.call_once(|| {
        let _ = env_logger::try_init();
        log::debug!(
            "quantile-hist {} initialized with {} available cores",
            QUANTILE_HIST_VERSION,
            num_cpus::get()
        );
    });
}

/// Check if [`initialize_core`] has run.
pub fn is_core_initialized() -> bool {
    CORE_INIT.is_completed()
}
