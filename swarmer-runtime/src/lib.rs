//! Command line runtime for swarmer load tests.
mod cli;
mod error;
mod loader;
mod reporter;
pub mod runtime;
mod telemetry;

pub use crate::cli::SwarmerCli;
pub use crate::error::RuntimeError;
pub use crate::loader::{ConfigLoader, ENV_PREFIX};
pub use crate::runtime::{
    exit_status, SwarmerRuntime, EXIT_CLEAN, EXIT_FORCED_STOP, EXIT_TARGET_MISSED,
};
#[cfg(feature = "metrics")]
pub use crate::telemetry::install_prometheus;
pub use crate::telemetry::{init_logging, DEFAULT_LOG_FILTER};
