mod config;
mod constants;
mod event;
mod metrics;
mod stats;

pub use config::*;
pub use constants::*;
pub use event::*;
pub use metrics::*;
pub use stats::*;
