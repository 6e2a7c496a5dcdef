//! Logging and metrics export setup.
use crate::error::RuntimeError;
#[cfg(feature = "metrics")]
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const DEFAULT_LOG_FILTER: &str = "swarmer=info,swarmer_runtime=info,vacancy_load=info";

/// Installs the global `tracing` subscriber. An explicit `filter` wins over
/// `RUST_LOG`, which wins over [`DEFAULT_LOG_FILTER`].
pub fn init_logging(filter: Option<&str>) -> Result<(), RuntimeError> {
    let filter = match filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER)),
    }
    .map_err(|e| RuntimeError::Logging(e.to_string()))?;

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| RuntimeError::Logging(e.to_string()))
}

#[cfg(feature = "metrics")]
pub fn install_prometheus(addr: SocketAddr) -> Result<(), RuntimeError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| RuntimeError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_is_reported() {
        let err = init_logging(Some("swarmer=loud")).unwrap_err();
        assert!(matches!(err, RuntimeError::Logging(_)));
    }
}
