use std::path::PathBuf;
use swarmer::core::SettingsError;
use swarmer::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid environment override: {0}")]
    Env(String),

    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(String),
}
