use swarmer_core::{Outcome, SettingsError, StatusCode};
use thiserror::Error;

/// Failure of a single RPC.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    #[error("rpc failed with {code}: {message}")]
    Status { code: StatusCode, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// The connection was marked closed before the call was dispatched.
    #[error("connection is closed")]
    Closed,

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<StatusCode> {
        match self {
            RpcError::Status { code, .. } => Some(*code),
            RpcError::Decode(_) => Some(StatusCode::INTERNAL),
            RpcError::Transport(_) | RpcError::Closed => None,
        }
    }

    pub(crate) fn outcome(&self) -> Outcome {
        match self {
            RpcError::Status { code, message } => Outcome::Status {
                code: *code,
                message: message.clone(),
            },
            RpcError::Decode(message) => Outcome::Status {
                code: StatusCode::INTERNAL,
                message: message.clone(),
            },
            RpcError::Transport(message) => Outcome::Transport {
                message: message.clone(),
            },
            RpcError::Closed => Outcome::Transport {
                message: "connection is closed".to_string(),
            },
        }
    }
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        Self::Status {
            code: StatusCode(status.code() as i32),
            message: status.message().to_string(),
        }
    }
}

impl From<prost::DecodeError> for RpcError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Response size introspection failure. Never surfaces past the interceptor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MeasureError {
    #[error("response does not support this measurement")]
    Unsupported,

    #[error("measurement failed: {0}")]
    Failed(String),
}

/// Fatal problems with how a user class or population is set up.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("target host is not set")]
    MissingEndpoint,

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("user class {class} requires capability {capability:?} but none is bound")]
    MissingCapability {
        class: String,
        capability: &'static str,
    },

    #[error("capability {0:?} is not available on this user")]
    UnknownCapability(&'static str),

    #[error("user class {0} has a weight of zero")]
    ZeroWeight(String),

    #[error("task set {0:?} has no tasks")]
    EmptyTaskSet(String),

    #[error("no user classes were registered")]
    NoUserClasses,
}

/// Why an action did not complete normally.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A business-level failure, e.g. a sign in that was rejected.
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tonic_status_conversion() {
        let err: RpcError = tonic::Status::not_found("no vacancy").into();
        assert_eq!(err, RpcError::status(StatusCode::NOT_FOUND, "no vacancy"));
        assert_eq!(err.code(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn outcomes() {
        assert_eq!(
            RpcError::Transport("refused".into()).outcome(),
            Outcome::Transport {
                message: "refused".into()
            }
        );
        assert!(matches!(
            RpcError::Decode("bad".into()).outcome(),
            Outcome::Status {
                code: StatusCode::INTERNAL,
                ..
            }
        ));
    }
}
