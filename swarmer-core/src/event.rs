use crate::REQUEST_TYPE;
use std::fmt;
use std::time::{Duration, Instant};

/// gRPC canonical status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);
    pub const CANCELLED: StatusCode = StatusCode(1);
    pub const UNKNOWN: StatusCode = StatusCode(2);
    pub const INVALID_ARGUMENT: StatusCode = StatusCode(3);
    pub const DEADLINE_EXCEEDED: StatusCode = StatusCode(4);
    pub const NOT_FOUND: StatusCode = StatusCode(5);
    pub const ALREADY_EXISTS: StatusCode = StatusCode(6);
    pub const PERMISSION_DENIED: StatusCode = StatusCode(7);
    pub const RESOURCE_EXHAUSTED: StatusCode = StatusCode(8);
    pub const FAILED_PRECONDITION: StatusCode = StatusCode(9);
    pub const ABORTED: StatusCode = StatusCode(10);
    pub const OUT_OF_RANGE: StatusCode = StatusCode(11);
    pub const UNIMPLEMENTED: StatusCode = StatusCode(12);
    pub const INTERNAL: StatusCode = StatusCode(13);
    pub const UNAVAILABLE: StatusCode = StatusCode(14);
    pub const DATA_LOSS: StatusCode = StatusCode(15);
    pub const UNAUTHENTICATED: StatusCode = StatusCode(16);

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "OK",
            1 => "CANCELLED",
            2 => "UNKNOWN",
            3 => "INVALID_ARGUMENT",
            4 => "DEADLINE_EXCEEDED",
            5 => "NOT_FOUND",
            6 => "ALREADY_EXISTS",
            7 => "PERMISSION_DENIED",
            8 => "RESOURCE_EXHAUSTED",
            9 => "FAILED_PRECONDITION",
            10 => "ABORTED",
            11 => "OUT_OF_RANGE",
            12 => "UNIMPLEMENTED",
            13 => "INTERNAL",
            14 => "UNAVAILABLE",
            15 => "DATA_LOSS",
            16 => "UNAUTHENTICATED",
            _ => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// How a single RPC attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    /// The server answered with a non-OK status.
    Status { code: StatusCode, message: String },
    /// The call never produced a status (connection refused, reset, ...).
    Transport { message: String },
}

/// Error half of an [`Outcome`], as handed to exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct EventError {
    pub code: Option<StatusCode>,
    pub message: String,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => write!(f, "transport: {}", self.message),
        }
    }
}

/// Immutable record of one completed RPC attempt.
#[derive(Debug, Clone)]
pub struct RpcEvent {
    pub request_type: &'static str,
    pub method: &'static str,
    pub started_at: Instant,
    pub elapsed: Duration,
    pub response_size: u64,
    pub outcome: Outcome,
}

impl RpcEvent {
    pub fn new(
        method: &'static str,
        started_at: Instant,
        elapsed: Duration,
        response_size: u64,
        outcome: Outcome,
    ) -> Self {
        Self {
            request_type: REQUEST_TYPE,
            method,
            started_at,
            elapsed,
            response_size,
            outcome,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.
    }

    pub fn finished_at(&self) -> Instant {
        self.started_at + self.elapsed
    }

    pub fn is_error(&self) -> bool {
        !matches!(self.outcome, Outcome::Success)
    }

    pub fn error(&self) -> Option<EventError> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Status { code, message } => Some(EventError {
                code: Some(*code),
                message: message.clone(),
            }),
            Outcome::Transport { message } => Some(EventError {
                code: None,
                message: message.clone(),
            }),
        }
    }
}
