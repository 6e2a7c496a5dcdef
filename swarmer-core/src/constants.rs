use std::time::Duration;

/// Request type tag attached to every exported event.
pub const REQUEST_TYPE: &str = "rpc";

/// Time a closing connection waits for in-flight calls before it is released.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Upper bound on how long shutdown waits for users to drain before force-stopping them.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Users spawned per second while ramping up.
pub const DEFAULT_SPAWN_RATE: f64 = 1.0;

pub const DEFAULT_USERS: usize = 1;
