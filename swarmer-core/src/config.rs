use crate::{DEFAULT_DRAIN_GRACE, DEFAULT_SPAWN_RATE, DEFAULT_STOP_TIMEOUT, DEFAULT_USERS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettingsError {
    #[error("target host is not set")]
    MissingHost,

    #[error("spawn rate must be a positive number of users per second, got {0}")]
    InvalidSpawnRate(f64),

    #[error("invalid think time: {0}")]
    InvalidThinkTime(String),
}

/// Pause a user takes between two consecutive actions.
///
/// Externally tagged: `{"between": {"min": 0.5, "max": 2}}`. In YAML, read it
/// through `serde_yaml::with::singleton_map_recursive` to use the same map form.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkTime {
    Constant(#[serde_as(as = "DurationSecondsWithFrac<f64>")] Duration),
    /// Uniformly distributed in `[min, max]`.
    Between {
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        min: Duration,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        max: Duration,
    },
    /// Normally distributed, clamped at zero.
    Normal {
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        mean: Duration,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        std_dev: Duration,
    },
    /// Keeps the start of consecutive actions this far apart; the action's own
    /// duration is subtracted from the pause.
    ConstantPacing(#[serde_as(as = "DurationSecondsWithFrac<f64>")] Duration),
}

impl ThinkTime {
    pub const NONE: ThinkTime = ThinkTime::Constant(Duration::ZERO);

    pub fn constant(duration: Duration) -> Self {
        Self::Constant(duration)
    }

    pub fn between(min: Duration, max: Duration) -> Self {
        Self::Between { min, max }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        match self {
            ThinkTime::Between { min, max } if min > max => Err(SettingsError::InvalidThinkTime(
                format!("min {min:?} is greater than max {max:?}"),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for ThinkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use humantime::format_duration as hd;
        match self {
            ThinkTime::Constant(d) => write!(f, "constant({})", hd(*d)),
            ThinkTime::Between { min, max } => write!(f, "between({}, {})", hd(*min), hd(*max)),
            ThinkTime::Normal { mean, std_dev } => {
                write!(f, "normal({}, {})", hd(*mean), hd(*std_dev))
            }
            ThinkTime::ConstantPacing(d) => write!(f, "constant_pacing({})", hd(*d)),
        }
    }
}

/// Per-class adjustments loaded from configuration, keyed by class name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserClassOverride {
    #[serde(default)]
    pub weight: Option<NonZeroU32>,
    #[serde(default)]
    pub think_time: Option<ThinkTime>,
}

/// Population-wide settings for one load test run.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationSettings {
    /// `host:port` (or a full URI) of the target endpoint.
    pub host: String,
    pub users: usize,
    pub spawn_rate: f64,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub run_time: Option<Duration>,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub stop_timeout: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub drain_grace: Duration,
    pub classes: BTreeMap<String, UserClassOverride>,
}

impl PopulationSettings {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Default::default()
        }
    }

    pub fn users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    pub fn spawn_rate(mut self, spawn_rate: f64) -> Self {
        self.spawn_rate = spawn_rate;
        self
    }

    pub fn run_time(mut self, run_time: Duration) -> Self {
        self.run_time = Some(run_time);
        self
    }

    pub fn stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn drain_grace(mut self, drain_grace: Duration) -> Self {
        self.drain_grace = drain_grace;
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::MissingHost);
        }

        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.) {
            return Err(SettingsError::InvalidSpawnRate(self.spawn_rate));
        }

        for class in self.classes.values() {
            if let Some(think_time) = &class.think_time {
                think_time.validate()?;
            }
        }

        Ok(())
    }
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            users: DEFAULT_USERS,
            spawn_rate: DEFAULT_SPAWN_RATE,
            run_time: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            classes: BTreeMap::new(),
        }
    }
}
