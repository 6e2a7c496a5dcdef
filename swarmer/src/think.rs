use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;
use swarmer_core::ThinkTime;

/// How long to pause after an action that started `since_start` ago.
pub(crate) fn pause(think: &ThinkTime, rng: &mut SmallRng, since_start: Duration) -> Duration {
    match think {
        ThinkTime::Constant(duration) => *duration,
        ThinkTime::Between { min, max } if min >= max => *min,
        ThinkTime::Between { min, max } => rng.gen_range(*min..=*max),
        ThinkTime::Normal { mean, std_dev } => {
            match Normal::new(mean.as_secs_f64(), std_dev.as_secs_f64()) {
                Ok(normal) => Duration::from_secs_f64(normal.sample(rng).max(0.)),
                Err(_) => *mean,
            }
        }
        ThinkTime::ConstantPacing(interval) => interval.saturating_sub(since_start),
    }
}
