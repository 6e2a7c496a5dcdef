use std::time::Duration;
use swarmer::{Census, MetricSink};
use tokio::sync::watch;
use tokio::time::{interval, Instant, Interval};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

pub(crate) struct Timer {
    interval: Interval,
    last_tick: Instant,
    interval_dur: Duration,
}

impl Timer {
    pub async fn new(interval_dur: Duration) -> Self {
        let mut interval = interval(interval_dur);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // NOTE: First tick completes instantly
        let last_tick = interval.tick().await;
        Self {
            interval,
            last_tick,
            interval_dur,
        }
    }

    /// Waits for the next tick and returns the time since the previous one.
    pub async fn tick(&mut self) -> Duration {
        let next = self.interval.tick().await;
        let elapsed = self.last_tick.elapsed();
        self.last_tick = next;
        elapsed
    }
}

impl std::fmt::Display for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", humantime::format_duration(self.interval_dur))
    }
}

/// Logs a one-line summary of the run every `every` until aborted.
pub(crate) async fn report_task(census: watch::Receiver<Census>, sink: MetricSink, every: Duration) {
    let mut timer = Timer::new(every).await;
    debug!("Reporting every {timer}");

    let mut last_total = sink.total();
    loop {
        let elapsed = timer.tick().await;
        let total = sink.total();
        let rate = total.saturating_sub(last_total) as f64 / elapsed.as_secs_f64().max(1e-3);
        last_total = total;

        let census = census.borrow().clone();
        info!(
            "{} users running, {total} requests, {} errors, {rate:.1} req/s",
            census.running,
            sink.errors()
        );
    }
}
