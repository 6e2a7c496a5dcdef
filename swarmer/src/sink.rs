//! Process-wide aggregation of RPC events.
use arc_swap::ArcSwap;
use metrics_util::AtomicBucket;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmer_core::{EventError, MethodStats, RpcEvent};
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// Receives every recorded event as the flat field set
/// `(request type, operation name, elapsed ms, response bytes, error)`.
pub trait EventExporter: Send + Sync {
    fn record_event(
        &self,
        request_type: &str,
        name: &str,
        response_time_ms: f64,
        response_length: u64,
        error: Option<&EventError>,
    );
}

/// Append-only store of [`RpcEvent`]s shared by every virtual user.
///
/// Writers never contend on a lock: events land in a lock-free bucket and the
/// totals are plain atomics. Cloning is cheap and yields a handle to the same
/// store.
#[derive(Clone)]
pub struct MetricSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    events: AtomicBucket<RpcEvent>,
    total: AtomicU64,
    errors: AtomicU64,
    epoch: ArcSwap<Instant>,
    exporters: ArcSwap<Vec<Arc<dyn EventExporter>>>,
}

impl MetricSink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SinkInner {
                events: AtomicBucket::new(),
                total: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                epoch: ArcSwap::from_pointee(Instant::now()),
                exporters: ArcSwap::from_pointee(vec![]),
            }),
        }
    }

    pub fn add_exporter(&self, exporter: Arc<dyn EventExporter>) {
        self.inner.exporters.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(exporter.clone());
            next
        });
    }

    pub fn record(&self, event: RpcEvent) {
        let error = event.error();

        for exporter in self.inner.exporters.load().iter() {
            exporter.record_event(
                event.request_type,
                event.method,
                event.elapsed_ms(),
                event.response_size,
                error.as_ref(),
            );
        }

        if let Some(error) = &error {
            self.inner.errors.fetch_add(1, Ordering::Relaxed);
            debug!("{} failed after {:?}: {error}", event.method, event.elapsed);
        } else {
            trace!("{} completed in {:?}", event.method, event.elapsed);
        }
        self.inner.total.fetch_add(1, Ordering::Relaxed);
        self.inner.events.push(event);
    }

    pub fn total(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.inner.errors.load(Ordering::Relaxed)
    }

    /// Snapshot of every event recorded since the last reset, in no particular order
    /// across users.
    pub fn events(&self) -> Vec<RpcEvent> {
        self.inner.events.data()
    }

    /// Time since the sink was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.inner.epoch.load().elapsed()
    }

    pub fn reset(&self) {
        self.inner.events.clear();
        self.inner.total.store(0, Ordering::Relaxed);
        self.inner.errors.store(0, Ordering::Relaxed);
        self.inner.epoch.store(Arc::new(Instant::now()));
    }

    /// Per-method aggregates, ordered by method name.
    pub fn report(&self) -> Vec<MethodStats> {
        let window = self.elapsed().as_secs_f64();
        let mut per_method: BTreeMap<&'static str, MethodAccumulator> = BTreeMap::new();
        for event in self.events() {
            per_method
                .entry(event.method)
                .or_insert_with(MethodAccumulator::new)
                .push(&event);
        }

        per_method
            .into_iter()
            .map(|(method, acc)| acc.finish(method, window))
            .collect()
    }
}

impl Default for MetricSink {
    fn default() -> Self {
        Self::new()
    }
}

struct MethodAccumulator {
    count: u64,
    errors: u64,
    total_latency: Duration,
    min: Duration,
    max: Duration,
    total_size: u64,
    latencies: Vec<Duration>,
}

impl MethodAccumulator {
    fn new() -> Self {
        Self {
            count: 0,
            errors: 0,
            total_latency: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            total_size: 0,
            latencies: vec![],
        }
    }

    fn push(&mut self, event: &RpcEvent) {
        self.count += 1;
        if event.is_error() {
            self.errors += 1;
        }
        self.total_latency += event.elapsed;
        self.min = self.min.min(event.elapsed);
        self.max = self.max.max(event.elapsed);
        self.total_size += event.response_size;
        self.latencies.push(event.elapsed);
    }

    fn finish(mut self, method: &str, window_secs: f64) -> MethodStats {
        self.latencies.sort_unstable();
        let count = self.count.max(1);
        MethodStats {
            method: method.to_string(),
            count: self.count,
            errors: self.errors,
            latency_min: if self.count == 0 { Duration::ZERO } else { self.min },
            latency_avg: Duration::from_nanos((self.total_latency.as_nanos() / count as u128) as u64),
            latency_max: self.max,
            latency_p50: percentile(&self.latencies, 0.5),
            latency_p90: percentile(&self.latencies, 0.9),
            latency_p99: percentile(&self.latencies, 0.99),
            avg_response_size: self.total_size as f64 / count as f64,
            rps: if window_secs > 0. {
                self.count as f64 / window_secs
            } else {
                0.
            },
        }
    }
}

/// Nearest-rank percentile over sorted latencies.
fn percentile(sorted: &[Duration], quantile: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Forwards events to the `metrics` facade.
#[cfg(feature = "metrics")]
pub struct MetricsExporter {
    names: swarmer_core::MetricNames,
}

#[cfg(feature = "metrics")]
impl MetricsExporter {
    pub fn new() -> Self {
        let names = swarmer_core::RPC_METRICS;
        metrics::describe_histogram!(
            names.latency,
            metrics::Unit::Milliseconds,
            "Wall-clock duration of each RPC"
        );
        metrics::describe_histogram!(
            names.response_size,
            metrics::Unit::Bytes,
            "Measured response size of each RPC"
        );
        metrics::describe_counter!(names.success, "Successful RPCs");
        metrics::describe_counter!(names.error, "Failed RPCs");
        Self { names }
    }
}

#[cfg(feature = "metrics")]
impl Default for MetricsExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics")]
impl EventExporter for MetricsExporter {
    fn record_event(
        &self,
        _request_type: &str,
        name: &str,
        response_time_ms: f64,
        response_length: u64,
        error: Option<&EventError>,
    ) {
        use swarmer_core::METHOD_LABEL;

        metrics::histogram!(self.names.latency, METHOD_LABEL => name.to_string())
            .record(response_time_ms);
        metrics::histogram!(self.names.response_size, METHOD_LABEL => name.to_string())
            .record(response_length as f64);
        if error.is_some() {
            metrics::counter!(self.names.error, METHOD_LABEL => name.to_string()).increment(1);
        } else {
            metrics::counter!(self.names.success, METHOD_LABEL => name.to_string()).increment(1);
        }
    }
}
