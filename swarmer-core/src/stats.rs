use std::fmt;
use std::time::Duration;

/// Aggregated view of every event recorded for one RPC method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodStats {
    pub method: String,
    pub count: u64,
    pub errors: u64,
    pub latency_min: Duration,
    pub latency_avg: Duration,
    pub latency_max: Duration,
    pub latency_p50: Duration,
    pub latency_p90: Duration,
    pub latency_p99: Duration,
    pub avg_response_size: f64,
    pub rps: f64,
}

impl MethodStats {
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.errors as f64 / self.count as f64
        }
    }
}

/// Summary of a finished population run.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    pub target_users: usize,
    pub peak_users: usize,
    pub spawned: usize,
    pub clean_stops: usize,
    pub forced_stops: usize,
    /// User classes disabled by a configuration error, either while
    /// constructing a user or from inside an action.
    pub config_failures: usize,
    /// User tasks that panicked. They are replaced, not counted as stops.
    pub panicked: usize,
    pub elapsed: Duration,
    pub total_requests: u64,
    pub total_errors: u64,
    pub methods: Vec<MethodStats>,
}

impl RunStatistics {
    /// A disabled class means the population could not hold its target.
    pub fn target_reached(&self) -> bool {
        self.config_failures == 0 && self.peak_users >= self.target_users
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.
        } else {
            self.total_errors as f64 / self.total_requests as f64
        }
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<48} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>10} {:>8}",
            "Name", "# reqs", "# fails", "Avg", "Min", "Max", "p50", "p90", "p99", "Avg size", "req/s"
        )?;
        for m in &self.methods {
            writeln!(
                f,
                "{:<48} {:>8} {:>8} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>10.1} {:>8.2}",
                m.method,
                m.count,
                m.errors,
                ms(m.latency_avg),
                ms(m.latency_min),
                ms(m.latency_max),
                ms(m.latency_p50),
                ms(m.latency_p90),
                ms(m.latency_p99),
                m.avg_response_size,
                m.rps,
            )?;
        }
        writeln!(
            f,
            "{:<48} {:>8} {:>8}  (error rate {:.2}%)",
            "Aggregated",
            self.total_requests,
            self.total_errors,
            self.error_rate() * 100.
        )?;
        write!(
            f,
            "users: target={}, peak={}, spawned={}, clean stops={}, forced stops={}, config failures={}, panicked={}, elapsed={}",
            self.target_users,
            self.peak_users,
            self.spawned,
            self.clean_stops,
            self.forced_stops,
            self.config_failures,
            self.panicked,
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64)),
        )
    }
}
