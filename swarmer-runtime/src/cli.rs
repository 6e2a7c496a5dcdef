use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use swarmer::core::PopulationSettings;

/// Command line flags. Anything given here wins over the settings file and
/// `SWARMER_*` environment variables.
#[derive(Parser, Debug, Default)]
#[command(version, about = "Virtual-user load generator for gRPC services")]
pub struct SwarmerCli {
    /// Target endpoint, `host:port` or a full URI.
    #[arg(short = 'H', long, env = "HOST")]
    pub host: Option<String>,

    /// Number of concurrent virtual users.
    #[arg(short, long)]
    pub users: Option<usize>,

    /// Users spawned per second while ramping up.
    #[arg(short = 'r', long)]
    pub spawn_rate: Option<f64>,

    /// Stop after this long, e.g. `90s` or `1h 30m`. Runs until ctrl-c otherwise.
    #[arg(short = 't', long, value_parser = humantime::parse_duration)]
    pub run_time: Option<Duration>,

    /// How long users get to finish once shutdown begins.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub stop_timeout: Option<Duration>,

    /// YAML settings file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// `tracing` filter directives, e.g. `swarmer=debug`.
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Log running statistics this often.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub report_interval: Option<Duration>,
}

impl SwarmerCli {
    pub fn apply(&self, settings: &mut PopulationSettings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(users) = self.users {
            settings.users = users;
        }
        if let Some(spawn_rate) = self.spawn_rate {
            settings.spawn_rate = spawn_rate;
        }
        if let Some(run_time) = self.run_time {
            settings.run_time = Some(run_time);
        }
        if let Some(stop_timeout) = self.stop_timeout {
            settings.stop_timeout = stop_timeout;
        }
    }
}
