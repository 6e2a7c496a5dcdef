//! Default swarmer runtime
//!
//! Merges settings from a YAML file, `SWARMER_*` environment variables and the
//! command line, installs logging and metrics export, then runs the population
//! until its run time elapses or ctrl-c is pressed.
use crate::cli::SwarmerCli;
use crate::error::RuntimeError;
use crate::loader::ConfigLoader;
use crate::reporter::report_task;
use crate::telemetry;
use clap::Parser;
use std::sync::Arc;
use swarmer::core::{PopulationSettings, RunStatistics};
use swarmer::{Connector, GrpcConnector, Population, UserClass};
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};

/// Every user stopped on its own and the target population was reached.
pub const EXIT_CLEAN: u8 = 0;
/// The population never reached its target size.
pub const EXIT_TARGET_MISSED: u8 = 1;
/// At least one user ignored the stop request and had to be aborted.
pub const EXIT_FORCED_STOP: u8 = 2;

/// Process exit status for a finished run. Forced stops take precedence.
pub fn exit_status(stats: &RunStatistics) -> u8 {
    if stats.forced_stops > 0 {
        EXIT_FORCED_STOP
    } else if !stats.target_reached() {
        EXIT_TARGET_MISSED
    } else {
        EXIT_CLEAN
    }
}

/// Default swarmer runtime.
///
/// # Example
///
/// ```ignore
/// use swarmer_runtime::SwarmerRuntime;
///
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     let stats = SwarmerRuntime::new()
///         .with_args()
///         .user_class(fetch_vacancies())
///         .run()
///         .await
///         .expect("load test failed to start");
///     swarmer_runtime::exit_status(&stats).into()
/// }
/// ```
pub struct SwarmerRuntime {
    cli: SwarmerCli,
    settings: Option<PopulationSettings>,
    loader: ConfigLoader,
    classes: Vec<UserClass>,
    connector: Option<Arc<dyn Connector>>,
    logging: bool,
}

impl Default for SwarmerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SwarmerRuntime {
    pub fn new() -> Self {
        SwarmerRuntime {
            cli: SwarmerCli::default(),
            settings: None,
            loader: ConfigLoader::new(),
            classes: vec![],
            connector: None,
            logging: true,
        }
    }

    /// Use the default command line arguments.
    ///
    /// `-H`, `--host` target endpoint (also read from `HOST`)
    ///
    /// `-u`, `--users` and `-r`, `--spawn-rate` population size and ramp-up rate
    ///
    /// `-t`, `--run-time` and `--stop-timeout` run length and shutdown bound
    ///
    /// `-c`, `--config` YAML settings file
    ///
    /// # Example
    /// ```ignore
    /// $ ./vacancy-load -H localhost:50051 -u 40 -r 2 -t 10m
    /// $ ./vacancy-load -c load.yaml --metrics-addr 0.0.0.0:9000
    /// ```
    pub fn with_args(self) -> Self {
        self.cli(SwarmerCli::parse())
    }

    pub fn cli(mut self, cli: SwarmerCli) -> Self {
        self.cli = cli;
        self
    }

    /// Base settings used when no settings file is given.
    pub fn settings(mut self, settings: PopulationSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn user_class(mut self, class: UserClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Defaults to a [`GrpcConnector`].
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Leaves the global `tracing` subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Final settings: file (or base settings), then environment, then flags.
    pub fn resolve_settings(&self) -> Result<PopulationSettings, RuntimeError> {
        let mut settings = match &self.cli.config {
            Some(path) => self.loader.from_file(path)?,
            None => {
                let mut settings = self.settings.clone().unwrap_or_default();
                self.loader.apply_env_overrides(&mut settings)?;
                settings
            }
        };
        self.cli.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    #[instrument(name = "swarmer", skip_all)]
    pub async fn run(self) -> Result<RunStatistics, RuntimeError> {
        if self.logging {
            telemetry::init_logging(self.cli.log_filter.as_deref())?;
        }

        let settings = self.resolve_settings()?;
        info!("Target {} with {} users", settings.host, settings.users);

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(GrpcConnector::new()),
        };
        let population = Population::new(settings, self.classes, connector)?;

        export_metrics(&self.cli, &population)?;

        let handle = population.start();
        let reporter = self.cli.report_interval.map(|every| {
            tokio::spawn(
                report_task(handle.subscribe(), handle.sink().clone(), every).in_current_span(),
            )
        });

        let stats = handle.stop_on(ctrl_c()).await;
        if let Some(reporter) = reporter {
            reporter.abort();
        }

        info!("{stats}");
        Ok(stats)
    }
}

#[cfg(feature = "metrics")]
fn export_metrics(cli: &SwarmerCli, population: &Population) -> Result<(), RuntimeError> {
    if let Some(addr) = cli.metrics_addr {
        telemetry::install_prometheus(addr)?;
        info!("Serving metrics on {addr}");
    }
    population
        .sink()
        .add_exporter(Arc::new(swarmer::MetricsExporter::new()));
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn export_metrics(cli: &SwarmerCli, _population: &Population) -> Result<(), RuntimeError> {
    if cli.metrics_addr.is_some() {
        warn!("Built without the metrics feature, ignoring --metrics-addr");
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
