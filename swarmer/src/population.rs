//! Spawns, replaces and retires virtual users to hold a weighted population.
use crate::connection::Connection;
use crate::error::ConfigError;
use crate::interceptor::Interceptor;
use crate::sink::MetricSink;
use crate::transport::Connector;
use crate::user::{UserClass, UserContext, UserExit, UserId, VirtualUser};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use swarmer_core::{PopulationSettings, RunStatistics};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

const MAX_SPAWN_PERIOD: Duration = Duration::from_secs(3_600);

/// Splits `total` users across classes proportionally to `weights`, handing
/// leftover users to the largest remainders (earlier classes win ties).
pub fn target_counts(weights: &[u32], total: usize) -> Vec<usize> {
    let sum: u64 = weights.iter().map(|w| *w as u64).sum();
    if sum == 0 {
        return vec![0; weights.len()];
    }

    let total = total as u64;
    let mut counts: Vec<usize> = weights
        .iter()
        .map(|w| (total * *w as u64 / sum) as usize)
        .collect();

    let assigned: usize = counts.iter().sum();
    let mut remainders: Vec<(u64, usize)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| (total * *w as u64 % sum, i))
        .collect();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, i) in remainders.into_iter().take(total as usize - assigned) {
        counts[i] += 1;
    }
    counts
}

/// The class the next spawned user should belong to: the one furthest behind
/// its share of a population one larger than the current one.
pub(crate) fn next_class(targets: &[usize], running: &[usize], disabled: &[bool]) -> Option<usize> {
    let total: usize = targets.iter().sum();
    let n: usize = running.iter().sum();

    let mut best: Option<(usize, i128)> = None;
    for (i, (&target, &count)) in targets.iter().zip(running).enumerate() {
        if disabled[i] || count >= target {
            continue;
        }
        let score = target as i128 * (n as i128 + 1) - count as i128 * total as i128;
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

fn spawn_limiter(spawn_rate: f64) -> DefaultDirectRateLimiter {
    let period = Duration::try_from_secs_f64(1. / spawn_rate)
        .unwrap_or(MAX_SPAWN_PERIOD)
        .min(MAX_SPAWN_PERIOD);
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
    RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))
}

/// Point-in-time view of a running population.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Census {
    pub running: usize,
    pub per_class: BTreeMap<String, usize>,
    pub spawned: usize,
    pub clean_stops: usize,
    pub forced_stops: usize,
    pub config_failures: usize,
    pub panicked: usize,
    pub stopping: bool,
}

pub struct Population {
    settings: PopulationSettings,
    classes: Vec<Arc<UserClass>>,
    connector: Arc<dyn Connector>,
    sink: MetricSink,
}

impl Population {
    /// Applies per-class overrides from `settings` and validates everything up
    /// front. User classes are fixed from here on.
    pub fn new(
        settings: PopulationSettings,
        classes: Vec<UserClass>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        if classes.is_empty() {
            return Err(ConfigError::NoUserClasses);
        }

        for name in settings.classes.keys() {
            if !classes.iter().any(|class| class.name() == name) {
                warn!("Configuration overrides unknown user class {name:?}");
            }
        }

        let classes = classes
            .into_iter()
            .map(|mut class| {
                if let Some(overrides) = settings.classes.get(class.name()) {
                    class.apply_override(overrides);
                }
                class.validate()?;
                Ok(Arc::new(class))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            settings,
            classes,
            connector,
            sink: MetricSink::new(),
        })
    }

    pub fn with_sink(mut self, sink: MetricSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn sink(&self) -> &MetricSink {
        &self.sink
    }

    pub fn settings(&self) -> &PopulationSettings {
        &self.settings
    }

    pub fn classes(&self) -> impl Iterator<Item = &UserClass> {
        self.classes.iter().map(|class| class.as_ref())
    }

    pub fn target_counts(&self) -> Vec<usize> {
        let weights: Vec<u32> = self.classes.iter().map(|c| c.get_weight()).collect();
        target_counts(&weights, self.settings.users)
    }

    /// Starts ramping up in the background.
    pub fn start(self) -> PopulationHandle {
        let (stop, stop_rx) = watch::channel(false);
        let (census_tx, census) = watch::channel(Census::default());
        let (user_stop, _) = watch::channel(false);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let sink = self.sink.clone();

        let classes = self.classes.len();
        let controller = Controller {
            targets: self.target_counts(),
            running: vec![0; classes],
            disabled: vec![false; classes],
            interceptor: Interceptor::new(self.sink),
            settings: self.settings,
            classes: self.classes,
            connector: self.connector,
            members: HashMap::new(),
            next_id: 0,
            user_stop,
            exit_tx,
            exit_rx,
            census: census_tx,
            peak: 0,
            spawned: 0,
            clean_stops: 0,
            forced_stops: 0,
            config_failures: 0,
            panicked: 0,
            stopping: false,
        };
        let task = tokio::spawn(controller.run(stop_rx).in_current_span());

        PopulationHandle {
            stop,
            census,
            sink,
            task,
        }
    }

    /// Runs until `run_time` elapses (or forever without one) and returns the
    /// final statistics.
    pub async fn run(self) -> RunStatistics {
        self.start().join().await
    }
}

pub struct PopulationHandle {
    stop: watch::Sender<bool>,
    census: watch::Receiver<Census>,
    sink: MetricSink,
    task: JoinHandle<RunStatistics>,
}

impl PopulationHandle {
    /// Begins coordinated shutdown. Dropping the handle does the same.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn census(&self) -> Census {
        self.census.borrow().clone()
    }

    pub fn running(&self) -> usize {
        self.census.borrow().running
    }

    pub fn sink(&self) -> &MetricSink {
        &self.sink
    }

    /// Waits until at least `users` users are running. Returns `false` if the
    /// population finished first.
    pub async fn wait_for_running(&self, users: usize) -> bool {
        let mut census = self.census.clone();
        let reached = census.wait_for(|census| census.running >= users).await.is_ok();
        reached
    }

    /// Census updates as they are published.
    pub fn subscribe(&self) -> watch::Receiver<Census> {
        self.census.clone()
    }

    /// Waits for the controller to finish without stopping it.
    pub async fn join(mut self) -> RunStatistics {
        let res = (&mut self.task).await;
        self.finish(res)
    }

    /// Waits for the controller to finish, stopping it early if `signal`
    /// completes first.
    pub async fn stop_on<F: Future>(mut self, signal: F) -> RunStatistics {
        tokio::select! {
            res = &mut self.task => self.finish(res),
            _ = signal => {
                info!("Stop requested");
                self.stop();
                self.join().await
            }
        }
    }

    fn finish(&self, res: Result<RunStatistics, JoinError>) -> RunStatistics {
        match res {
            Ok(stats) => stats,
            Err(err) => {
                error!("Population controller failed: {err}");
                let census = self.census.borrow().clone();
                RunStatistics {
                    spawned: census.spawned,
                    clean_stops: census.clean_stops,
                    forced_stops: census.forced_stops,
                    config_failures: census.config_failures,
                    panicked: census.panicked,
                    total_requests: self.sink.total(),
                    total_errors: self.sink.errors(),
                    methods: self.sink.report(),
                    ..Default::default()
                }
            }
        }
    }

    pub async fn shutdown(self) -> RunStatistics {
        self.stop();
        self.join().await
    }
}

struct Member {
    class: usize,
    connection: Arc<Connection>,
    task: JoinHandle<()>,
}

struct Controller {
    settings: PopulationSettings,
    classes: Vec<Arc<UserClass>>,
    connector: Arc<dyn Connector>,
    interceptor: Interceptor,
    targets: Vec<usize>,
    running: Vec<usize>,
    disabled: Vec<bool>,
    members: HashMap<UserId, Member>,
    next_id: u64,
    user_stop: watch::Sender<bool>,
    exit_tx: mpsc::UnboundedSender<(UserId, UserExit)>,
    exit_rx: mpsc::UnboundedReceiver<(UserId, UserExit)>,
    census: watch::Sender<Census>,
    peak: usize,
    spawned: usize,
    clean_stops: usize,
    forced_stops: usize,
    config_failures: usize,
    panicked: usize,
    stopping: bool,
}

impl Controller {
    #[instrument(name = "population", skip_all, fields(users = self.settings.users))]
    async fn run(mut self, mut stop: watch::Receiver<bool>) -> RunStatistics {
        let started = Instant::now();
        let limiter = spawn_limiter(self.settings.spawn_rate);
        let deadline = self.settings.run_time.map(|run_time| started + run_time);
        info!(
            "Ramping up to {} users at {}/s: {}",
            self.settings.users,
            self.settings.spawn_rate,
            self.describe_targets()
        );

        loop {
            if *stop.borrow() {
                break;
            }
            let next = next_class(&self.targets, &self.running, &self.disabled);

            tokio::select! {
                biased;
                res = stop.changed() => {
                    if res.is_err() {
                        debug!("Population handle dropped");
                        break;
                    }
                }
                _ = deadline_reached(deadline) => {
                    info!("Run time elapsed");
                    break;
                }
                Some((id, exit)) = self.exit_rx.recv() => self.retire(id, exit),
                _ = limiter.until_ready(), if next.is_some() => {
                    if let Some(class) = next {
                        self.spawn(class);
                    }
                }
            }
        }

        self.shutdown().await;
        self.statistics(started.elapsed())
    }

    fn describe_targets(&self) -> String {
        self.classes
            .iter()
            .zip(&self.targets)
            .map(|(class, target)| format!("{}={target}", class.name()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn spawn(&mut self, class: usize) {
        let user_class = self.classes[class].clone();
        let opened = Connection::open(
            self.connector.as_ref(),
            &self.settings.host,
            self.interceptor.clone(),
            user_class.name(),
            user_class.capabilities(),
        );
        let (connection, clients) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                error!("Cannot construct {} users: {err}", user_class.name());
                self.disabled[class] = true;
                self.config_failures += 1;
                self.publish();
                return;
            }
        };

        let id = UserId(self.next_id);
        self.next_id += 1;

        let ctx = UserContext::new(
            id,
            user_class,
            connection.clone(),
            clients,
            self.user_stop.subscribe(),
        );
        let user = VirtualUser::new(ctx, self.settings.drain_grace);
        let task = tokio::spawn(user.run(self.exit_tx.clone()).in_current_span());

        self.members.insert(
            id,
            Member {
                class,
                connection,
                task,
            },
        );
        self.running[class] += 1;
        self.spawned += 1;
        self.peak = self.peak.max(self.members.len());
        debug!("Spawned {id}, {} running", self.members.len());
        self.publish();
    }

    fn retire(&mut self, id: UserId, exit: UserExit) {
        let Some(member) = self.members.remove(&id) else {
            return;
        };
        self.running[member.class] -= 1;
        let class = self.classes[member.class].name();
        match exit {
            UserExit::Finished => self.clean_stops += 1,
            UserExit::Misconfigured(err) => {
                if !self.disabled[member.class] {
                    error!("Cannot run {class} users: {err}");
                    self.disabled[member.class] = true;
                    self.config_failures += 1;
                }
            }
            UserExit::Panicked => {
                warn!("{id} ({class}) panicked");
                self.panicked += 1;
            }
            UserExit::Aborted => self.forced_stops += 1,
        }
        if !self.stopping {
            debug!(
                "{id} ({}) exited, {} running",
                self.classes[member.class].name(),
                self.members.len()
            );
        }
        self.publish();
    }

    async fn shutdown(&mut self) {
        self.stopping = true;
        info!("Stopping {} users", self.members.len());

        for member in self.members.values() {
            member.connection.close();
        }
        self.user_stop.send_replace(true);
        self.publish();

        let deadline = Instant::now() + self.settings.stop_timeout;
        while !self.members.is_empty() {
            match tokio::time::timeout_at(deadline, self.exit_rx.recv()).await {
                Ok(Some((id, exit))) => self.retire(id, exit),
                Ok(None) | Err(_) => break,
            }
        }

        let stuck: Vec<_> = self.members.drain().collect();
        for (id, member) in &stuck {
            warn!(
                "{id} did not stop within {}, forcing it",
                humantime::format_duration(self.settings.stop_timeout)
            );
            member.task.abort();
            member.connection.release();
        }
        // Dropping an aborted task records its in-flight call as cancelled.
        for (_, member) in stuck {
            let _ = member.task.await;
            self.running[member.class] -= 1;
            self.forced_stops += 1;
        }
        self.publish();
        info!(
            "Stopped: {} clean, {} forced",
            self.clean_stops, self.forced_stops
        );
    }

    fn publish(&self) {
        let per_class = self
            .classes
            .iter()
            .zip(&self.running)
            .map(|(class, running)| (class.name().to_string(), *running))
            .collect();
        self.census.send_replace(Census {
            running: self.members.len(),
            per_class,
            spawned: self.spawned,
            clean_stops: self.clean_stops,
            forced_stops: self.forced_stops,
            config_failures: self.config_failures,
            panicked: self.panicked,
            stopping: self.stopping,
        });
    }

    fn statistics(&self, elapsed: Duration) -> RunStatistics {
        let sink = self.interceptor.sink();
        RunStatistics {
            target_users: self.settings.users,
            peak_users: self.peak,
            spawned: self.spawned,
            clean_stops: self.clean_stops,
            forced_stops: self.forced_stops,
            config_failures: self.config_failures,
            panicked: self.panicked,
            elapsed,
            total_requests: sink.total(),
            total_errors: sink.errors(),
            methods: sink.report(),
        }
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
