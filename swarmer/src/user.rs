//! Virtual users: user classes, per-user context and the task executor.
use crate::connection::{Capability, CapabilitySet, Clients, Connection};
use crate::error::{ActionError, ConfigError};
use crate::task::{Action, FailurePolicy, Flow, Step, TaskSet};
use crate::think;
use futures_util::future::BoxFuture;
use http::Extensions;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmer_core::{ThinkTime, UserClassOverride};
use tokio::sync::{mpsc, watch};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// A kind of simulated user: its share of the population, its pacing and
/// what it does.
///
/// Immutable once handed to a population.
#[derive(Clone)]
pub struct UserClass {
    name: String,
    weight: u32,
    think_time: ThinkTime,
    tasks: Arc<TaskSet>,
    capabilities: CapabilitySet,
    shared: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl UserClass {
    pub fn new(name: &str, tasks: TaskSet) -> Self {
        Self {
            name: name.to_string(),
            weight: 1,
            think_time: ThinkTime::NONE,
            tasks: Arc::new(tasks),
            capabilities: CapabilitySet::new(),
            shared: HashMap::new(),
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    /// Binds capability `C` on every user's connection and makes it required.
    pub fn capability<C: Capability>(mut self) -> Self {
        self.capabilities = self.capabilities.with::<C>();
        self
    }

    /// Declares a capability the class cannot run without.
    pub fn requires(mut self, name: &'static str) -> Self {
        self.capabilities = self.capabilities.require(name);
        self
    }

    /// State shared by every user of this class, e.g. a credential pool.
    pub fn shared<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.shared.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    pub fn apply_override(&mut self, overrides: &UserClassOverride) {
        if let Some(weight) = overrides.weight {
            self.weight = weight.get();
        }
        if let Some(think_time) = &overrides.think_time {
            self.think_time = think_time.clone();
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_weight(&self) -> u32 {
        self.weight
    }

    pub fn get_think_time(&self) -> &ThinkTime {
        &self.think_time
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        NonZeroU32::new(self.weight).ok_or_else(|| ConfigError::ZeroWeight(self.name.clone()))?;
        self.think_time.validate()?;
        self.tasks.validate()
    }
}

impl fmt::Debug for UserClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClass")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("think_time", &self.think_time)
            .field("tasks", &self.tasks.name())
            .field("capabilities", &self.capabilities.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Everything an action can reach.
pub struct UserContext {
    id: UserId,
    class: Arc<UserClass>,
    connection: Arc<Connection>,
    clients: Clients,
    session: Extensions,
    rng: SmallRng,
    stop: watch::Receiver<bool>,
    stop_requested: bool,
}

impl UserContext {
    pub(crate) fn new(
        id: UserId,
        class: Arc<UserClass>,
        connection: Arc<Connection>,
        clients: Clients,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            class,
            connection,
            clients,
            session: Extensions::new(),
            rng: SmallRng::from_entropy(),
            stop,
            stop_requested: false,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn client<C: Capability>(&self) -> Result<&C, ActionError> {
        Ok(self.clients.get::<C>()?)
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Set once the user has been told to stop. Periodic actions check this
    /// and skip their calls instead of failing them.
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Per-user state, dropped with the user.
    pub fn session(&self) -> &Extensions {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Extensions {
        &mut self.session
    }

    pub fn shared<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.class
            .shared
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_requested || *self.stop.borrow() || self.connection.is_closed()
    }

    /// Sleeps for `duration` unless told to stop first. Returns `false` if the
    /// user should stop.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopping() {
            return false;
        }
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return !self.is_stopping();
        }

        let stop = &mut self.stop;
        let stopped = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = async { let _ = stop.wait_for(|stop| *stop).await; } => true,
        };
        !stopped && !self.is_stopping()
    }

    async fn think(&mut self, think_time: &ThinkTime, action_started: Instant) -> bool {
        let pause = think::pause(think_time, &mut self.rng, action_started.elapsed());
        self.sleep(pause).await
    }
}

/// How a task set was left.
enum Exit {
    Interrupted,
    Stopped,
    Misconfigured(ConfigError),
}

/// Why a user task ended, as reported to its population.
#[derive(Debug, Clone, PartialEq)]
pub enum UserExit {
    /// Stopped on request, on its own, or after leaving its task set.
    Finished,
    /// An action hit a configuration error; every user of the class will.
    Misconfigured(ConfigError),
    Panicked,
    Aborted,
}

/// One simulated user, bound to its own connection.
pub struct VirtualUser {
    ctx: UserContext,
    drain_grace: Duration,
    state: watch::Sender<UserState>,
}

impl VirtualUser {
    pub(crate) fn new(ctx: UserContext, drain_grace: Duration) -> Self {
        let (state, _) = watch::channel(UserState::NotStarted);
        Self {
            ctx,
            drain_grace,
            state,
        }
    }

    pub fn id(&self) -> UserId {
        self.ctx.id
    }

    pub fn state(&self) -> watch::Receiver<UserState> {
        self.state.subscribe()
    }

    /// Runs the user to completion. The exit channel receives this user's id
    /// and exit reason once it has fully stopped, including when the task is
    /// aborted or panics.
    #[instrument(name = "user", skip_all, fields(id = %self.ctx.id, class = self.ctx.class.name()))]
    pub(crate) async fn run(self, exits: mpsc::UnboundedSender<(UserId, UserExit)>) {
        let VirtualUser {
            mut ctx,
            drain_grace,
            state,
        } = self;
        let mut exit = ExitGuard {
            id: ctx.id,
            reason: None,
            connection: ctx.connection.clone(),
            state,
            exits,
        };

        exit.state.send_replace(UserState::Running);
        debug!("Started");

        let class = ctx.class.clone();
        let reason = match run_set(&mut ctx, &class.tasks, &class.think_time, true).await {
            Exit::Misconfigured(err) => UserExit::Misconfigured(err),
            Exit::Interrupted | Exit::Stopped => UserExit::Finished,
        };

        exit.state.send_replace(UserState::Stopping);
        ctx.connection.shutdown(drain_grace).await;
        exit.reason = Some(reason);
        debug!("Stopped");
    }
}

struct ExitGuard {
    id: UserId,
    reason: Option<UserExit>,
    connection: Arc<Connection>,
    state: watch::Sender<UserState>,
    exits: mpsc::UnboundedSender<(UserId, UserExit)>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let reason = self.reason.take().unwrap_or_else(|| {
            if std::thread::panicking() {
                UserExit::Panicked
            } else {
                UserExit::Aborted
            }
        });
        self.connection.release();
        self.state.send_replace(UserState::Stopped);
        let _ = self.exits.send((self.id, reason));
    }
}

enum StepOutcome {
    Next,
    Abort,
    Leave(Exit),
}

fn run_set<'a>(
    ctx: &'a mut UserContext,
    set: &'a TaskSet,
    inherited: &'a ThinkTime,
    root: bool,
) -> BoxFuture<'a, Exit> {
    Box::pin(async move {
        let think_time = set.own_think_time().unwrap_or(inherited);
        trace!("Entering {}", set.name());

        let exit = 'run: {
            if let Some(on_start) = set.start_action() {
                if let StepOutcome::Leave(exit) = run_action(ctx, set, on_start, root).await {
                    break 'run exit;
                }
            }

            loop {
                let steps = set.iteration(&mut ctx.rng);
                for step in steps {
                    if ctx.is_stopping() {
                        break 'run Exit::Stopped;
                    }

                    let started = Instant::now();
                    let outcome = match step {
                        Step::Action(action) => run_action(ctx, set, *action, root).await,
                        Step::Nested(child) => match run_set(ctx, child, think_time, false).await {
                            Exit::Interrupted => StepOutcome::Next,
                            exit => StepOutcome::Leave(exit),
                        },
                    };

                    let abort = match outcome {
                        StepOutcome::Next => false,
                        StepOutcome::Abort => true,
                        StepOutcome::Leave(exit) => break 'run exit,
                    };

                    if !ctx.think(think_time, started).await {
                        break 'run Exit::Stopped;
                    }
                    if abort {
                        break;
                    }
                }
            }
        };

        if let Some(on_stop) = set.stop_action() {
            if let Err(err) = on_stop.call(ctx).await {
                warn!("{} on_stop {} failed: {err}", set.name(), on_stop.name());
            }
        }
        trace!("Leaving {}", set.name());
        exit
    })
}

async fn run_action(ctx: &mut UserContext, set: &TaskSet, action: Action, root: bool) -> StepOutcome {
    match action.call(ctx).await {
        Ok(Flow::Continue) => StepOutcome::Next,
        Ok(Flow::Interrupt) if root => {
            debug!("{} interrupted the root task set; continuing", action.name());
            StepOutcome::Next
        }
        Ok(Flow::Interrupt) => StepOutcome::Leave(Exit::Interrupted),
        Ok(Flow::StopUser) => {
            info!("{} stopped the user", action.name());
            ctx.stop_requested = true;
            StepOutcome::Leave(Exit::Stopped)
        }
        Err(ActionError::Config(err)) => {
            debug!("{} hit a configuration error, stopping user: {err}", action.name());
            ctx.stop_requested = true;
            StepOutcome::Leave(Exit::Misconfigured(err))
        }
        Err(err) => {
            warn!("{} failed: {err}", action.name());
            match set.policy() {
                FailurePolicy::Continue => StepOutcome::Next,
                FailurePolicy::AbortIteration => StepOutcome::Abort,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Interceptor;
    use crate::sink::MetricSink;
    use crate::task::ActionResult;
    use crate::testing::{TestConnector, ECHO, FAIL};
    use bytes::Bytes;
    use futures_util::FutureExt;
    use std::sync::atomic::Ordering;

    #[derive(Clone, Default)]
    struct Trace(Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl Trace {
        fn push(ctx: &UserContext, name: &'static str) {
            if let Some(trace) = ctx.shared::<Trace>() {
                trace.0.lock().unwrap().push(name);
            }
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    fn echo(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
        async move {
            Trace::push(ctx, "echo");
            ctx.connection().unary_raw(ECHO, Bytes::new()).await?;
            Ok(Flow::Continue)
        }
        .boxed()
    }

    fn fail(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
        async move {
            Trace::push(ctx, "fail");
            ctx.connection().unary_raw(FAIL, Bytes::new()).await?;
            Ok(Flow::Continue)
        }
        .boxed()
    }

    fn login(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
        async move {
            Trace::push(ctx, "login");
            Ok(Flow::Continue)
        }
        .boxed()
    }

    fn interrupt(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
        async move {
            Trace::push(ctx, "interrupt");
            Ok(Flow::Interrupt)
        }
        .boxed()
    }

    fn stop(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
        async move {
            Trace::push(ctx, "stop");
            Ok(Flow::StopUser)
        }
        .boxed()
    }

    fn missing_client(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
        async move {
            Trace::push(ctx, "missing");
            struct Nope;
            impl Capability for Nope {
                const NAME: &'static str = "nope";
                fn bind(_: Arc<Connection>) -> Self {
                    Nope
                }
            }
            ctx.client::<Nope>()?;
            Ok(Flow::Continue)
        }
        .boxed()
    }

    const ECHO_ACTION: Action = Action::new("echo", echo);
    const FAIL_ACTION: Action = Action::new("fail", fail);
    const LOGIN: Action = Action::new("login", login);
    const INTERRUPT: Action = Action::new("interrupt", interrupt);
    const STOP: Action = Action::new("stop", stop);
    const MISSING: Action = Action::new("missing", missing_client);

    struct Harness {
        sink: MetricSink,
        connector: TestConnector,
        stop: watch::Sender<bool>,
        exits: mpsc::UnboundedReceiver<(UserId, UserExit)>,
        exit_tx: mpsc::UnboundedSender<(UserId, UserExit)>,
    }

    impl Harness {
        fn new() -> Self {
            let (stop, _) = watch::channel(false);
            let (exit_tx, exits) = mpsc::unbounded_channel();
            Self {
                sink: MetricSink::new(),
                connector: TestConnector::default(),
                stop,
                exits,
                exit_tx,
            }
        }

        fn user(&self, class: UserClass) -> VirtualUser {
            let class = Arc::new(class);
            let (connection, clients) = Connection::open(
                &self.connector,
                "localhost:1",
                Interceptor::new(self.sink.clone()),
                class.name(),
                class.capabilities(),
            )
            .unwrap();
            let ctx = UserContext::new(UserId(1), class, connection, clients, self.stop.subscribe());
            VirtualUser::new(ctx, Duration::from_millis(100))
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn sequential_actions_run_in_order_then_stop() {
        let trace = Trace::default();
        let mut harness = Harness::new();
        let class = UserClass::new(
            "Seq",
            TaskSet::sequential("seq")
                .on_start(LOGIN)
                .step(ECHO_ACTION)
                .step(ECHO_ACTION)
                .step(STOP),
        )
        .shared(trace.clone());

        let user = harness.user(class);
        let mut state = user.state();
        user.run(harness.exit_tx.clone()).await;

        assert_eq!(trace.take(), ["login", "echo", "echo", "stop"]);
        assert_eq!(*state.borrow_and_update(), UserState::Stopped);
        assert_eq!(
            harness.exits.recv().await,
            Some((UserId(1), UserExit::Finished))
        );

        let events = harness.sink.events();
        assert_eq!(events.len(), 2);
        let (first, second) = if events[0].started_at <= events[1].started_at {
            (&events[0], &events[1])
        } else {
            (&events[1], &events[0])
        };
        assert!(first.finished_at() <= second.started_at);
        assert_eq!(harness.connector.counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn nested_set_runs_until_interrupted() {
        let trace = Trace::default();
        let harness = Harness::new();
        let inner = TaskSet::sequential("inner")
            .on_stop(LOGIN)
            .step(ECHO_ACTION)
            .step(INTERRUPT);
        let class = UserClass::new(
            "Nested",
            TaskSet::sequential("outer").step(inner).step(STOP),
        )
        .shared(trace.clone());

        harness.user(class).run(harness.exit_tx.clone()).await;
        assert_eq!(trace.take(), ["echo", "interrupt", "login", "stop"]);
    }

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn root_interrupt_is_ignored() {
        let trace = Trace::default();
        let harness = Harness::new();
        let class = UserClass::new(
            "Root",
            TaskSet::sequential("root").step(INTERRUPT).step(STOP),
        )
        .shared(trace.clone());

        harness.user(class).run(harness.exit_tx.clone()).await;
        assert_eq!(trace.take(), ["interrupt", "stop"]);
    }

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn failure_policies() {
        let trace = Trace::default();
        let harness = Harness::new();
        let class = UserClass::new(
            "Continue",
            TaskSet::sequential("root").step(FAIL_ACTION).step(STOP),
        )
        .shared(trace.clone());
        harness.user(class).run(harness.exit_tx.clone()).await;
        assert_eq!(trace.take(), ["fail", "stop"]);
        assert_eq!(harness.sink.errors(), 1);

        // Every iteration aborts before `echo`, and nothing interrupts, so only
        // `fail` runs until the user is stopped.
        let aborting = TaskSet::sequential("abort")
            .failure_policy(FailurePolicy::AbortIteration)
            .step(FAIL_ACTION)
            .step(ECHO_ACTION);
        let class = UserClass::new(
            "Abort",
            TaskSet::random("root").step(TaskSet::sequential("once").step(aborting)),
        )
        .shared(trace.clone());
        let run = tokio::spawn(harness.user(class).run(harness.exit_tx.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.stop.send_replace(true);
        run.await.unwrap();

        let seen = trace.take();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|name| *name == "fail"), "{seen:?}");
    }

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn configuration_errors_stop_the_user() {
        let trace = Trace::default();
        let mut harness = Harness::new();
        let nested = TaskSet::sequential("nested").step(MISSING).step(ECHO_ACTION);
        let class = UserClass::new("Cfg", TaskSet::random("root").step(nested)).shared(trace.clone());

        harness.user(class).run(harness.exit_tx.clone()).await;
        assert_eq!(trace.take(), ["missing"]);
        assert_eq!(
            harness.exits.recv().await,
            Some((
                UserId(1),
                UserExit::Misconfigured(ConfigError::UnknownCapability("nope"))
            ))
        );
        assert_eq!(harness.sink.total(), 0);
    }

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn panics_are_reported() {
        fn boom(ctx: &mut UserContext) -> BoxFuture<'_, ActionResult> {
            async move {
                if ctx.id() == UserId(1) {
                    panic!("action exploded");
                }
                Ok(Flow::Continue)
            }
            .boxed()
        }

        let mut harness = Harness::new();
        let class = UserClass::new("Boom", TaskSet::random("root").step(Action::new("boom", boom)));

        let res = tokio::spawn(harness.user(class).run(harness.exit_tx.clone())).await;
        assert!(res.unwrap_err().is_panic());
        assert_eq!(
            harness.exits.recv().await,
            Some((UserId(1), UserExit::Panicked))
        );
        assert_eq!(harness.connector.counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn stop_interrupts_think_time() {
        let harness = Harness::new();
        let class = UserClass::new("Thinker", TaskSet::random("root").step(ECHO_ACTION))
            .think_time(ThinkTime::constant(Duration::from_secs(60)));

        let user = harness.user(class);
        let mut state = user.state();
        let run = tokio::spawn(user.run(harness.exit_tx.clone()));

        state
            .wait_for(|state| *state == UserState::Running)
            .await
            .unwrap();
        while harness.sink.total() == 0 {
            tokio::task::yield_now().await;
        }

        let started = std::time::Instant::now();
        harness.stop.send_replace(true);
        run.await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(*state.borrow(), UserState::Stopped);
        assert_eq!(harness.sink.total(), 1);
        assert_eq!(harness.connector.counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overrides_and_validation() {
        let mut class = UserClass::new("A", TaskSet::random("root").step(ECHO_ACTION));
        class.apply_override(&UserClassOverride {
            weight: NonZeroU32::new(5),
            think_time: Some(ThinkTime::constant(Duration::from_secs(2))),
        });
        assert_eq!(class.get_weight(), 5);
        assert_eq!(
            class.get_think_time(),
            &ThinkTime::constant(Duration::from_secs(2))
        );
        assert!(class.validate().is_ok());

        assert_eq!(
            class.clone().weight(0).validate(),
            Err(ConfigError::ZeroWeight("A".to_string()))
        );
        assert_eq!(
            UserClass::new("B", TaskSet::random("empty")).validate(),
            Err(ConfigError::EmptyTaskSet("empty".to_string()))
        );
    }
}
