//! Actions and the task sets that order them.
use crate::error::{ActionError, ConfigError};
use crate::user::UserContext;
use futures_util::future::BoxFuture;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use swarmer_core::ThinkTime;

/// What the executor should do after an action returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Leave the enclosing task set and hand control back to its parent.
    Interrupt,
    /// Stop this virtual user for good.
    StopUser,
}

pub type ActionResult = Result<Flow, ActionError>;

pub type ActionFn = for<'a> fn(&'a mut UserContext) -> BoxFuture<'a, ActionResult>;

/// A leaf unit of work. Usually produced by the `#[action]` attribute.
#[derive(Clone, Copy)]
pub struct Action {
    name: &'static str,
    func: ActionFn,
}

impl Action {
    pub const fn new(name: &'static str, func: ActionFn) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call<'a>(&self, ctx: &'a mut UserContext) -> BoxFuture<'a, ActionResult> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.name).finish()
    }
}

/// A task set entry: either a leaf action or a nested task set that runs until
/// it is interrupted.
#[derive(Debug, Clone)]
pub enum Step {
    Action(Action),
    Nested(Arc<TaskSet>),
}

impl From<Action> for Step {
    fn from(action: Action) -> Self {
        Step::Action(action)
    }
}

impl From<TaskSet> for Step {
    fn from(set: TaskSet) -> Self {
        Step::Nested(Arc::new(set))
    }
}

impl From<Arc<TaskSet>> for Step {
    fn from(set: Arc<TaskSet>) -> Self {
        Step::Nested(set)
    }
}

/// What happens to the rest of an iteration when an action fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and carry on with the next action.
    #[default]
    Continue,
    /// Log and start the next iteration from the top.
    AbortIteration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Every step, in declaration order, once per iteration.
    Sequential,
    /// One step per iteration, picked by weight.
    Random,
}

#[derive(Debug, Clone)]
pub struct TaskSet {
    name: String,
    order: Order,
    steps: Vec<(Step, u32)>,
    on_start: Option<Action>,
    on_stop: Option<Action>,
    think_time: Option<ThinkTime>,
    failure_policy: FailurePolicy,
}

impl TaskSet {
    fn new(name: &str, order: Order) -> Self {
        Self {
            name: name.to_string(),
            order,
            steps: vec![],
            on_start: None,
            on_stop: None,
            think_time: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn sequential(name: &str) -> Self {
        Self::new(name, Order::Sequential)
    }

    pub fn random(name: &str) -> Self {
        Self::new(name, Order::Random)
    }

    pub fn step(self, step: impl Into<Step>) -> Self {
        self.weighted(step, 1)
    }

    /// Adds a step with a relative weight. Weights only matter for random task
    /// sets; a weight of zero counts as one.
    pub fn weighted(mut self, step: impl Into<Step>, weight: u32) -> Self {
        self.steps.push((step.into(), weight.max(1)));
        self
    }

    /// Runs once when the task set is entered.
    pub fn on_start(mut self, action: Action) -> Self {
        self.on_start = Some(action);
        self
    }

    /// Runs once when the task set is left, whether interrupted or stopped.
    pub fn on_stop(mut self, action: Action) -> Self {
        self.on_stop = Some(action);
        self
    }

    /// Overrides the think time inherited from the parent.
    pub fn think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = Some(think_time);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().map(|(step, _)| step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn start_action(&self) -> Option<Action> {
        self.on_start
    }

    pub(crate) fn stop_action(&self) -> Option<Action> {
        self.on_stop
    }

    pub(crate) fn own_think_time(&self) -> Option<&ThinkTime> {
        self.think_time.as_ref()
    }

    pub(crate) fn policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Every task set in the tree must have at least one step and a valid
    /// think time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::EmptyTaskSet(self.name.clone()));
        }
        if let Some(think_time) = &self.think_time {
            think_time.validate()?;
        }
        for step in self.steps() {
            if let Step::Nested(child) = step {
                child.validate()?;
            }
        }
        Ok(())
    }

    /// Steps to run in one iteration.
    pub(crate) fn iteration<R: Rng>(&self, rng: &mut R) -> Vec<&Step> {
        match self.order {
            Order::Sequential => self.steps().collect(),
            Order::Random => {
                let weights = self.steps.iter().map(|(_, weight)| *weight);
                match WeightedIndex::new(weights) {
                    Ok(index) => vec![&self.steps[index.sample(rng)].0],
                    Err(_) => vec![],
                }
            }
        }
    }
}
