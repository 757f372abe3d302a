//! Task-owning lifecycle core shared by all actors.
//!
//! Concrete actors compose a [`ServiceCore`] rather than inheriting
//! behavior: the core owns the spawned tasks, the shutdown trigger and the
//! lifecycle state, while the actor decides what the tasks do. The
//! [`Service`] trait is the fixed `{start, stop, wait}` surface a
//! supervisor works against.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::{self, JoinSet};

use crate::actor::shutdown::{Shutdown, ShutdownSignal};

/// Result type returned by every task owned by a service.
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Lifecycle states of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

/// Lifecycle misuse, reported synchronously to the caller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("service `{0}` is already running")]
    AlreadyRunning(String),
    #[error("service `{0}` is not running")]
    NotRunning(String),
}

/// How one owned task ended, as reported by [`ServiceCore::wait`].
///
/// Failures are reported, never re-raised: the caller owns the
/// crash-restart policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { task: String },
    Cancelled { task: String },
    Failed { task: String, error: String },
}

impl TaskOutcome {
    pub fn task(&self) -> &str {
        match self {
            TaskOutcome::Completed { task }
            | TaskOutcome::Cancelled { task }
            | TaskOutcome::Failed { task, .. } => task,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

/// The task-owning core every actor embeds.
pub struct ServiceCore {
    name: String,
    state: ServiceState,
    shutdown: Shutdown,
    tasks: JoinSet<TaskResult>,
    labels: HashMap<task::Id, String>,
}

impl ServiceCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServiceState::Created,
            shutdown: Shutdown::new(),
            tasks: JoinSet::new(),
            labels: HashMap::new(),
        }
    }

    /// Create a core with a name derived from the embedding actor's type.
    pub fn with_default_name<T>() -> Self {
        Self::new(short_type_name::<T>())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    /// Transition `Created`/`Stopped` to `Running`.
    ///
    /// The embedding actor calls this from its own `start()` before
    /// spawning its tasks.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ServiceState::Created | ServiceState::Stopped => {
                // A fresh trigger is only needed on restart; replacing an
                // untriggered one would orphan tasks spawned before start.
                if self.shutdown.is_triggered() {
                    self.shutdown = Shutdown::new();
                }
                self.state = ServiceState::Running;
                tracing::debug!(service = %self.name, "service started");
                Ok(())
            }
            _ => Err(LifecycleError::AlreadyRunning(self.name.clone())),
        }
    }

    /// Spawn a task owned by this service.
    ///
    /// The task receives a [`ShutdownSignal`] and must exit promptly once
    /// it resolves.
    pub fn spawn<F, Fut>(&mut self, label: &str, f: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let signal = self.shutdown.subscribe();
        let handle = self.tasks.spawn(f(signal));
        self.labels
            .insert(handle.id(), format!("{}/{}", self.name, label));
    }

    /// Request cancellation of all owned tasks.
    ///
    /// Idempotent, and correct with an empty task set: the state still
    /// transitions and a later [`wait`](Self::wait) still terminates.
    /// Calling it again after the first request is a no-op.
    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ServiceState::Running => {
                self.state = ServiceState::Stopping;
                self.shutdown.trigger();
                tracing::debug!(service = %self.name, "stop requested");
                Ok(())
            }
            ServiceState::Stopping | ServiceState::Stopped | ServiceState::Crashed => Ok(()),
            ServiceState::Created => Err(LifecycleError::NotRunning(self.name.clone())),
        }
    }

    /// Wait for every owned task to finish and collect their outcomes.
    ///
    /// A failing or panicking task never turns into an error here; it is
    /// reported as [`TaskOutcome::Failed`] and the service ends up
    /// `Crashed`. Terminates immediately when no tasks were spawned.
    pub async fn wait(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, Ok(()))) => TaskOutcome::Completed {
                    task: self.label_for(id),
                },
                Ok((id, Err(error))) => TaskOutcome::Failed {
                    task: self.label_for(id),
                    error: error.to_string(),
                },
                Err(join_error) => {
                    let task = self.label_for(join_error.id());
                    if join_error.is_cancelled() {
                        TaskOutcome::Cancelled { task }
                    } else {
                        TaskOutcome::Failed {
                            task,
                            error: panic_message(join_error),
                        }
                    }
                }
            };
            if let TaskOutcome::Failed { task, error } = &outcome {
                tracing::error!(service = %self.name, task = %task, error = %error, "task failed");
            }
            outcomes.push(outcome);
        }
        self.labels.clear();
        let crashed =
            outcomes.iter().any(TaskOutcome::is_failure) || self.state == ServiceState::Crashed;
        self.state = if crashed {
            ServiceState::Crashed
        } else {
            ServiceState::Stopped
        };
        tracing::debug!(service = %self.name, state = ?self.state, tasks = outcomes.len(), "service finished");
        outcomes
    }

    fn label_for(&self, id: task::Id) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("{}/unnamed", self.name))
    }
}

impl std::fmt::Debug for ServiceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCore")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// The capability interface shared by all actors.
#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    /// Spawn the actor's tasks. Fails with
    /// [`LifecycleError::AlreadyRunning`] when called twice without an
    /// intervening stop.
    fn start(&mut self) -> Result<(), LifecycleError>;

    /// Request cancellation of the actor's tasks.
    fn stop(&mut self) -> Result<(), LifecycleError>;

    /// Block until all tasks finished, reporting per-task outcomes.
    async fn wait(&mut self) -> Vec<TaskOutcome>;
}

#[async_trait]
impl Service for ServiceCore {
    fn name(&self) -> &str {
        ServiceCore::name(self)
    }

    fn state(&self) -> ServiceState {
        ServiceCore::state(self)
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        ServiceCore::start(self)
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        ServiceCore::stop(self)
    }

    async fn wait(&mut self) -> Vec<TaskOutcome> {
        ServiceCore::wait(self).await
    }
}

/// Last path segment of a type name, used for default actor names.
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
