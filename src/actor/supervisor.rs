//! Driving a set of services as one unit.

use crate::actor::service::{LifecycleError, Service, TaskOutcome};

/// Per-service result collected by [`ServiceSet::join_all`].
#[derive(Debug)]
pub struct ServiceReport {
    pub service: String,
    pub outcomes: Vec<TaskOutcome>,
}

impl ServiceReport {
    pub fn crashed(&self) -> bool {
        self.outcomes.iter().any(TaskOutcome::is_failure)
    }
}

/// A flat group of independently lifecycled services.
///
/// The set only sequences lifecycle calls; it deliberately has no restart
/// policy. A crash in one service is surfaced in its [`ServiceReport`] and
/// never propagates to siblings, so the owner can decide whether to
/// restart, abort, or ignore.
#[derive(Default)]
pub struct ServiceSet {
    services: Vec<Box<dyn Service>>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, service: Box<dyn Service>) {
        self.services.push(service);
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Start every service. Stops at the first lifecycle error; services
    /// started before the failure keep running.
    pub fn start_all(&mut self) -> Result<(), LifecycleError> {
        for service in &mut self.services {
            service.start()?;
        }
        Ok(())
    }

    /// Request cancellation of every running service.
    pub fn stop_all(&mut self) {
        for service in &mut self.services {
            if let Err(error) = service.stop() {
                tracing::warn!(service = service.name(), %error, "stop skipped");
            }
        }
    }

    /// Wait for every service to finish, collecting one report each.
    ///
    /// Services wind down concurrently once stopped; awaiting them in
    /// order only sequences the collection of outcomes.
    pub async fn join_all(&mut self) -> Vec<ServiceReport> {
        let mut reports = Vec::with_capacity(self.services.len());
        for service in &mut self.services {
            let name = service.name().to_string();
            let outcomes = service.wait().await;
            reports.push(ServiceReport {
                service: name,
                outcomes,
            });
        }
        reports
    }
}
