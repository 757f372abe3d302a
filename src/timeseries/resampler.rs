//! Periodic per-source resampling with dynamic membership.
//!
//! The resampler is an actor: producers push samples and membership
//! commands over channels, and a single owned task holds the source
//! registry. All mutation happens inside that task, so registrations can
//! never race a cycle's iteration; on top of that, every cycle iterates
//! a snapshot of the current keys, never the live registry, so a command
//! applied between two sources of one cycle cannot shift anything under
//! the iteration either.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::actor::{
    LifecycleError, Service, ServiceCore, ServiceState, ShutdownSignal, TaskOutcome, TaskResult,
};
use crate::config::manager::ConfigSnapshot;
use crate::config::schema::{EmptyWindowPolicy, ResampleFunctionKind, ResamplerConfig};
use crate::observability::metrics as metric;
use crate::timeseries::sample::{ResampledOutput, Sample, SourceId};
use crate::timeseries::window::{MovingWindow, WindowCapacity, WindowError};

/// Reducer applied to one cycle's worth of samples.
#[derive(Clone)]
pub enum ResampleFunction {
    Average,
    Last,
    Sum,
    Min,
    Max,
    /// User-supplied reducer over the cycle's values (never called with
    /// an empty slice).
    Custom(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>),
}

impl ResampleFunction {
    /// Reduce the cycle's values; `None` when no samples arrived.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let reduced = match self {
            ResampleFunction::Average => values.iter().sum::<f64>() / values.len() as f64,
            ResampleFunction::Last => values[values.len() - 1],
            ResampleFunction::Sum => values.iter().sum(),
            ResampleFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ResampleFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ResampleFunction::Custom(reducer) => reducer(values),
        };
        Some(reduced)
    }
}

impl fmt::Debug for ResampleFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResampleFunction::Average => "Average",
            ResampleFunction::Last => "Last",
            ResampleFunction::Sum => "Sum",
            ResampleFunction::Min => "Min",
            ResampleFunction::Max => "Max",
            ResampleFunction::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

impl From<ResampleFunctionKind> for ResampleFunction {
    fn from(kind: ResampleFunctionKind) -> Self {
        match kind {
            ResampleFunctionKind::Average => ResampleFunction::Average,
            ResampleFunctionKind::Last => ResampleFunction::Last,
            ResampleFunctionKind::Sum => ResampleFunction::Sum,
            ResampleFunctionKind::Min => ResampleFunction::Min,
            ResampleFunctionKind::Max => ResampleFunction::Max,
        }
    }
}

/// Parameters for one registered source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub window: WindowCapacity,
    pub function: ResampleFunction,
}

impl SourceConfig {
    /// Resolve a source's parameters from the resampler settings,
    /// applying per-source overrides where present.
    pub fn from_settings(settings: &ResamplerConfig, id: &str) -> Self {
        let overrides = settings.sources.get(id);
        let window_samples = overrides
            .and_then(|o| o.window_samples)
            .unwrap_or(settings.default_window_samples);
        let function = overrides
            .and_then(|o| o.function)
            .unwrap_or(settings.default_function);
        Self {
            window: WindowCapacity::Samples(window_samples),
            function: function.into(),
        }
    }
}

/// Membership misuse or a resampler that is no longer reachable.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("source `{0}` is already registered")]
    DuplicateSource(SourceId),
    #[error("source `{0}` is not registered")]
    UnknownSource(SourceId),
    #[error("resampler is not running")]
    Closed,
}

enum Command {
    AddSource {
        id: SourceId,
        config: SourceConfig,
        ack: oneshot::Sender<Result<(), RegistryError>>,
    },
    RemoveSource {
        id: SourceId,
        ack: oneshot::Sender<Result<(), RegistryError>>,
    },
}

/// Cloneable handle for producers and for membership changes.
///
/// Both membership calls are safe while a resampling cycle is in flight:
/// they are queued to the actor task and applied between cycles, after
/// the in-progress cycle has finished.
#[derive(Clone)]
pub struct ResamplerHandle {
    cmd_tx: mpsc::Sender<Command>,
    sample_tx: mpsc::Sender<Sample>,
}

impl ResamplerHandle {
    /// Register a new source. Resolves once the registry applied it.
    pub async fn add_source(
        &self,
        id: impl Into<SourceId>,
        config: SourceConfig,
    ) -> Result<(), RegistryError> {
        let (ack, done) = oneshot::channel();
        self.cmd_tx
            .send(Command::AddSource {
                id: id.into(),
                config,
                ack,
            })
            .await
            .map_err(|_| RegistryError::Closed)?;
        done.await.map_err(|_| RegistryError::Closed)?
    }

    /// Deregister a source; its buffered samples are dropped with it.
    pub async fn remove_source(&self, id: impl Into<SourceId>) -> Result<(), RegistryError> {
        let (ack, done) = oneshot::channel();
        self.cmd_tx
            .send(Command::RemoveSource { id: id.into(), ack })
            .await
            .map_err(|_| RegistryError::Closed)?;
        done.await.map_err(|_| RegistryError::Closed)?
    }

    /// Sender for pushing samples into the per-source buffers.
    pub fn sample_sender(&self) -> mpsc::Sender<Sample> {
        self.sample_tx.clone()
    }
}

/// The resampling actor.
pub struct Resampler {
    core: ServiceCore,
    handle: ResamplerHandle,
    cmd_rx: Option<mpsc::Receiver<Command>>,
    sample_rx: Option<mpsc::Receiver<Sample>>,
    config_rx: Option<watch::Receiver<Arc<ConfigSnapshot>>>,
    output_tx: Option<mpsc::Sender<ResampledOutput>>,
}

impl Resampler {
    /// Create a resampler fed by `config_rx` and emitting on `output_tx`,
    /// named after its type.
    pub fn new(
        config_rx: watch::Receiver<Arc<ConfigSnapshot>>,
        output_tx: mpsc::Sender<ResampledOutput>,
    ) -> Self {
        Self::named(
            crate::actor::service::short_type_name::<Self>(),
            config_rx,
            output_tx,
        )
    }

    pub fn named(
        name: impl Into<String>,
        config_rx: watch::Receiver<Arc<ConfigSnapshot>>,
        output_tx: mpsc::Sender<ResampledOutput>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (sample_tx, sample_rx) = mpsc::channel(1_024);
        Self {
            core: ServiceCore::new(name),
            handle: ResamplerHandle { cmd_tx, sample_tx },
            cmd_rx: Some(cmd_rx),
            sample_rx: Some(sample_rx),
            config_rx: Some(config_rx),
            output_tx: Some(output_tx),
        }
    }

    pub fn handle(&self) -> ResamplerHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Service for Resampler {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn state(&self) -> ServiceState {
        self.core.state()
    }

    /// The resampler owns single-use channel ends; it cannot be
    /// restarted after `wait()` and reports `AlreadyRunning` instead.
    fn start(&mut self) -> Result<(), LifecycleError> {
        let (Some(cmd_rx), Some(sample_rx), Some(config_rx), Some(output_tx)) = (
            self.cmd_rx.take(),
            self.sample_rx.take(),
            self.config_rx.take(),
            self.output_tx.take(),
        ) else {
            return Err(LifecycleError::AlreadyRunning(self.core.name().to_string()));
        };
        self.core.start()?;
        let settings = config_rx.borrow().core.resampler.clone();
        let state = ResampleLoop {
            name: self.core.name().to_string(),
            entries: BTreeMap::new(),
            settings,
            pending_settings: None,
            cmd_rx,
            sample_rx,
            config_rx,
            output_tx,
        };
        self.core
            .spawn("cycle", move |shutdown| state.run(shutdown));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        self.core.stop()
    }

    async fn wait(&mut self) -> Vec<TaskOutcome> {
        self.core.wait().await
    }
}

/// One registered source: its buffer plus resampling state.
struct SeriesEntry {
    window: MovingWindow,
    function: ResampleFunction,
    /// Boundary of the last cycle that covered this source.
    last_boundary: DateTime<Utc>,
}

struct ResampleLoop {
    name: String,
    entries: BTreeMap<SourceId, SeriesEntry>,
    settings: ResamplerConfig,
    /// Staged configuration, applied at the next cycle boundary.
    pending_settings: Option<ResamplerConfig>,
    cmd_rx: mpsc::Receiver<Command>,
    sample_rx: mpsc::Receiver<Sample>,
    config_rx: watch::Receiver<Arc<ConfigSnapshot>>,
    output_tx: mpsc::Sender<ResampledOutput>,
}

impl ResampleLoop {
    async fn run(mut self, mut shutdown: ShutdownSignal) -> TaskResult {
        let mut period = Duration::from_millis(self.settings.period_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut commands_open = true;
        let mut samples_open = true;
        let mut config_open = true;

        tracing::debug!(actor = %self.name, period_ms = self.settings.period_ms, "resample loop running");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(actor = %self.name, "resample loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(new_period) = self.apply_pending_settings() {
                        period = new_period;
                        ticker = interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                    if !self.run_cycle(Utc::now()).await {
                        tracing::warn!(actor = %self.name, "output channel closed, resample loop exiting");
                        break;
                    }
                }
                command = self.cmd_rx.recv(), if commands_open => match command {
                    Some(command) => self.apply_command(command),
                    None => commands_open = false,
                },
                sample = self.sample_rx.recv(), if samples_open => match sample {
                    Some(sample) => {
                        self.ingest(sample);
                        // Drain what is already queued so a fast producer
                        // does not pay one select round-trip per sample.
                        let mut quota = 256;
                        while quota > 0 {
                            match self.sample_rx.try_recv() {
                                Ok(sample) => self.ingest(sample),
                                Err(_) => break,
                            }
                            quota -= 1;
                        }
                    }
                    None => samples_open = false,
                },
                changed = self.config_rx.changed(), if config_open => match changed {
                    Ok(()) => {
                        let snapshot = self.config_rx.borrow_and_update().clone();
                        self.pending_settings = Some(snapshot.core.resampler.clone());
                        tracing::debug!(actor = %self.name, "new configuration staged for next cycle");
                    }
                    // Config source gone; keep running on the last settings.
                    Err(_) => config_open = false,
                },
            }
        }
        Ok(())
    }

    /// Apply staged settings at a cycle boundary. Returns the new period
    /// when it changed.
    fn apply_pending_settings(&mut self) -> Option<Duration> {
        let staged = self.pending_settings.take()?;
        let period_changed = staged.period_ms != self.settings.period_ms;
        if staged.period_ms == 0 {
            tracing::warn!(actor = %self.name, "ignoring configured period of 0ms");
            self.settings = ResamplerConfig {
                period_ms: self.settings.period_ms,
                ..staged
            };
            return None;
        }
        self.settings = staged;
        period_changed.then(|| Duration::from_millis(self.settings.period_ms))
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::AddSource { id, config, ack } => {
                let result = if self.entries.contains_key(&id) {
                    Err(RegistryError::DuplicateSource(id.clone()))
                } else {
                    self.entries.insert(
                        id.clone(),
                        SeriesEntry {
                            window: MovingWindow::new(config.window),
                            function: config.function,
                            last_boundary: Utc::now(),
                        },
                    );
                    tracing::info!(actor = %self.name, source = %id, "source registered");
                    Ok(())
                };
                metrics::gauge!(metric::RESAMPLE_SOURCES).set(self.entries.len() as f64);
                let _ = ack.send(result);
            }
            Command::RemoveSource { id, ack } => {
                let result = if self.entries.remove(&id).is_some() {
                    tracing::info!(actor = %self.name, source = %id, "source removed");
                    Ok(())
                } else {
                    Err(RegistryError::UnknownSource(id.clone()))
                };
                metrics::gauge!(metric::RESAMPLE_SOURCES).set(self.entries.len() as f64);
                let _ = ack.send(result);
            }
        }
    }

    fn ingest(&mut self, sample: Sample) {
        let Some(entry) = self.entries.get_mut(&sample.source) else {
            metrics::counter!(metric::SAMPLES_DROPPED).increment(1);
            tracing::debug!(actor = %self.name, source = %sample.source, "sample for unregistered source dropped");
            return;
        };
        match entry.window.push(sample.ts, sample.value) {
            Ok(()) => {}
            Err(WindowError::OutOfOrder { ts, newest }) => {
                metrics::counter!(metric::SAMPLES_REJECTED).increment(1);
                tracing::warn!(
                    actor = %self.name,
                    source = %sample.source,
                    %ts,
                    %newest,
                    "out-of-order sample rejected"
                );
            }
        }
    }

    /// One pass over the sources registered at the cycle boundary.
    ///
    /// Returns `false` when the output channel is gone.
    async fn run_cycle(&mut self, boundary: DateTime<Utc>) -> bool {
        // Snapshot of the membership; commands landing while outputs are
        // being sent wait for the next cycle.
        let ids: Vec<SourceId> = self.entries.keys().cloned().collect();
        metrics::counter!(metric::RESAMPLE_CYCLES).increment(1);

        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            let values: Vec<f64> = entry
                .window
                .range(entry.last_boundary, boundary)
                .map(|(_, value)| value)
                .collect();
            entry.last_boundary = boundary;

            let value = entry.function.apply(&values);
            if value.is_none() {
                match self.settings.on_empty {
                    EmptyWindowPolicy::EmitGap => {
                        metrics::counter!(metric::RESAMPLE_GAPS).increment(1);
                    }
                    EmptyWindowPolicy::Skip => continue,
                }
            }
            let output = ResampledOutput {
                source: id,
                ts: boundary,
                value,
            };
            if self.output_tx.send(output).await.is_err() {
                return false;
            }
        }
        true
    }
}
