//! The config-managing actor and its public handle.
//!
//! # Data Flow
//! ```text
//! ordered file set (file1.toml, file2.toml, ...)
//!     → loader: read + deep-merge + decode
//!     → ConfigSnapshot (immutable, Arc-shared)
//!     → arc-swap cell (current()) + watch channel (subscribe())
//!
//! On filesystem event (CREATE/MODIFY only):
//!     reload; publish only on success and only on change.
//!     On failure the previous snapshot stays current and the actor
//!     keeps watching.
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use toml::Table;

use crate::actor::{
    LifecycleError, Service, ServiceCore, ServiceState, ShutdownSignal, TaskOutcome, TaskResult,
};
use crate::config::loader::{self, DecodeError};
use crate::config::schema::CoreConfig;
use crate::config::watcher::{FileWatcher, PathEvent};
use crate::observability::metrics as metric;

/// One immutable, fully merged and decoded configuration value.
///
/// Updates replace the whole snapshot; a published snapshot is never
/// patched in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSnapshot {
    /// The decoded typed configuration.
    pub core: CoreConfig,
    /// The merged raw mapping the snapshot was decoded from.
    pub raw: Table,
}

impl ConfigSnapshot {
    pub fn from_table(raw: Table) -> Result<Self, DecodeError> {
        let core = raw.clone().try_into()?;
        Ok(Self { core, raw })
    }
}

/// Handle to the configuration distribution mechanism.
///
/// Owns the [`ConfigManagingActor`] plus the channels it publishes on.
/// Consumers either poll [`current`](Self::current) or subscribe for
/// change notifications; a subscriber that falls behind only ever
/// observes the latest snapshot.
pub struct ConfigManager {
    actor: ConfigManagingActor,
    updates: watch::Receiver<Arc<ConfigSnapshot>>,
    current: Arc<ArcSwap<ConfigSnapshot>>,
}

impl ConfigManager {
    /// Create a manager for an ordered configuration file set, named
    /// after its type.
    ///
    /// Order defines override priority: later paths win key-by-key.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self::named(crate::actor::service::short_type_name::<Self>(), paths)
    }

    pub fn named(name: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        let initial = Arc::new(ConfigSnapshot::default());
        let (tx, updates) = watch::channel(Arc::clone(&initial));
        let current = Arc::new(ArcSwap::new(initial));
        let actor = ConfigManagingActor {
            core: ServiceCore::new(name),
            paths,
            poll_interval: Duration::from_secs(2),
            tx,
            cell: Arc::clone(&current),
        };
        Self {
            actor,
            updates,
            current,
        }
    }

    /// Poll interval for the watcher's polling fallback.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.actor.poll_interval = poll_interval;
        self
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Subscribe to snapshot updates.
    ///
    /// The receiver starts out holding the current snapshot; `changed()`
    /// resolves on each successful, changed reload.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.updates.clone()
    }
}

#[async_trait]
impl Service for ConfigManager {
    fn name(&self) -> &str {
        self.actor.name()
    }

    fn state(&self) -> ServiceState {
        self.actor.state()
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        self.actor.start()
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        self.actor.stop()
    }

    async fn wait(&mut self) -> Vec<TaskOutcome> {
        self.actor.wait().await
    }
}

/// The actor that watches the file set and publishes snapshots.
pub struct ConfigManagingActor {
    core: ServiceCore,
    paths: Vec<PathBuf>,
    poll_interval: Duration,
    tx: watch::Sender<Arc<ConfigSnapshot>>,
    cell: Arc<ArcSwap<ConfigSnapshot>>,
}

#[async_trait]
impl Service for ConfigManagingActor {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn state(&self) -> ServiceState {
        self.core.state()
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        self.core.start()?;
        let context = ReloadContext {
            name: self.core.name().to_string(),
            paths: self.paths.clone(),
            tx: self.tx.clone(),
            cell: Arc::clone(&self.cell),
        };
        let poll_interval = self.poll_interval;
        self.core.spawn("watch", move |shutdown| {
            run_watch_loop(context, poll_interval, shutdown)
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        self.core.stop()
    }

    async fn wait(&mut self) -> Vec<TaskOutcome> {
        self.core.wait().await
    }
}

struct ReloadContext {
    name: String,
    paths: Vec<PathBuf>,
    tx: watch::Sender<Arc<ConfigSnapshot>>,
    cell: Arc<ArcSwap<ConfigSnapshot>>,
}

impl ReloadContext {
    /// Merge, decode and publish. Any failure leaves the previous
    /// snapshot current; the caller keeps watching either way.
    fn reload(&self, trigger: &str) {
        tracing::debug!(actor = %self.name, trigger, "reloading configuration");
        let raw = match loader::read_merged(&self.paths) {
            Ok(raw) => raw,
            Err(error) => {
                metrics::counter!(metric::CONFIG_RELOAD_FAILURES).increment(1);
                tracing::error!(actor = %self.name, %error, "configuration reload failed, keeping previous snapshot");
                return;
            }
        };
        let snapshot = match ConfigSnapshot::from_table(raw) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                metrics::counter!(metric::CONFIG_RELOAD_FAILURES).increment(1);
                tracing::error!(actor = %self.name, %error, "configuration decode failed, keeping previous snapshot");
                return;
            }
        };

        let previous = self.cell.load();
        if **previous == snapshot {
            tracing::info!(actor = %self.name, "configuration unchanged, skipping update");
            return;
        }

        let snapshot = Arc::new(snapshot);
        self.cell.store(Arc::clone(&snapshot));
        self.tx.send_replace(snapshot);
        metrics::counter!(metric::CONFIG_RELOADS).increment(1);
        tracing::info!(actor = %self.name, "configuration updated");
    }
}

async fn run_watch_loop(
    context: ReloadContext,
    poll_interval: Duration,
    mut shutdown: ShutdownSignal,
) -> TaskResult {
    let watcher = FileWatcher::new(context.paths.iter().cloned()).with_poll_interval(poll_interval);
    // The guard must outlive the loop; dropping it stops event delivery.
    let (_guard, mut events) = watcher.spawn()?;

    context.reload("startup");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(actor = %context.name, "watch loop stopping");
                break;
            }
            event = events.recv() => match event {
                Some(PathEvent { path, kind }) => {
                    tracing::debug!(actor = %context.name, path = %path.display(), ?kind, "configuration file event");
                    drain_pending(&mut events);
                    context.reload("filesystem event");
                }
                // Watcher thread gone; nothing left to react to.
                None => break,
            },
        }
    }
    Ok(())
}

/// Coalesce bursts: one write often produces several events, one reload
/// is enough for all of them.
fn drain_pending(events: &mut mpsc::UnboundedReceiver<PathEvent>) {
    while events.try_recv().is_ok() {}
}
