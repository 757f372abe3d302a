//! Filesystem watching for the configuration file set.
//!
//! Wraps the platform watcher behind a narrow channel contract: the rest
//! of the crate only ever sees `(path, kind)` events for the registered
//! paths. The parent directories are watched rather than the files
//! themselves, so a path may start out missing and still produce a
//! CREATE event once the file appears.
//!
//! Only CREATE and MODIFY are forwarded. DELETE is deliberately ignored:
//! a deleted file must not tear down the current configuration, the next
//! CREATE/MODIFY will trigger the reload instead.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Actionable event kinds. Everything else is filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEventKind {
    Created,
    Modified,
}

/// One actionable change to a registered path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEvent {
    pub path: PathBuf,
    pub kind: PathEventKind,
}

/// Watcher over an ordered configuration file set.
pub struct FileWatcher {
    paths: Vec<PathBuf>,
    poll_interval: Duration,
}

impl FileWatcher {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Poll interval used when the platform watcher falls back to polling.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start watching.
    ///
    /// Returns the watcher guard (watching stops when it is dropped) and
    /// the receiver for filtered events.
    pub fn spawn(
        self,
    ) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<PathEvent>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watched = HashSet::new();
        let mut parents = HashSet::new();
        for path in &self.paths {
            let parent = parent_of(path);
            let canonical_parent = parent.canonicalize().unwrap_or(parent);
            if let Some(file_name) = path.file_name() {
                watched.insert(canonical_parent.join(file_name));
            }
            parents.insert(canonical_parent);
        }

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let kind = if event.kind.is_create() {
                        PathEventKind::Created
                    } else if event.kind.is_modify() {
                        PathEventKind::Modified
                    } else {
                        return;
                    };
                    for path in event.paths {
                        if watched.contains(&path) {
                            let _ = tx.send(PathEvent { path, kind });
                        }
                    }
                }
                Err(error) => tracing::error!(%error, "filesystem watch error"),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        for parent in &parents {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
            tracing::debug!(dir = %parent.display(), "watching configuration directory");
        }

        Ok((watcher, rx))
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    }
}
