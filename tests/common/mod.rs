//! Shared utilities for integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use telemetry_runtime::config::ConfigSnapshot;
use telemetry_runtime::timeseries::ResampledOutput;

/// Write a config file and return its path.
#[allow(dead_code)]
pub fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("failed to write config fixture");
    path
}

/// Build a snapshot watch channel directly from TOML, standing in for a
/// running config manager.
#[allow(dead_code)]
pub fn snapshot_channel(
    toml: &str,
) -> (
    watch::Sender<Arc<ConfigSnapshot>>,
    watch::Receiver<Arc<ConfigSnapshot>>,
) {
    let (tx, rx) = watch::channel(snapshot(toml));
    (tx, rx)
}

/// Parse TOML into a published-snapshot value.
#[allow(dead_code)]
pub fn snapshot(toml: &str) -> Arc<ConfigSnapshot> {
    let raw = toml.parse().expect("invalid TOML fixture");
    Arc::new(ConfigSnapshot::from_table(raw).expect("fixture failed to decode"))
}

/// Collect resampler outputs until `deadline` elapses.
#[allow(dead_code)]
pub async fn collect_outputs(
    rx: &mut mpsc::Receiver<ResampledOutput>,
    deadline: Duration,
) -> Vec<ResampledOutput> {
    let mut outputs = Vec::new();
    let end = tokio::time::Instant::now() + deadline;
    loop {
        match tokio::time::timeout_at(end, rx.recv()).await {
            Ok(Some(output)) => outputs.push(output),
            Ok(None) | Err(_) => break,
        }
    }
    outputs
}
