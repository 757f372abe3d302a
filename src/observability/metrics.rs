//! Metric names recorded by the runtime.
//!
//! Recorded through the `metrics` facade; the embedding application
//! decides on the exporter.

/// Counter: successful configuration reloads that changed the snapshot.
pub const CONFIG_RELOADS: &str = "config_reloads_total";

/// Counter: reload attempts that failed (missing set, parse, decode).
pub const CONFIG_RELOAD_FAILURES: &str = "config_reload_failures_total";

/// Counter: completed resample cycles.
pub const RESAMPLE_CYCLES: &str = "resample_cycles_total";

/// Counter: gap markers emitted for empty windows.
pub const RESAMPLE_GAPS: &str = "resample_gaps_total";

/// Counter: out-of-order samples rejected at the window boundary.
pub const SAMPLES_REJECTED: &str = "samples_rejected_total";

/// Counter: samples dropped because their source is not registered.
pub const SAMPLES_DROPPED: &str = "samples_dropped_total";

/// Gauge: currently registered resample sources.
pub const RESAMPLE_SOURCES: &str = "resample_sources";
