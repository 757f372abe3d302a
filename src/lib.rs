//! Telemetry runtime substrate: background actors, live-reloadable
//! configuration and periodic resampling.
//!
//! # Architecture Overview
//!
//! ```text
//!   config files (ordered, later overrides earlier)
//!        │ filesystem events (CREATE/MODIFY)
//!        ▼
//!  ┌───────────────────┐   ConfigSnapshot    ┌───────────────────┐
//!  │  config manager   │────────────────────▶│     resampler     │
//!  │     (actor)       │   watch channel     │      (actor)      │
//!  └───────────────────┘                     └───────────────────┘
//!        │                                     ▲              │
//!        │ snapshots to other subscribers      │ samples      │ one output
//!        ▼                                     │ (mpsc)       │ per source
//!   application actors                     producers        per cycle
//!
//!  every actor composes a ServiceCore: start / stop / wait,
//!  cooperative cancellation, per-task crash reporting
//! ```
//!
//! Producers push timestamped samples into per-source moving windows; a
//! timer drives one resampled output per registered source per cycle,
//! with membership changes applied safely between cycles. Configuration
//! is merged from a prioritized file set and redistributed as immutable
//! snapshots on every effective change.

// Core subsystems
pub mod actor;
pub mod config;
pub mod timeseries;

// Cross-cutting concerns
pub mod observability;

pub use actor::{Service, ServiceCore, ServiceSet, ServiceState, TaskOutcome};
pub use config::{ConfigManager, ConfigSnapshot, CoreConfig};
pub use timeseries::{
    MovingWindow, ResampledOutput, Resampler, ResamplerHandle, Sample, SourceId, WindowCapacity,
};
