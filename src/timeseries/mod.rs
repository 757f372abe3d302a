//! Timeseries subsystem: samples, windows and the periodic resampler.
//!
//! # Data Flow
//! ```text
//! producers ── mpsc ──▶ per-source MovingWindow (owned by the actor)
//!                               │
//!          timer tick ──▶ resample cycle (snapshot of registered ids)
//!                               │
//!                               ▼
//!              one ResampledOutput per source per cycle
//!              (value, or a gap marker on empty input)
//! ```
//!
//! # Design Decisions
//! - The source registry is owned by the resampler task; membership
//!   changes arrive as commands and apply between cycles
//! - Each cycle iterates a snapshot of the registered ids, never the
//!   live registry
//! - Empty input emits a gap marker by default (configurable to skip)

pub mod resampler;
pub mod sample;
pub mod window;

pub use resampler::{RegistryError, ResampleFunction, Resampler, ResamplerHandle, SourceConfig};
pub use sample::{ResampledOutput, Sample, SourceId};
pub use window::{MovingWindow, WindowCapacity, WindowError};
