//! Background-actor runtime.
//!
//! # Data Flow
//! ```text
//! concrete actor (config manager, resampler, ...)
//!     → composes a ServiceCore (owned tasks + shutdown trigger + state)
//!     → start(): spawn tasks, each holding a ShutdownSignal
//!     → stop(): broadcast cancellation (no-op safe with zero tasks)
//!     → wait(): join every task, report TaskOutcome per task
//!
//! ServiceSet groups actors; a crashed actor is reported, siblings
//! keep running.
//! ```
//!
//! # Design Decisions
//! - Composition over inheritance: actors embed ServiceCore, the Service
//!   trait is the only shared surface
//! - Task failures are data (TaskOutcome), not propagated errors; the
//!   owner picks the restart policy
//! - Cancellation is cooperative via a sticky broadcast trigger

pub mod service;
pub mod shutdown;
pub mod supervisor;

pub use service::{
    LifecycleError, Service, ServiceCore, ServiceState, TaskOutcome, TaskResult,
};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use supervisor::{ServiceReport, ServiceSet};
