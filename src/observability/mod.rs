//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via the tracing crate throughout
//! - Metrics are cheap facade calls; exporting them is the embedding
//!   application's choice

pub mod logging;
pub mod metrics;
