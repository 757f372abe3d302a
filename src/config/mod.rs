//! Configuration distribution subsystem.
//!
//! An ordered set of TOML files is merged (later files override earlier
//! ones), decoded into typed sections and published as immutable
//! snapshots. The managing actor keeps the set under filesystem watch
//! and republishes on every effective change, tolerating missing and
//! malformed files without ever crashing.

pub mod loader;
pub mod manager;
pub mod schema;
pub mod watcher;

pub use loader::{
    load_config, load_config_with, section, ConfigError, DecodeError, InvalidSectionError,
};
pub use manager::{ConfigManager, ConfigManagingActor, ConfigSnapshot};
pub use schema::{
    CoreConfig, EmptyWindowPolicy, LoggingConfig, ResampleFunctionKind, ResamplerConfig,
    SourceOverrides,
};
pub use watcher::{FileWatcher, PathEvent, PathEventKind};
