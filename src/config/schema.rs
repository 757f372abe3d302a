//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the merged
//! configuration files, and every section has a compiled-in default so a
//! section removed from the files falls back cleanly instead of keeping
//! stale state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration distributed by the config manager.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    /// Resampler settings (cycle period, empty-window policy, defaults).
    pub resampler: ResamplerConfig,

    /// Logging settings, consumed by the embedding application.
    pub logging: LoggingConfig,
}

/// Settings for the periodic resampler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResamplerConfig {
    /// Resampling cycle period in milliseconds.
    pub period_ms: u64,

    /// What a cycle emits for a source with no new samples.
    pub on_empty: EmptyWindowPolicy,

    /// Window capacity (sample count) for sources without an override.
    pub default_window_samples: usize,

    /// Resampling function for sources without an override.
    pub default_function: ResampleFunctionKind,

    /// Per-source overrides, keyed by source id.
    pub sources: BTreeMap<String, SourceOverrides>,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            period_ms: 1_000,
            on_empty: EmptyWindowPolicy::EmitGap,
            default_window_samples: 256,
            default_function: ResampleFunctionKind::Average,
            sources: BTreeMap::new(),
        }
    }
}

/// Policy for a resampling cycle that found no input samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyWindowPolicy {
    /// Emit one output with no value, marking the gap.
    EmitGap,
    /// Emit nothing for that source this cycle.
    Skip,
}

/// Built-in resampling functions selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFunctionKind {
    Average,
    Last,
    Sum,
    Min,
    Max,
}

/// Per-source parameter overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SourceOverrides {
    /// Window capacity override (sample count).
    pub window_samples: Option<usize>,

    /// Resampling function override.
    pub function: Option<ResampleFunctionKind>,
}

/// Logging configuration section.
///
/// The runtime only carries this as typed data; applying it to a logging
/// backend is the embedding application's job.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the root logger (trace, debug, info, warn, error).
    pub level: String,

    /// Per-target level overrides, keyed by logger name.
    pub loggers: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            loggers: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_decodes_to_defaults() {
        let config: CoreConfig = toml::Table::new().try_into().unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.resampler.period_ms, 1_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_section_keeps_remaining_defaults() {
        let table: toml::Table = r#"
            [resampler]
            period_ms = 250
            on_empty = "skip"
        "#
        .parse()
        .unwrap();
        let config: CoreConfig = table.try_into().unwrap();
        assert_eq!(config.resampler.period_ms, 250);
        assert_eq!(config.resampler.on_empty, EmptyWindowPolicy::Skip);
        assert_eq!(config.resampler.default_window_samples, 256);
    }

    #[test]
    fn per_source_overrides_decode() {
        let table: toml::Table = r#"
            [resampler.sources.meter-1]
            window_samples = 16
            function = "last"
        "#
        .parse()
        .unwrap();
        let config: CoreConfig = table.try_into().unwrap();
        let overrides = &config.resampler.sources["meter-1"];
        assert_eq!(overrides.window_samples, Some(16));
        assert_eq!(overrides.function, Some(ResampleFunctionKind::Last));
    }
}
