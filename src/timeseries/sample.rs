//! Sample and output value types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Identifier of one input stream.
///
/// Cheap to clone and to use as a map key; handed around between the
/// producers, the resampler registry and the emitted outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// One timestamped measurement from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub source: SourceId,
    pub ts: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(source: impl Into<SourceId>, ts: DateTime<Utc>, value: f64) -> Self {
        Self {
            source: source.into(),
            ts,
            value,
        }
    }
}

/// One resampled output per source per cycle.
///
/// `value: None` is the gap marker: the cycle ran, the source had no
/// input, and the configured policy asked for an explicit marker.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledOutput {
    pub source: SourceId,
    /// The cycle boundary this output belongs to.
    pub ts: DateTime<Utc>,
    pub value: Option<f64>,
}

impl ResampledOutput {
    pub fn is_gap(&self) -> bool {
        self.value.is_none()
    }
}
