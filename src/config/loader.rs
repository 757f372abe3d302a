//! Multi-file configuration loading and merging.
//!
//! The configured file set is an *ordered* list: every existing file is
//! parsed and deep-merged into the previous result, so later files
//! override earlier ones key-by-key. Nested tables merge recursively;
//! scalars and arrays are replaced wholesale. A missing file contributes
//! nothing and is not an error; only the whole set being absent is.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;
use toml::{Table, Value};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("none of the configuration files exist: {0:?}")]
    AllFilesMissing(Vec<PathBuf>),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// The merged mapping could not be decoded into the target type.
#[derive(Debug, Error)]
#[error("failed to decode configuration: {message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for DecodeError {
    fn from(error: toml::de::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// A non-table value was found where a table was required.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("value at key {} is not a table", .key.join("."))]
pub struct InvalidSectionError {
    /// Path to the offending value, outermost key first.
    pub key: Vec<String>,
}

/// Read every existing file in `paths`, in order, into one merged table.
///
/// Fails with [`ConfigError::AllFilesMissing`] only when no file in the
/// set exists; a missing subset is logged and skipped.
pub fn read_merged(paths: &[PathBuf]) -> Result<Table, ConfigError> {
    let mut merged = Table::new();
    let mut found_any = false;

    for path in paths {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "configuration file missing, skipping");
                continue;
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };
        let table: Table = contents.parse().map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        found_any = true;
        merge_into(&mut merged, table);
        tracing::debug!(path = %path.display(), "configuration file merged");
    }

    if !found_any {
        return Err(ConfigError::AllFilesMissing(paths.to_vec()));
    }
    Ok(merged)
}

/// Merge `src` into `dst`, later values winning on conflict.
///
/// Tables merge recursively; any other value replaces what was there.
fn merge_into(dst: &mut Table, src: Table) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                dst.insert(key, value);
            }
        }
    }
}

/// Merge the file set and decode it into `T` in one step.
///
/// The synchronous counterpart of the config managing actor's reload:
/// the result depends only on the file contents at call time, so two
/// calls over identical contents yield equal values.
pub fn load_config<T: DeserializeOwned>(paths: &[PathBuf]) -> Result<T, ConfigError> {
    let merged = read_merged(paths)?;
    let config = merged
        .try_into()
        .map_err(|error: toml::de::Error| DecodeError::from(error))?;
    Ok(config)
}

/// Like [`load_config`], with an explicit decoder.
///
/// The decoder sees the merged raw table; everything that influences the
/// decoded result is in the arguments, keeping decoding reproducible.
pub fn load_config_with<T, D>(paths: &[PathBuf], decode: D) -> Result<T, ConfigError>
where
    D: FnOnce(&Table) -> Result<T, DecodeError>,
{
    let merged = read_merged(paths)?;
    let config = decode(&merged)?;
    Ok(config)
}

/// Look up a nested table by key path.
///
/// Returns `Ok(None)` when any segment is absent, and
/// [`InvalidSectionError`] when a present segment holds a non-table
/// value. An empty key path returns the whole table.
pub fn section<'a>(table: &'a Table, key: &[&str]) -> Result<Option<&'a Table>, InvalidSectionError> {
    let mut current = table;
    for (depth, segment) in key.iter().enumerate() {
        match current.get(*segment) {
            None => return Ok(None),
            Some(Value::Table(inner)) => current = inner,
            Some(_) => {
                return Err(InvalidSectionError {
                    key: key[..=depth].iter().map(|s| s.to_string()).collect(),
                });
            }
        }
    }
    Ok(Some(current))
}
