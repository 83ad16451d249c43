use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::error::{Result, UploadError};
use crate::session::ConflictBehavior;

/// Default chunk size. Services reject both overly large and undersized
/// fragments, 256 KiB is accepted everywhere we have seen.
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;

/// Largest accepted chunk size. Each chunk is buffered in memory whole, and
/// drive services refuse fragments above 60 MiB.
pub const MAX_CHUNK_SIZE: u64 = 60 * 1024 * 1024;

/// Overrides [`UploadConfig::chunk_size`] in [`UploadConfig::from_env`].
pub const CHUNK_SIZE_ENV: &str = "RANGE_UPLOAD_CHUNK_SIZE";

/// Overrides [`UploadConfig::conflict_behavior`] in [`UploadConfig::from_env`].
pub const CONFLICT_BEHAVIOR_ENV: &str = "RANGE_UPLOAD_CONFLICT_BEHAVIOR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Maximum number of bytes sent in one PUT.
    pub chunk_size: u64,

    /// Sent with the session creation request.
    pub conflict_behavior: ConflictBehavior,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            conflict_behavior: ConflictBehavior::default(),
        }
    }
}

impl UploadConfig {
    /// Defaults, with any environment overrides applied. Values that do not
    /// parse are ignored with a warning.
    pub fn from_env() -> Self {
        UploadConfig::from_lookup(|name| env::var(name).ok())
    }

    /// [`UploadConfig::from_env`] reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = UploadConfig::default();
        if let Some(chunk_size) = override_value::<u64>(&lookup, CHUNK_SIZE_ENV) {
            config.chunk_size = chunk_size;
        }
        if let Some(conflict_behavior) = override_value::<ConflictBehavior>(&lookup, CONFLICT_BEHAVIOR_ENV) {
            config.conflict_behavior = conflict_behavior;
        }
        config
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_conflict_behavior(mut self, conflict_behavior: ConflictBehavior) -> Self {
        self.conflict_behavior = conflict_behavior;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(UploadError::Configuration("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::Configuration(format!(
                "chunk_size {} exceeds the maximum of {MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

fn override_value<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

impl FromStr for ConflictBehavior {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(ConflictBehavior::Fail),
            "replace" => Ok(ConflictBehavior::Replace),
            "rename" => Ok(ConflictBehavior::Rename),
            _ => Err(UploadError::Configuration(format!("unknown conflict behavior {s:?}"))),
        }
    }
}
