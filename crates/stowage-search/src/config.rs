use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SearchResult;
use crate::names::{validate_alias_name, validate_index_name};

/// Configuration for managing one alias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Stable name queries go through.
    pub alias: String,
    /// Index holding the per-alias version documents.
    pub metadata_index: String,
    /// Promotion attempts before giving up with a contention error.
    pub max_attempts: u32,
    /// Pause after a lost race, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
    /// Settings and mappings applied to every new physical index.
    pub index_schema: Value,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            alias: "charms".into(),
            metadata_index: ".versions".into(),
            max_attempts: 5,
            retry_backoff_ms: 25,
            index_schema: Value::Object(Default::default()),
        }
    }
}

impl LifecycleConfig {
    /// Defaults for `alias`.
    pub fn for_alias(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Default::default()
        }
    }

    /// Check that the alias and metadata index are names the store accepts.
    /// The metadata index may carry one leading dot to keep it hidden.
    pub fn validate(&self) -> SearchResult<()> {
        validate_alias_name(&self.alias)?;
        validate_index_name(self.metadata_index.strip_prefix('.').unwrap_or(&self.metadata_index))
    }

    /// Pause before attempt `attempt + 1`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}
