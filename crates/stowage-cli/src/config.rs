use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stowage_blob::BlobConfig;
use stowage_search::LifecycleConfig;

/// Everything the `stowage` binary reads from its TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StowageConfig {
    pub blob: BlobConfig,
    /// Index rotation settings for services that embed `stowage-search`
    /// and share this file. The binary has no search store to talk to, so
    /// it only validates the table on load and prints it in `config show`.
    pub search: LifecycleConfig,
}

impl StowageConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.search.validate().context("invalid [search] table")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("rendering configuration")
    }
}
