use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::join::JoinOptions;

/// Ingest settings, read from a JSON file. Missing keys take their defaults.
///
/// ```json
/// { "join": { "max_gap_seconds": 900.0, "fill_gaps": false } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub join: JoinOptions,
}

impl IngestConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in config {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: IngestConfig = serde_json::from_str(text).context("parsing config JSON")?;
        if let Some(max) = config.join.max_gap_seconds {
            anyhow::ensure!(max >= 0.0, "join.max_gap_seconds must not be negative, got {max}");
        }
        anyhow::ensure!(
            config.join.frequency_tolerance_mhz >= 0.0,
            "join.frequency_tolerance_mhz must not be negative"
        );
        Ok(config)
    }
}
