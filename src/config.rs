//! Runtime configuration.
//!
//! Everything has a working default; a JSON config file only overrides what
//! it names. Detection heuristics live in [`DetectorTuning`] and pass
//! through untouched.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ad_detector::DetectorTuning;
use tab_coordinator::CoordinatorConfig;

fn default_debounce_ms() -> u64 {
    150
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_store_capacity() -> usize {
    10_000
}

fn default_max_tabs() -> usize {
    64
}

fn default_retention_ms() -> i64 {
    10 * 60 * 1_000
}

fn default_ad_dedup_window_ms() -> i64 {
    5_000
}

/// Coordinator knobs as they appear in the config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub max_tabs: usize,
    pub retention_ms: i64,
    pub ad_dedup_window_ms: i64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_tabs: default_max_tabs(),
            retention_ms: default_retention_ms(),
            ad_dedup_window_ms: default_ad_dedup_window_ms(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tuning: DetectorTuning,
    pub coordinator: CoordinatorSettings,

    /// Coalescing delay between a sampling trigger and the actual pass.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How often the coordinator's reclamation sweep runs.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Total entry capacity of the in-memory rolling store.
    #[serde(default = "default_store_capacity")]
    pub store_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tuning: DetectorTuning::default(),
            coordinator: CoordinatorSettings::default(),
            debounce_ms: default_debounce_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            store_capacity: default_store_capacity(),
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                let config: Self = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_tabs: self.coordinator.max_tabs,
            retention_ms: self.coordinator.retention_ms,
            ad_dedup_window_ms: self.coordinator.ad_dedup_window_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.debounce_ms, 150);
        assert_eq!(config.coordinator.max_tabs, 64);
        assert_eq!(config.tuning.poll_interval_ms, 1_000);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"debounce_ms": 50, "coordinator": {{"max_tabs": 8}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.coordinator.max_tabs, 8);
        // Untouched fields keep their defaults.
        assert_eq!(config.coordinator.retention_ms, 600_000);
        assert_eq!(config.sweep_interval_ms, 60_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "max_tabs = 8").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
