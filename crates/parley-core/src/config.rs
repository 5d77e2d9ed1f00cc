//! Application configuration.
//!
//! Every section is `#[serde(default)]`, so a partial `config.toml` only
//! overrides what it names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumString};

/// Longest timer interval honored; larger settings are clamped to it.
const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub recovery: RecoveryConfig,
    pub autosave: AutoSaveConfig,
    pub conversation: ConversationDefaults,
}

/// Storage medium for sessions.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StorageBackend {
    /// One JSON file per session
    #[default]
    Filesystem,
    /// Embedded SQLite database
    Sqlite,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root for all parley data. Platform data dir when unset.
    pub base_dir: Option<PathBuf>,
    /// SQLite file. `<base_dir>/sessions.db` when unset.
    pub database_path: Option<PathBuf>,
    /// Backend-specific settings, passed through unmodified.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub save_interval_secs: u64,
    pub max_recovery_age_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            save_interval_secs: 30,
            max_recovery_age_secs: 24 * 60 * 60,
        }
    }
}

impl RecoveryConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }

    /// Saturates at `chrono::Duration::MAX` for out-of-range settings.
    pub fn max_recovery_age(&self) -> chrono::Duration {
        i64::try_from(self.max_recovery_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }
}

/// Settings applied to newly created sessions.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConversationDefaults {
    pub model: String,
    pub system_prompt: Option<String>,
}

impl Default for ConversationDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            system_prompt: None,
        }
    }
}
