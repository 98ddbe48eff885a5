//! User preferences: challenge timeout, session length, rounds, master switch.
//!
//! Stored as JSON at [`StorageConfig::settings_file`]. A missing file yields
//! defaults; a malformed or out-of-range file is an error so the daemon can
//! log it and fall back explicitly.

use fs_err as fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{LockerError, Result};
use crate::storage::StorageConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockerSettings {
    pub challenge_timeout_secs: u64,
    /// 0 keeps an unlocked app open until the user leaves it.
    pub session_duration_secs: u64,
    pub challenges_required: u32,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub theme: Theme,
    pub master_disable: bool,
}

impl Default for LockerSettings {
    fn default() -> Self {
        LockerSettings {
            challenge_timeout_secs: 30,
            session_duration_secs: 0,
            challenges_required: 1,
            sound_enabled: false,
            vibration_enabled: false,
            theme: Theme::System,
            master_disable: false,
        }
    }
}

impl LockerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.challenge_timeout_secs == 0 {
            return Err(LockerError::SettingsInvalid {
                field: "challenge_timeout_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.challenges_required == 0 {
            return Err(LockerError::SettingsInvalid {
                field: "challenges_required",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }
}

/// Loads settings, returning defaults if the file doesn't exist.
pub fn load_settings(storage: &StorageConfig) -> Result<LockerSettings> {
    load_settings_from(&storage.settings_file())
}

pub fn load_settings_from(path: &Path) -> Result<LockerSettings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LockerSettings::default())
        }
        Err(source) => {
            return Err(LockerError::Io {
                context: format!("reading {}", path.display()),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        tracing::warn!(path = %path.display(), "Empty settings file, using defaults");
        return Ok(LockerSettings::default());
    }

    let settings: LockerSettings =
        serde_json::from_str(&content).map_err(|e| LockerError::SettingsMalformed {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
    settings.validate()?;
    Ok(settings)
}

/// Validates and atomically writes settings (temp file + rename).
pub fn save_settings(storage: &StorageConfig, settings: &LockerSettings) -> Result<()> {
    settings.validate()?;
    let path = storage.settings_file();
    let parent_dir = path.parent().unwrap_or(storage.root());
    fs::create_dir_all(parent_dir).map_err(|source| LockerError::Io {
        context: format!("creating {}", parent_dir.display()),
        source,
    })?;

    let content = serde_json::to_string_pretty(settings).map_err(|source| LockerError::Json {
        context: "serializing settings".to_string(),
        source,
    })?;

    let io_err = |context: &str, source: std::io::Error| LockerError::Io {
        context: context.to_string(),
        source,
    };
    let mut temp_file =
        NamedTempFile::new_in(parent_dir).map_err(|e| io_err("creating temp settings file", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| io_err("writing temp settings file", e))?;
    temp_file
        .flush()
        .map_err(|e| io_err("flushing temp settings file", e))?;
    temp_file
        .persist(&path)
        .map_err(|e| io_err("persisting settings file", e.error))?;
    Ok(())
}
