//! Error types for locker-core operations.
//!
//! Nothing here is fatal to the host process. Callers turn every variant into
//! "deny access to the locked app" when a decision has to be made.

use std::path::PathBuf;

/// All errors that can occur in locker-core operations.
#[derive(Debug, thiserror::Error)]
pub enum LockerError {
    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Locked app storage failed: {context}: {details}")]
    Storage { context: String, details: String },

    #[error("Invalid package name: {0:?}")]
    InvalidPackage(String),

    // ─────────────────────────────────────────────────────────────────────
    // Challenge Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid challenge state: {0}")]
    InvalidState(String),

    #[error("Challenge already in progress for {active}")]
    ChallengeBusy { active: String },

    #[error("Challenge for {package} expired")]
    TimeoutExpired { package: String },

    // ─────────────────────────────────────────────────────────────────────
    // Settings Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Settings file malformed: {path}: {details}")]
    SettingsMalformed { path: PathBuf, details: String },

    #[error("Invalid setting {field}: {reason}")]
    SettingsInvalid { field: &'static str, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LockerError {
    pub fn storage(context: impl Into<String>, details: impl ToString) -> Self {
        LockerError::Storage {
            context: context.into(),
            details: details.to_string(),
        }
    }

    /// Short machine-readable code, used for IPC error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            LockerError::Storage { .. } => "storage_error",
            LockerError::InvalidPackage(_) => "invalid_package",
            LockerError::InvalidState(_) => "invalid_state",
            LockerError::ChallengeBusy { .. } => "challenge_busy",
            LockerError::TimeoutExpired { .. } => "timeout_expired",
            LockerError::SettingsMalformed { .. } => "settings_malformed",
            LockerError::SettingsInvalid { .. } => "settings_invalid",
            LockerError::Io { .. } => "io_error",
            LockerError::Json { .. } => "json_error",
        }
    }
}

/// Convenience type alias for Results using LockerError.
pub type Result<T> = std::result::Result<T, LockerError>;

impl From<LockerError> for String {
    fn from(err: LockerError) -> String {
        err.to_string()
    }
}
