//! Storage configuration and path management for Stroop Locker.
//!
//! Every file the locker touches is resolved through [`StorageConfig`], so
//! tests can point the whole system at a temporary directory with
//! [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".stroop-locker";

/// Central configuration for all Stroop Locker storage paths.
///
/// Production code uses `StorageConfig::default()` which points to
/// `~/.stroop-locker/`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self::for_home(&home)
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolves the root under an explicit home directory.
    pub fn for_home(home: &Path) -> Self {
        Self {
            root: home.join(ROOT_DIR_NAME),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// SQLite database holding locked apps and attempt statistics.
    pub fn database_file(&self) -> PathBuf {
        self.root.join("daemon").join("locker.db")
    }

    /// User preferences (timeouts, rounds, master switch).
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Unix socket the daemon listens on.
    pub fn socket_file(&self) -> PathBuf {
        self.root.join("lockerd.sock")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
