//! SQLite persistence for stroop-lockerd.
//!
//! Two small tables: the locked-app set and a single row of attempt counters.
//! Every operation opens its own connection so handler threads never share one.

use locker_core::{AttemptResult, ChallengeStats, LockedAppStore, LockerError};
use rusqlite::{params, Connection, OpenFlags};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn insert_locked(&self, package_name: &str) -> Result<bool, String> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "INSERT INTO locked_apps (package_name) VALUES (?1) \
                     ON CONFLICT(package_name) DO NOTHING",
                    params![package_name],
                )
                .map_err(|err| format!("Failed to insert locked app: {}", err))?;
            Ok(changed > 0)
        })
    }

    pub fn delete_locked(&self, package_name: &str) -> Result<bool, String> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM locked_apps WHERE package_name = ?1",
                    params![package_name],
                )
                .map_err(|err| format!("Failed to delete locked app: {}", err))?;
            Ok(changed > 0)
        })
    }

    pub fn list_locked(&self) -> Result<Vec<String>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT package_name FROM locked_apps ORDER BY package_name ASC")
                .map_err(|err| format!("Failed to prepare locked apps query: {}", err))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| format!("Failed to read locked app rows: {}", err))?;

            let mut packages = Vec::new();
            for row in rows {
                packages.push(row.map_err(|err| format!("Failed to decode locked app row: {}", err))?);
            }
            Ok(packages)
        })
    }

    pub fn load_stats(&self) -> Result<ChallengeStats, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT successful, unsuccessful, timed_out FROM challenge_stats WHERE id = 1",
                [],
                |row| {
                    Ok(ChallengeStats {
                        successful: row.get::<_, i64>(0)?.max(0) as u64,
                        unsuccessful: row.get::<_, i64>(1)?.max(0) as u64,
                        timed_out: row.get::<_, i64>(2)?.max(0) as u64,
                    })
                },
            )
            .map_err(|err| format!("Failed to load challenge stats: {}", err))
        })
    }

    pub fn record_attempt(&self, result: AttemptResult) -> Result<(), String> {
        let column = match result {
            AttemptResult::Success => "successful",
            AttemptResult::Failure => "unsuccessful",
            AttemptResult::Timeout => "timed_out",
        };
        self.with_connection(|conn| {
            conn.execute(
                &format!(
                    "UPDATE challenge_stats SET {column} = {column} + 1, updated_at = ?1 WHERE id = 1"
                ),
                params![chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|err| format!("Failed to record attempt: {}", err))?;
            Ok(())
        })
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS locked_apps (
                    package_name TEXT PRIMARY KEY
                 );
                 CREATE TABLE IF NOT EXISTS challenge_stats (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    successful INTEGER NOT NULL DEFAULT 0,
                    unsuccessful INTEGER NOT NULL DEFAULT 0,
                    timed_out INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT
                 );
                 INSERT INTO challenge_stats (id) VALUES (1) ON CONFLICT(id) DO NOTHING;
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create daemon data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}

impl LockedAppStore for Db {
    fn insert_if_absent(&self, package_name: &str) -> locker_core::Result<bool> {
        self.insert_locked(package_name)
            .map_err(|err| LockerError::storage("insert locked app", err))
    }

    fn delete(&self, package_name: &str) -> locker_core::Result<bool> {
        self.delete_locked(package_name)
            .map_err(|err| LockerError::storage("delete locked app", err))
    }

    fn list_all(&self) -> locker_core::Result<Vec<String>> {
        self.list_locked()
            .map_err(|err| LockerError::storage("list locked apps", err))
    }
}
