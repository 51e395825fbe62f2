//! Local SQLite storage for application data.
//!
//! A small key/value store with the semantics of browser local storage:
//! string keys, string values, whole-value reads and writes. Saved connection
//! profiles live under a single key (see [`crate::services::profiles`]).
//!
//! # Data Directory Locations
//!
//! - **macOS**: `~/Library/Application Support/dev.picopg.picopg`
//! - **Windows**: `%APPDATA%\picopg`
//! - **Linux**: `~/.local/share/picopg`
//! - **Debug builds**: `./picopg_data` in current directory

use crate::error::PicoError;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// File name of the SQLite database inside the data directory.
const DB_FILE_NAME: &str = "picopg.db";

/// Get the default data directory for the application.
///
/// Debug builds use `./picopg_data` in the current directory.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./picopg_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| {
                #[cfg(target_os = "macos")]
                {
                    d.join("dev.picopg.picopg")
                }
                #[cfg(not(target_os = "macos"))]
                {
                    d.join("picopg")
                }
            })
            .unwrap_or_else(|| PathBuf::from("./picopg_data"))
    }
}

/// Initialize the data directory, creating it if needed.
pub fn init_data_dir(path: &Path) -> Result<(), PicoError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PicoError::storage(
                format!("Data path exists but is not a directory: {}", path.display()),
                Some("Select a different location or remove the existing file"),
            ));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        PicoError::storage(
            format!("Failed to create data directory '{}': {}", path.display(), e),
            Some("Check permissions or select a different location"),
        )
    })?;

    tracing::info!(path = %path.display(), "Created data directory");
    Ok(())
}

/// SQLite-backed key/value storage.
///
/// Thread-safe via internal Mutex.
pub struct LocalStorage {
    connection: Mutex<Connection>,
    data_dir: PathBuf,
}

impl LocalStorage {
    /// Open or create local storage in the given data directory.
    pub fn open(data_dir: PathBuf) -> Result<Self, PicoError> {
        init_data_dir(&data_dir)?;
        let db_path = data_dir.join(DB_FILE_NAME);

        let connection = Connection::open(&db_path).map_err(|e| {
            PicoError::storage(
                format!("Failed to open database '{}': {}", db_path.display(), e),
                Some("The database file may be corrupted. Try deleting it to start fresh."),
            )
        })?;
        Self::configure_connection(&connection)?;

        let storage = Self { connection: Mutex::new(connection), data_dir };
        storage.run_migrations()?;

        tracing::info!(path = %db_path.display(), "Local storage opened");
        Ok(storage)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, PicoError> {
        let connection = Connection::open_in_memory()?;
        let storage = Self { connection: Mutex::new(connection), data_dir: PathBuf::new() };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn configure_connection(conn: &Connection) -> Result<(), PicoError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| PicoError::storage(format!("Failed to configure database: {e}"), None))
    }

    fn run_migrations(&self) -> Result<(), PicoError> {
        const DOMAIN: &str = "core";
        let conn = self.connection.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                domain TEXT NOT NULL,
                step INTEGER NOT NULL,
                migration TEXT NOT NULL,
                PRIMARY KEY(domain, step)
            ) STRICT",
            [],
        )
        .map_err(|e| PicoError::storage(format!("Failed to create migrations table: {e}"), None))?;

        let current_step: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(step), 0) FROM migrations WHERE domain = ?",
                [DOMAIN],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_step < 1 {
            conn.execute_batch(
                "
                CREATE TABLE local_storage (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                ) STRICT;
                ",
            )
            .map_err(|e| PicoError::storage(format!("Migration 1 failed: {e}"), None))?;

            conn.execute(
                "INSERT INTO migrations (domain, step, migration) VALUES (?, 1, 'local_storage')",
                [DOMAIN],
            )
            .map_err(|e| PicoError::storage(format!("Failed to record migration: {e}"), None))?;

            tracing::info!("Applied migration 1: local_storage");
        }

        Ok(())
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Read the value stored under `key`.
    pub fn get_item(&self, key: &str) -> Result<Option<String>, PicoError> {
        let conn = self.connection.lock();
        conn.query_row("SELECT value FROM local_storage WHERE key = ?", [key], |row| row.get(0))
            .optional()
            .map_err(|e| PicoError::storage(format!("Failed to read '{key}': {e}"), None))
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), PicoError> {
        let conn = self.connection.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO local_storage (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, now],
        )
        .map_err(|e| PicoError::storage(format!("Failed to write '{key}': {e}"), None))?;

        tracing::trace!(key, bytes = value.len(), "Storage item written");
        Ok(())
    }

    /// Remove `key`. Removing a missing key is not an error.
    pub fn remove_item(&self, key: &str) -> Result<(), PicoError> {
        let conn = self.connection.lock();
        conn.execute("DELETE FROM local_storage WHERE key = ?", [key])
            .map_err(|e| PicoError::storage(format!("Failed to remove '{key}': {e}"), None))?;
        Ok(())
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Result<Vec<String>, PicoError> {
        let conn = self.connection.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM local_storage ORDER BY key")
            .map_err(|e| PicoError::storage(format!("Failed to prepare query: {e}"), None))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| PicoError::storage(format!("Failed to query keys: {e}"), None))?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(|e| PicoError::storage(format!("Failed to read keys: {e}"), None))
    }

    /// Remove every stored item.
    pub fn clear(&self) -> Result<(), PicoError> {
        let conn = self.connection.lock();
        conn.execute("DELETE FROM local_storage", [])
            .map_err(|e| PicoError::storage(format!("Failed to clear storage: {e}"), None))?;
        tracing::debug!("Local storage cleared");
        Ok(())
    }
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage").field("data_dir", &self.data_dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_get_remove() {
        let storage = LocalStorage::open_in_memory().unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v1").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v1"));

        storage.set_item("k", "v2").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v2"));

        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
        storage.remove_item("k").unwrap();
    }

    #[test]
    fn test_keys_and_clear() {
        let storage = LocalStorage::open_in_memory().unwrap();
        storage.set_item("b", "2").unwrap();
        storage.set_item("a", "1").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        storage.clear().unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_open() {
        let dir = tempdir().unwrap();
        {
            let storage = LocalStorage::open(dir.path().to_path_buf()).unwrap();
            storage.set_item("picopg_connections", "[]").unwrap();
        }
        let storage = LocalStorage::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.get_item("picopg_connections").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("picopg.db").exists());
    }

    #[test]
    fn test_init_data_dir_rejects_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(init_data_dir(&file).is_err());

        let nested = dir.path().join("a").join("b");
        init_data_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
