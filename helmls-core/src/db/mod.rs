//! SQLite database layer for helm-ls.
//!
//! Provides persistent storage for:
//! - Provisioning settings
//! - Process-wide state that outlives a single activation (managed
//!   configuration records)

mod migrations;
mod state;

pub use state::{MemoryState, StateStore};

use anyhow::Context;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Database connection wrapper.
///
/// Provides a high-level API for interacting with the SQLite database.
/// Automatically handles connection setup, migrations, and file permissions.
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Default path: `~/.local/share/helm-ls/state.db`
    pub fn open() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open the database at a specific path.
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 0600 on Unix.
    pub fn open_at(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(path = %path.display(), error = %e, "Failed to set database file permissions");
            }
        }

        // Two editor windows may share the file.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Get the default database path.
    ///
    /// Returns `~/.local/share/helm-ls/state.db` (or platform equivalent).
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("helm-ls").join("state.db"))
    }

    /// Run database migrations.
    ///
    /// Safe to call multiple times - migrations are tracked and only run once.
    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        migrations::run_migrations(&conn)?;
        Ok(())
    }

    /// Get the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }

    // =========================================================================
    // Settings Storage
    // =========================================================================

    /// Save a setting to the database (upsert).
    pub fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, unixepoch())
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value],
        )?;
        Ok(())
    }

    /// Get a setting from the database.
    ///
    /// Returns `None` if the setting doesn't exist.
    pub fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
        let result = stmt.query_row([key], |row| row.get(0));
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a setting from the database.
    ///
    /// No-op if the key doesn't exist.
    pub fn delete_setting(&self, key: &str) -> anyhow::Result<()> {
        self.conn()?
            .execute("DELETE FROM settings WHERE key = ?", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // -------------------------------------------------------------------------
    // Test Helpers
    // -------------------------------------------------------------------------

    fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open_at(db_path).unwrap();
        db.migrate().unwrap();
        (temp_dir, db)
    }

    // -------------------------------------------------------------------------
    // Database Opening/Creation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_open_at_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let nested_path = tmp.path().join("deep").join("nested").join("state.db");

        assert!(!nested_path.parent().unwrap().exists());

        let _db = Database::open_at(nested_path.clone()).unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_open_at_reuses_existing_database() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.db");

        {
            let db = Database::open_at(path.clone()).unwrap();
            db.migrate().unwrap();
            db.set_setting("provision_settings", "{}").unwrap();
        }

        {
            let db = Database::open_at(path).unwrap();
            db.migrate().unwrap();
            let value = db.get_setting("provision_settings").unwrap();
            assert_eq!(value, Some("{}".to_string()));
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, db) = setup_test_db();

        db.migrate().unwrap();
        db.set_setting("provision_settings", "{}").unwrap();
        db.migrate().unwrap();

        assert_eq!(
            db.get_setting("provision_settings").unwrap(),
            Some("{}".to_string())
        );
    }

    #[test]
    fn test_default_path_returns_valid_path() {
        if let Ok(path) = Database::default_path() {
            assert!(path.ends_with("helm-ls/state.db"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_open_at_sets_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secure.db");

        let _db = Database::open_at(path.clone()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "Database should have 0600 permissions");
    }

    // -------------------------------------------------------------------------
    // Settings Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_set_setting_upserts_existing() {
        let (_temp, db) = setup_test_db();

        db.set_setting("helm-ls.yamlls.path.managed", "false").unwrap();
        db.set_setting("helm-ls.yamlls.path.managed", "true").unwrap();

        let value = db.get_setting("helm-ls.yamlls.path.managed").unwrap();
        assert_eq!(value, Some("true".to_string()));
    }

    #[test]
    fn test_get_setting_returns_none_for_missing() {
        let (_temp, db) = setup_test_db();
        assert!(db.get_setting("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_delete_setting_removes_setting() {
        let (_temp, db) = setup_test_db();

        db.set_setting("key", "value").unwrap();
        db.delete_setting("key").unwrap();
        assert!(db.get_setting("key").unwrap().is_none());

        // Deleting again is fine.
        db.delete_setting("key").unwrap();
    }

    #[test]
    fn test_setting_with_json_value() {
        let (_temp, db) = setup_test_db();

        let json_value = r#"{"managed": true, "lastKnownPath": ["node", "/x.js"]}"#;
        db.set_setting("state", json_value).unwrap();

        assert_eq!(db.get_setting("state").unwrap(), Some(json_value.to_string()));
    }
}
