//! Private SQLite storage for stateful tools.
//!
//! Each tool owns one directory and one database file, both named after the
//! tool: `<root>/<tool>/<tool>.db`. The connection is opened lazily, switched
//! to WAL journaling and migrated with the tool's idempotent schema.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// A tool's private database.
pub struct ToolDb {
    name: String,
    root: PathBuf,
    schema: String,
    conn: Mutex<Option<Connection>>,
}

impl ToolDb {
    /// Describe the database for `name` under `root`. Nothing touches disk
    /// until [`ToolDb::init`] or the first [`ToolDb::db`] call.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            schema: schema.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tool's private directory.
    pub fn storage(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    /// The tool's database file.
    pub fn database_path(&self) -> PathBuf {
        self.storage().join(format!("{}.db", self.name))
    }

    /// Create the private directory if absent.
    pub fn ensure_storage(&self) -> StorageResult<PathBuf> {
        let dir = self.storage();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Open the database and apply the schema. Safe to call repeatedly.
    pub fn init(&self) -> StorageResult<()> {
        let mut guard = self.conn.lock().map_err(StorageError::poisoned)?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        Ok(())
    }

    /// Run `f` against the connection, opening it first if needed.
    pub fn db<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StorageResult<T> {
        let mut guard = self.conn.lock().map_err(StorageError::poisoned)?;
        let conn = match guard.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        let result = f(&conn);
        *guard = Some(conn);
        Ok(result?)
    }

    /// Apply `schema` to `conn`. The schema must be idempotent.
    pub fn run_migration(conn: &Connection, schema: &str) -> StorageResult<()> {
        conn.execute_batch(schema)?;
        Ok(())
    }

    /// Release the connection. A later call to [`ToolDb::db`] reopens it.
    pub fn close(&self) -> StorageResult<()> {
        let mut guard = self.conn.lock().map_err(StorageError::poisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
            debug!(tool = %self.name, "Closed tool database");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn open(&self) -> StorageResult<Connection> {
        self.ensure_storage()?;
        let path = self.database_path();
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::run_migration(&conn, &self.schema)?;
        debug!(tool = %self.name, path = %path.display(), "Opened tool database");
        Ok(conn)
    }
}

impl std::fmt::Debug for ToolDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDb")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Check whether a database file exists for `name` under `root`.
pub fn database_exists(root: &Path, name: &str) -> bool {
    root.join(name).join(format!("{name}.db")).exists()
}
