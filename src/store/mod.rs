//! Durable, version-scoped metadata storage
//!
//! One SQLite database per cache directory holds the registry tables
//! (targets, global versions, target links), the version-scoped schema
//! tables, an FTS5 search index and the label table.
//!
//! # Modules
//!
//! - [`schema`]: Table definitions and migrations
//! - [`fts`]: FTS5 search index setup and maintenance
//! - [`entities`]: Data entity, public entity and enumeration reads/writes
//! - [`labels`]: Label rows with TTL metadata
//! - [`stats`]: Row counts and file size

pub mod entities;
pub mod fts;
pub mod labels;
pub(crate) mod schema;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::fts::SearchIndex;
use crate::store::schema::{MIGRATIONS, REGISTRY_TABLES, SCHEMA_TABLES};

pub use entities::{DataEntityFilter, NamePattern, SearchHit, SearchKind};
pub use stats::{StoreStatistics, VersionCounts};

pub struct MetadataStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    search_index: SearchIndex,
}

impl MetadataStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening metadata database at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn, Some(db_path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        debug!("Database connection established");

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            search_index: SearchIndex::default(),
        };

        store.create_schema()?;
        info!("Metadata store initialized");

        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub(crate) fn search_index(&self) -> &SearchIndex {
        &self.search_index
    }

    /// Drop and recreate the full-text index and its triggers from the
    /// schema tables
    pub fn rebuild_search_index(&self) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        self.search_index.rebuild(&conn)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute_batch(REGISTRY_TABLES)?;
        conn.execute_batch(SCHEMA_TABLES)?;

        Self::apply_migrations(&conn)?;

        // A missing FTS5 module leaves search on the pattern fallback
        if let Err(e) = self.search_index.ensure_setup(&conn) {
            warn!("Full-text index unavailable, search falls back to patterns: {}", e);
        }

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    match conn.execute(sql, []) {
                        Ok(_) => {}
                        Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                            if msg.contains("duplicate column name") =>
                        {
                            debug!("Column already exists, skipping: {}", sql);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }
}

/// Current timestamp in milliseconds since UNIX epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn ms_to_datetime(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::MetadataStore;

    /// Store with one registered global version, returned as (store, version_id)
    pub fn store_with_version() -> (MetadataStore, i64) {
        let store = MetadataStore::open_in_memory().unwrap();
        let version_id = insert_version(&store, "fingerprint-1");
        (store, version_id)
    }

    pub fn insert_version(store: &MetadataStore, fingerprint: &str) -> i64 {
        let conn = store.lock_conn().unwrap();
        conn.execute(
            "INSERT INTO global_versions (fingerprint, modules_json, module_count, first_seen_at)
             VALUES (?1, '[]', 0, 0)",
            [fingerprint],
        )
        .unwrap();
        conn.last_insert_rowid()
    }
}
