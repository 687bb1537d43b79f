use crate::domain::model::{Agent, AgentCredential, AssignmentEvent};
use crate::domain::ports::AgentStore;
use crate::utils::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    handle TEXT UNIQUE NOT NULL,
    session_handle TEXT,
    assignment_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_agents_load ON agents(assignment_count, id);
CREATE TABLE IF NOT EXISTS agent_credentials (
    handle TEXT PRIMARY KEY REFERENCES agents(handle) ON DELETE CASCADE,
    api_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Busy and locked databases are contention, everything else is a storage fault.
fn storage_error(err: rusqlite::Error) -> DeskError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            DeskError::ContentionError {
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            }
        }
        _ => DeskError::StorageError(err),
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub pool_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            pool_size: 4,
        }
    }
}

/// Keeps up to `max_idle` open connections to one database file.
pub struct ConnectionPool {
    path: PathBuf,
    busy_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    pub fn new(path: impl AsRef<Path>, options: &StoreOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: options.busy_timeout,
            max_idle: options.pool_size,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> Result<PooledConnection<'_>> {
        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let conn = match reused {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(storage_error)?;
        conn.busy_timeout(self.busy_timeout).map_err(storage_error)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(storage_error)?;
        tracing::debug!("Opened SQLite connection to {}", self.path.display());
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        // A connection left inside a transaction is discarded, not reused.
        if !conn.is_autocommit() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(conn);
            }
        }
    }
}

/// Returns its connection to the pool on drop, on every exit path.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Agent table persisted in SQLite.
///
/// `pick_and_increment` runs inside a `BEGIN IMMEDIATE` transaction, so the
/// read of the minimum and the increment hold the write lock together.
/// Separate processes sharing the file are serialized the same way.
pub struct SqliteAgentStore {
    pool: ConnectionPool,
}

impl SqliteAgentStore {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = ConnectionPool::new(path, &options);
        {
            let conn = pool.get()?;
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(storage_error)?;
            conn.execute_batch(SCHEMA).map_err(storage_error)?;
            tracing::info!(
                "📦 Agent store ready at {} (journal mode: {})",
                path.display(),
                mode
            );
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl AgentStore for SqliteAgentStore {
    fn add(&self, handle: &str, session_handle: Option<&str>) -> Result<bool> {
        let conn = self.pool.get()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO agents (handle, session_handle) VALUES (?1, ?2)",
                params![handle, session_handle],
            )
            .map_err(storage_error)?;
        Ok(inserted == 1)
    }

    fn remove(&self, handle: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn
            .execute("DELETE FROM agents WHERE handle = ?1", params![handle])
            .map_err(storage_error)?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare_cached("SELECT handle FROM agents ORDER BY id")
            .map_err(storage_error)?;
        let handles = stmt
            .query_map([], |row| row.get(0))
            .map_err(storage_error)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(storage_error)?;
        Ok(handles)
    }

    fn agents(&self) -> Result<Vec<Agent>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT handle, session_handle, assignment_count FROM agents ORDER BY id",
            )
            .map_err(storage_error)?;
        let agents = stmt
            .query_map([], |row| {
                let count: i64 = row.get(2)?;
                Ok(Agent {
                    handle: row.get(0)?,
                    session_handle: row.get(1)?,
                    assignment_count: count.max(0) as u64,
                })
            })
            .map_err(storage_error)?
            .collect::<rusqlite::Result<Vec<Agent>>>()
            .map_err(storage_error)?;
        Ok(agents)
    }

    fn pick_and_increment(&self) -> Result<Option<AssignmentEvent>> {
        let mut conn = self.pool.get()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_error)?;

        let picked: Option<(i64, String, i64)> = tx
            .query_row(
                "SELECT id, handle, assignment_count FROM agents
                 ORDER BY assignment_count ASC, id ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(storage_error)?;

        let Some((id, handle, count)) = picked else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE agents SET assignment_count = assignment_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;

        Ok(Some(AssignmentEvent {
            handle,
            assignment_count: count.max(0) as u64 + 1,
        }))
    }

    fn set_credential(&self, handle: &str, api_key: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let written = conn
            .execute(
                "INSERT INTO agent_credentials (handle, api_key, created_at)
                 SELECT handle, ?2, ?3 FROM agents WHERE handle = ?1
                 ON CONFLICT(handle) DO UPDATE
                 SET api_key = excluded.api_key, created_at = excluded.created_at",
                params![handle, api_key, Utc::now().to_rfc3339()],
            )
            .map_err(storage_error)?;
        Ok(written > 0)
    }

    fn credential(&self, handle: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT api_key FROM agent_credentials WHERE handle = ?1",
            params![handle],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_error)
    }

    fn remove_credential(&self, handle: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn
            .execute(
                "DELETE FROM agent_credentials WHERE handle = ?1",
                params![handle],
            )
            .map_err(storage_error)?;
        Ok(removed > 0)
    }

    fn credentials(&self) -> Result<Vec<AgentCredential>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.handle, c.api_key, c.created_at
                 FROM agents a JOIN agent_credentials c ON a.handle = c.handle
                 ORDER BY a.id",
            )
            .map_err(storage_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(storage_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)?;

        rows.into_iter()
            .map(|(handle, api_key, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| {
                        DeskError::StorageError(rusqlite::Error::FromSqlConversionFailure(
                            2,
                            Type::Text,
                            Box::new(e),
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(AgentCredential {
                    handle,
                    api_key,
                    created_at,
                })
            })
            .collect()
    }
}
