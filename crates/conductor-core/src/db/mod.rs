//! SQLite storage for jobs and prompts.
//!
//! One connection behind a mutex; async callers go through a blocking task.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Shared handle on the jobs/prompts database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database file, creating it and its directory on first use.
    pub fn open(db_path: &str) -> Result<Self, EngineError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| EngineError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("[Database] Opened {}", db_path);
        Ok(db)
    }

    /// Fresh schema in memory, used by the tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Run `f` on the locked connection; SQL errors become `EngineError::Database`.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| EngineError::Database(e.to_string()))
    }

    /// `with_conn` on the blocking pool.
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| EngineError::Database(format!("Task join error: {}", e)))?
    }

    /// Schema plus column migrations for databases created by older builds.
    fn initialize_tables(&self) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS jobs (
                    id                  TEXT PRIMARY KEY,
                    workflow_path       TEXT NOT NULL,
                    model               TEXT NOT NULL,
                    repository          TEXT NOT NULL,
                    status              TEXT NOT NULL DEFAULT 'LOCAL',
                    remote_agent_id     TEXT,
                    parent_job_id       TEXT,
                    bound_value         TEXT,
                    workflow_type       TEXT,
                    timeout_millis      INTEGER,
                    workflow_start_time INTEGER,
                    fallback_src        TEXT,
                    fallback_executed   INTEGER,
                    fan_out_result      TEXT,
                    created_at          INTEGER NOT NULL,
                    updated_at          INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
                CREATE INDEX IF NOT EXISTS idx_jobs_parent ON jobs(parent_job_id);

                CREATE TABLE IF NOT EXISTS prompts (
                    id          TEXT PRIMARY KEY,
                    job_id      TEXT NOT NULL,
                    src         TEXT NOT NULL,
                    position    INTEGER NOT NULL DEFAULT 0,
                    status      TEXT NOT NULL DEFAULT 'UNKNOWN',
                    created_at  INTEGER NOT NULL,
                    updated_at  INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_prompts_job ON prompts(job_id);
                ",
            )
        })?;
        self.run_migrations()
    }

    /// Columns added after the first schema.
    fn run_migrations(&self) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            // Fan-out children remember which branch they run (ignore error if already present)
            let _ = conn.execute("ALTER TABLE jobs ADD COLUMN branch_index INTEGER", []);
            Ok(())
        })
    }
}
