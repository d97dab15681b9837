//! SQLite storage implementation
//!
//! One database file backs the parameter store (checkpoint state), the local
//! document index, and the run history.

use crate::model::{DocumentMetadata, IngestStatus, SyncOutcome, TransformedDocument};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DocumentStore, ParameterStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, StoredDocument};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    // ===== Run Management =====

    /// Records the start of a run and returns its id
    pub fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Marks a run finished with its final status and JSON summary
    pub fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        summary: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, summary = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, summary, run_id],
        )?;
        Ok(())
    }

    /// Returns the most recent runs, newest first
    pub fn latest_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, summary
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                    summary: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    // ===== Document Queries =====

    /// Looks up a document by id
    pub fn get_document(&self, id: &str) -> StorageResult<Option<StoredDocument>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, body, metadata, status, updated_at FROM documents WHERE id = ?1",
                params![id],
                read_document_row,
            )
            .optional()?;

        row.map(into_stored_document).transpose()
    }

    /// Returns documents whose title or body contains `query`
    pub fn search(&self, query: &str, limit: usize) -> StorageResult<Vec<StoredDocument>> {
        let pattern = format!("%{}%", escape_like(query));
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, body, metadata, status, updated_at FROM documents
             WHERE title LIKE ?1 ESCAPE '\\' OR body LIKE ?1 ESCAPE '\\'
             ORDER BY title, id LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![pattern, limit as i64], read_document_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_stored_document).collect()
    }

    /// Counts documents, optionally restricted to one collection
    pub fn count_documents(&self, collection_key: Option<&str>) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = match collection_key {
            Some(key) => conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection_key = ?1",
                params![key],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }
}

type DocumentRow = (String, String, String, String, String);

fn read_document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_stored_document(row: DocumentRow) -> StorageResult<StoredDocument> {
    let (id, body, metadata, status, updated_at) = row;
    let metadata: DocumentMetadata = serde_json::from_str(&metadata)?;
    let status = IngestStatus::from_db_string(&status)
        .ok_or_else(|| StorageError::Serialization(format!("unknown status '{}'", status)))?;

    Ok(StoredDocument {
        id,
        body,
        metadata,
        status,
        updated_at,
    })
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl ParameterStore for SqliteStorage {
    async fn get_parameter(&self, name: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM parameters WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn put_parameter(&self, name: &str, value: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO parameters (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![name, value, now],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStorage {
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut outcomes = Vec::with_capacity(documents.len());

        for doc in documents {
            if doc.id.is_empty() {
                outcomes.push(SyncOutcome::failed("", "empty document identifier"));
                continue;
            }

            let metadata = serde_json::to_string(&doc.metadata)?;
            tx.execute(
                "INSERT INTO documents
                    (id, collection_key, page_id, title, version, body, metadata, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    collection_key = excluded.collection_key,
                    page_id = excluded.page_id,
                    title = excluded.title,
                    version = excluded.version,
                    body = excluded.body,
                    metadata = excluded.metadata,
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![
                    doc.id,
                    doc.metadata.collection_key,
                    doc.metadata.page_id,
                    doc.metadata.title,
                    doc.metadata.version as i64,
                    doc.body,
                    metadata,
                    IngestStatus::Indexed.to_db_string(),
                    now,
                ],
            )?;
            outcomes.push(SyncOutcome::new(doc.id.clone(), IngestStatus::Indexed));
        }

        tx.commit()?;
        Ok(outcomes)
    }
}
