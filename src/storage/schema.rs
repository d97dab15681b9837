//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Wiki-Sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sync runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    summary TEXT
);

-- Key-value parameters (checkpoint state lives here)
CREATE TABLE IF NOT EXISTS parameters (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Searchable documents, one row per page
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    collection_key TEXT NOT NULL,
    page_id TEXT NOT NULL,
    title TEXT NOT NULL,
    version INTEGER NOT NULL,
    body TEXT NOT NULL,
    metadata TEXT NOT NULL,
    status TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_key);
CREATE INDEX IF NOT EXISTS idx_documents_page ON documents(page_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
