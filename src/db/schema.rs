//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_TABLES_SQL).execute(pool).await?;
    sqlx::query(SCHEMA_INDEXES_SQL).execute(pool).await?;
    Ok(())
}

const SCHEMA_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS upload_sessions (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    total_size INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    status TEXT NOT NULL,
    final_hash TEXT,
    peek_entries TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS upload_chunks (
    upload_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    status TEXT NOT NULL,
    received_at TEXT,
    PRIMARY KEY (upload_id, chunk_index)
);
"#;

const SCHEMA_INDEXES_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_upload_sessions_status_created
    ON upload_sessions(status, created_at);

CREATE INDEX IF NOT EXISTS idx_upload_chunks_upload_id
    ON upload_chunks(upload_id);
"#;
