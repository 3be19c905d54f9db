//! Metadata Store: the durable, linearizable-per-key source of truth for
//! upload sessions and chunk receipts.
//!
//! The compare-and-set semantics required for exactly-once finalization
//! (`update_session_status`) are implemented as a single `UPDATE ... WHERE`
//! statement gated on the expected prior status, with `rows_affected()`
//! standing in for the CAS's boolean result — SQLite serializes writers on
//! the same row, so no separate locking layer is needed.
//!
//! Timestamps are stored as RFC3339 text rather than through sqlx's chrono
//! integration, matching how this codebase already keeps its other
//! `created_at`/`updated_at` columns.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::upload::types::{ChunkRecord, ChunkStatus, SessionStatus, UploadSession};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new session iff no row with this id exists. Returns the row
    /// that is now current for this id: the one just inserted, or the
    /// pre-existing one on a racing/duplicate `init`.
    async fn put_session_if_absent(&self, session: UploadSession) -> Result<UploadSession>;

    async fn get_session(&self, id: &str) -> Result<Option<UploadSession>>;

    /// Atomically swap `id`'s status from `expected` to `next`, also bumping
    /// `updated_at` and (when provided) setting `final_hash`. Returns `true`
    /// iff this call performed the swap.
    async fn update_session_status(
        &self,
        id: &str,
        expected: SessionStatus,
        next: SessionStatus,
        final_hash: Option<&str>,
    ) -> Result<bool>;

    /// Insert the full set of `Pending` chunk rows for a session iff none
    /// exist yet for it.
    async fn put_chunks_if_absent(&self, upload_id: &str, total_chunks: u64) -> Result<()>;

    /// Mark one chunk `Received`. Idempotent: re-marking an already-received
    /// chunk is a harmless no-op.
    async fn set_chunk_received(&self, upload_id: &str, chunk_index: u64) -> Result<()>;

    async fn list_chunks(&self, upload_id: &str) -> Result<Vec<ChunkRecord>>;

    async fn count_received(&self, upload_id: &str) -> Result<u64>;

    /// Delete every session (and its chunk rows) whose status is in
    /// `statuses` and whose `created_at` is older than `older_than`. Returns
    /// the deleted ids, for the janitor's scratch-file cleanup pass.
    async fn delete_sessions_where(
        &self,
        statuses: &[SessionStatus],
        older_than: &str,
    ) -> Result<Vec<String>>;

    /// List ids of sessions matching `statuses` older than `older_than`,
    /// without deleting them.
    async fn list_sessions_where(&self, statuses: &[SessionStatus], older_than: &str) -> Result<Vec<String>>;

    /// Record the Container Peeker's result against a session, as an
    /// informational field. Best-effort: callers ignore failures here (a
    /// peek failure must never fail the upload).
    async fn set_peek_entries(&self, upload_id: &str, entries: &[String]) -> Result<()>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn put_session_if_absent(&self, session: UploadSession) -> Result<UploadSession> {
        sqlx::query(
            r#"
            INSERT INTO upload_sessions
                (id, filename, total_size, total_chunks, status, final_hash, peek_entries, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&session.id)
        .bind(&session.filename)
        .bind(session.total_size as i64)
        .bind(session.total_chunks as i64)
        .bind(session.status.as_str())
        .bind(&session.final_hash)
        .bind(None::<String>)
        .bind(&session.created_at)
        .bind(&session.updated_at)
        .execute(&self.pool)
        .await?;

        let row = self
            .get_session(&session.id)
            .await?
            .expect("row was just inserted or already present");
        Ok(row)
    }

    async fn get_session(&self, id: &str) -> Result<Option<UploadSession>> {
        let row = sqlx::query_as::<_, UploadSession>(
            r#"
            SELECT id, filename, total_size, total_chunks, status, final_hash, peek_entries, created_at, updated_at
            FROM upload_sessions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_peek_entries(&self, upload_id: &str, entries: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(entries).map_err(|e| {
            crate::error::AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        sqlx::query("UPDATE upload_sessions SET peek_entries = ? WHERE id = ?")
            .bind(encoded)
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_session_status(
        &self,
        id: &str,
        expected: SessionStatus,
        next: SessionStatus,
        final_hash: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET status = ?, final_hash = COALESCE(?, final_hash), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next.as_str())
        .bind(final_hash)
        .bind(now)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn put_chunks_if_absent(&self, upload_id: &str, total_chunks: u64) -> Result<()> {
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_chunks WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_one(&self.pool)
                .await?;
        if existing > 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for index in 0..total_chunks {
            sqlx::query(
                r#"
                INSERT INTO upload_chunks (upload_id, chunk_index, status, received_at)
                VALUES (?, ?, 'PENDING', NULL)
                ON CONFLICT(upload_id, chunk_index) DO NOTHING
                "#,
            )
            .bind(upload_id)
            .bind(index as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_chunk_received(&self, upload_id: &str, chunk_index: u64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_chunks SET status = 'RECEIVED', received_at = ?
            WHERE upload_id = ? AND chunk_index = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(upload_id)
        .bind(chunk_index as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chunks(&self, upload_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT upload_id, chunk_index, status, received_at
            FROM upload_chunks WHERE upload_id = ? ORDER BY chunk_index ASC
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_received(&self, upload_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_chunks WHERE upload_id = ? AND status = 'RECEIVED'",
        )
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn delete_sessions_where(&self, statuses: &[SessionStatus], older_than: &str) -> Result<Vec<String>> {
        let ids = self.list_sessions_where(statuses, older_than).await?;
        if ids.is_empty() {
            return Ok(ids);
        }

        let mut tx = self.pool.begin().await?;
        for id in &ids {
            sqlx::query("DELETE FROM upload_chunks WHERE upload_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM upload_sessions WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn list_sessions_where(&self, statuses: &[SessionStatus], older_than: &str) -> Result<Vec<String>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT id FROM upload_sessions WHERE status IN ({placeholders}) AND created_at < ?"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        query = query.bind(older_than);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }
}
