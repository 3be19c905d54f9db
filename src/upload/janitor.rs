//! Janitor: periodic sweep reclaiming expired sessions and stale scratch
//! files.
//!
//! Spawned once at startup as a detached background task, the same way
//! this codebase already runs its periodic cleanup loop via
//! `tokio::time::interval` rather than an external scheduler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::MetadataStore;
use crate::upload::types::SessionStatus;
use crate::upload::writer::ChunkWriter;

pub struct Janitor {
    store: Arc<dyn MetadataStore>,
    writer: ChunkWriter,
    scratch_dir: PathBuf,
    session_retention_hours: i64,
    scratch_retention_hours: i64,
    interval: Duration,
}

impl Janitor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        writer: ChunkWriter,
        scratch_dir: PathBuf,
        session_retention_hours: i64,
        scratch_retention_hours: i64,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            writer,
            scratch_dir,
            session_retention_hours,
            scratch_retention_hours,
            interval,
        }
    }

    /// Spawn the periodic sweep loop. Returns the task handle so callers
    /// can abort it on shutdown if they choose to.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "janitor sweep failed");
                }
            }
        })
    }

    /// One sweep: prune expired `UPLOADING`/`FAILED` sessions (deleting
    /// their target file first, then their records — so a crash between
    /// the two only ever leaves an orphan record, reclaimed by the next
    /// sweep, never orphan bytes referenced by a live record), then remove
    /// any scratch file older than the scratch horizon.
    pub async fn sweep(&self) -> Result<(), sqlx::Error> {
        let session_cutoff = (Utc::now() - chrono::Duration::hours(self.session_retention_hours)).to_rfc3339();
        let expired = self
            .store
            .list_sessions_where(&[SessionStatus::Uploading, SessionStatus::Failed], &session_cutoff)
            .await?;

        for id in &expired {
            if let Err(e) = self.writer.remove_target(id).await {
                warn!(upload_id = %id, error = %e, "failed to remove target file for expired session");
            }
        }

        let reclaimed_sessions = self
            .store
            .delete_sessions_where(&[SessionStatus::Uploading, SessionStatus::Failed], &session_cutoff)
            .await?;

        let scratch_removed = self.sweep_stale_scratch_files().await;

        if !reclaimed_sessions.is_empty() || scratch_removed > 0 {
            info!(
                sessions_deleted = reclaimed_sessions.len(),
                scratch_files_deleted = scratch_removed,
                "janitor sweep complete",
            );
        }

        Ok(())
    }

    /// Scratch files are request-scoped spools with no durable link back to
    /// any session row, so the only safe cleanup rule is age: anything past
    /// `scratch_retention_hours` is presumed abandoned (its owning request
    /// either finished and deleted it already, or died before it could).
    async fn sweep_stale_scratch_files(&self) -> usize {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.scratch_dir).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, dir = ?self.scratch_dir, "failed to read scratch dir during janitor sweep");
                return 0;
            }
        };

        let cutoff = Duration::from_secs((self.scratch_retention_hours.max(0) as u64) * 3600);

        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_stale = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified.elapsed().map(|age| age > cutoff).unwrap_or(false),
                Err(_) => false,
            };
            if !is_stale {
                continue;
            }

            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::upload::types::UploadSession;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    async fn test_janitor(
        upload_dir: &TempDir,
        scratch_dir: &TempDir,
    ) -> (Janitor, Arc<dyn MetadataStore>, ChunkWriter) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::initialize_schema(&pool).await.unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(pool));
        let writer = ChunkWriter::new(upload_dir.path().to_path_buf());

        let janitor = Janitor::new(
            store.clone(),
            writer.clone(),
            scratch_dir.path().to_path_buf(),
            24,
            1,
            Duration::from_secs(3600),
        );
        (janitor, store, writer)
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_uploading_session_and_its_target_file() {
        let upload_dir = TempDir::new().unwrap();
        let scratch_dir = TempDir::new().unwrap();
        let (janitor, store, writer) = test_janitor(&upload_dir, &scratch_dir).await;

        let mut session = UploadSession::new("expired".into(), "f.bin".into(), 4, 4);
        session.created_at = (Utc::now() - chrono::Duration::hours(48)).to_rfc3339();
        store.put_session_if_absent(session).await.unwrap();
        tokio::fs::write(writer.target_path("expired"), b"data").await.unwrap();

        janitor.sweep().await.unwrap();

        assert!(store.get_session("expired").await.unwrap().is_none());
        assert!(!writer.target_path("expired").exists());
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_sessions_untouched() {
        let upload_dir = TempDir::new().unwrap();
        let scratch_dir = TempDir::new().unwrap();
        let (janitor, store, writer) = test_janitor(&upload_dir, &scratch_dir).await;

        let session = UploadSession::new("fresh".into(), "f.bin".into(), 4, 4);
        store.put_session_if_absent(session).await.unwrap();
        tokio::fs::write(writer.target_path("fresh"), b"data").await.unwrap();

        janitor.sweep().await.unwrap();

        assert!(store.get_session("fresh").await.unwrap().is_some());
        assert!(writer.target_path("fresh").exists());
    }

    #[tokio::test]
    async fn sweep_never_touches_completed_or_processing_sessions() {
        let upload_dir = TempDir::new().unwrap();
        let scratch_dir = TempDir::new().unwrap();
        let (janitor, store, writer) = test_janitor(&upload_dir, &scratch_dir).await;

        let mut completed = UploadSession::new("done".into(), "f.bin".into(), 4, 4);
        completed.created_at = (Utc::now() - chrono::Duration::hours(48)).to_rfc3339();
        completed.status = SessionStatus::Completed;
        completed.final_hash = Some("deadbeef".into());
        store.put_session_if_absent(completed).await.unwrap();
        tokio::fs::write(writer.target_path("done"), b"data").await.unwrap();

        janitor.sweep().await.unwrap();

        assert!(store.get_session("done").await.unwrap().is_some());
        assert!(writer.target_path("done").exists());
    }

    #[tokio::test]
    async fn sweep_removes_stale_scratch_files_regardless_of_session_state() {
        let upload_dir = TempDir::new().unwrap();
        let scratch_dir = TempDir::new().unwrap();
        let (janitor, _store, _writer) = test_janitor(&upload_dir, &scratch_dir).await;

        let stale = scratch_dir.path().join("orphan-request-id");
        tokio::fs::write(&stale, b"partial").await.unwrap();

        let old_time = std::time::SystemTime::now() - Duration::from_secs(7200);
        let file = std::fs::File::options().write(true).open(&stale).unwrap();
        file.set_modified(old_time).ok();

        janitor.sweep().await.unwrap();

        assert!(!stale.exists());
    }
}
