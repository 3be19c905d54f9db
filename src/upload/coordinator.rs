//! Session Coordinator: ties the Metadata Store, Chunk Writer, Digest
//! Engine and Container Peeker together behind the three operations the
//! Request Surface calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::MetadataStore;
use crate::upload::container;
use crate::upload::digest;
use crate::upload::types::{
    expected_chunk_len, total_chunks_for, ChunkRecord, ChunkStatus, SessionStatus, UploadError,
    UploadSession,
};
use crate::upload::writer::ChunkWriter;

pub struct Coordinator {
    store: Arc<dyn MetadataStore>,
    writer: ChunkWriter,
    chunk_size: u64,
}

/// What `receive_chunk` actually did, so the Request Surface can pick the
/// right response message without re-deriving it from raw counts.
pub enum ReceiveOutcome {
    /// The chunk was new: written, recorded, and possibly the one that
    /// triggered finalization.
    Written { session: UploadSession, received: u64 },
    /// This chunk index was already `RECEIVED`; the payload was discarded.
    AlreadyReceived { session: UploadSession, received: u64 },
    /// The session had already left `UPLOADING` (finalized or failed) by
    /// the time this chunk arrived; the payload was discarded.
    AlreadyFinalized { session: UploadSession, received: u64 },
}

impl ReceiveOutcome {
    pub fn session(&self) -> &UploadSession {
        match self {
            Self::Written { session, .. }
            | Self::AlreadyReceived { session, .. }
            | Self::AlreadyFinalized { session, .. } => session,
        }
    }

    pub fn received(&self) -> u64 {
        match self {
            Self::Written { received, .. }
            | Self::AlreadyReceived { received, .. }
            | Self::AlreadyFinalized { received, .. } => *received,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Written { .. })
    }
}

impl Coordinator {
    pub fn new(store: Arc<dyn MetadataStore>, writer: ChunkWriter, chunk_size: u64) -> Self {
        Self {
            store,
            writer,
            chunk_size,
        }
    }

    /// `POST /api/upload/init`: validate the request and create the
    /// session and its chunk rows if absent. The target file itself is
    /// created lazily by the Chunk Writer on the first chunk write.
    ///
    /// A retried `init` for an id that already exists is accepted
    /// idempotently — the original session's fields win, even if this
    /// call's `filename`/`file_size` disagree with them. Rejecting a
    /// disagreeing retry would require the caller to track whether its
    /// own first attempt actually landed, which defeats the point of a
    /// client-chosen upload id.
    pub async fn init(
        &self,
        upload_id: String,
        filename: String,
        total_size: u64,
    ) -> Result<UploadSession, UploadError> {
        if upload_id.trim().is_empty() {
            return Err(UploadError::Validation("uploadId must not be empty".into()));
        }
        if filename.trim().is_empty() {
            return Err(UploadError::Validation("filename must not be empty".into()));
        }
        if total_size == 0 {
            return Err(UploadError::Validation("fileSize must be greater than zero".into()));
        }

        let fresh = UploadSession::new(upload_id.clone(), filename, total_size, self.chunk_size);
        let session = self.store.put_session_if_absent(fresh).await?;

        if session.total_size != total_size {
            warn!(
                upload_id = %upload_id,
                requested_size = total_size,
                existing_size = session.total_size,
                "init retried with mismatched fields; keeping original session",
            );
        }

        self.store
            .put_chunks_if_absent(&session.id, session.total_chunks)
            .await?;

        Ok(session)
    }

    /// `POST /api/upload/chunk`: validate, write the chunk at its offset,
    /// record the receipt, and opportunistically finalize once every chunk
    /// is in.
    ///
    /// `spool_path` names an already-spooled copy of the chunk's payload
    /// (written by the request surface while streaming the multipart
    /// body). This call always removes that file before returning, on
    /// every exit path, success or failure (§7).
    pub async fn receive_chunk(
        &self,
        upload_id: &str,
        chunk_index: u64,
        spool_path: PathBuf,
    ) -> Result<ReceiveOutcome, UploadError> {
        let result = self.receive_chunk_inner(upload_id, chunk_index, &spool_path).await;
        let _ = tokio::fs::remove_file(&spool_path).await;
        result
    }

    async fn receive_chunk_inner(
        &self,
        upload_id: &str,
        chunk_index: u64,
        spool_path: &Path,
    ) -> Result<ReceiveOutcome, UploadError> {
        let session = self
            .store
            .get_session(upload_id)
            .await?
            .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?;

        if session.status != SessionStatus::Uploading {
            // Already finalized or failed: duplicate/late chunks are
            // accepted as no-ops rather than erroring, so a slow client
            // retrying a chunk after the session completed doesn't see a
            // spurious failure.
            let received = self.store.count_received(upload_id).await?;
            return Ok(ReceiveOutcome::AlreadyFinalized { session, received });
        }

        if chunk_index >= session.total_chunks {
            return Err(UploadError::ChunkIndexOutOfBounds {
                index: chunk_index,
                total: session.total_chunks,
            });
        }

        let chunks = self.store.list_chunks(upload_id).await?;
        let already_received = chunks
            .iter()
            .any(|c| c.chunk_index == chunk_index && c.status == ChunkStatus::Received);
        if already_received {
            let received = self.store.count_received(upload_id).await?;
            return Ok(ReceiveOutcome::AlreadyReceived { session, received });
        }

        let expected_len = expected_chunk_len(
            chunk_index,
            session.total_size,
            session.total_chunks,
            self.chunk_size,
        );
        let actual_len = tokio::fs::metadata(spool_path).await?.len();
        if actual_len != expected_len {
            return Err(UploadError::LengthMismatch {
                expected: expected_len,
                actual: actual_len,
            });
        }

        self.writer
            .write_chunk(upload_id, chunk_index, self.chunk_size, spool_path.to_path_buf())
            .await?;
        self.store.set_chunk_received(upload_id, chunk_index).await?;

        let received = self.store.count_received(upload_id).await?;

        if received == session.total_chunks {
            match self.try_finalize(&session).await {
                Ok(finalized) => {
                    return Ok(ReceiveOutcome::Written {
                        session: finalized,
                        received,
                    })
                }
                Err(e) => {
                    warn!(upload_id = %upload_id, error = %e, "finalize attempt after last chunk failed");
                }
            }
        }

        Ok(ReceiveOutcome::Written { session, received })
    }

    /// Exactly-once finalization: claim the session via CAS from
    /// `UPLOADING` to `PROCESSING` before doing any work. A losing caller
    /// (CAS returns false) simply re-reads current state rather than
    /// retrying the claim — whoever won is already assembling the file.
    async fn try_finalize(&self, session: &UploadSession) -> Result<UploadSession, UploadError> {
        let claimed = self
            .store
            .update_session_status(&session.id, SessionStatus::Uploading, SessionStatus::Processing, None)
            .await?;

        if !claimed {
            return self
                .store
                .get_session(&session.id)
                .await?
                .ok_or_else(|| UploadError::NotFound(session.id.clone()));
        }

        let result = self.finalize_claimed(session).await;

        match result {
            Ok(final_hash) => {
                self.store
                    .update_session_status(
                        &session.id,
                        SessionStatus::Processing,
                        SessionStatus::Completed,
                        Some(&final_hash),
                    )
                    .await?;
                info!(upload_id = %session.id, final_hash = %final_hash, "upload finalized");
            }
            Err(ref e) => {
                warn!(upload_id = %session.id, error = %e, "finalization failed, marking session FAILED");
                self.store
                    .update_session_status(&session.id, SessionStatus::Processing, SessionStatus::Failed, None)
                    .await?;
            }
        }

        result?;

        self.store
            .get_session(&session.id)
            .await?
            .ok_or_else(|| UploadError::NotFound(session.id.clone()))
    }

    async fn finalize_claimed(&self, session: &UploadSession) -> Result<String, UploadError> {
        let target_path = self.writer.target_path(&session.id);
        let final_hash = digest::digest_file(&target_path).await?;

        if let Some(entries) = container::peek(&target_path, &session.filename).await {
            if let Err(e) = self.store.set_peek_entries(&session.id, &entries).await {
                warn!(upload_id = %session.id, error = %e, "failed to record container peek entries");
            }
        }

        Ok(final_hash)
    }

    /// `GET /api/upload/{id}/status`
    pub async fn get_status(
        &self,
        upload_id: &str,
    ) -> Result<(UploadSession, Vec<ChunkRecord>), UploadError> {
        let session = self
            .store
            .get_session(upload_id)
            .await?
            .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?;
        let chunks = self.store.list_chunks(upload_id).await?;
        Ok((session, chunks))
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

pub fn missing_chunk_indices(chunks: &[ChunkRecord]) -> Vec<u64> {
    chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Pending)
        .map(|c| c.chunk_index)
        .collect()
}

pub fn received_chunk_indices(chunks: &[ChunkRecord]) -> Vec<u64> {
    chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Received)
        .map(|c| c.chunk_index)
        .collect()
}

/// Re-exported for callers that only know `total_size`/`chunk_size` and
/// want the chunk count without constructing a session.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> u64 {
    total_chunks_for(total_size, chunk_size)
}
