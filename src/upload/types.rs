//! Core data model for the resumable chunked upload protocol.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

// ============================================================================
// Constants
// ============================================================================

/// Default chunk size: 5MB. Overridable per-server via `Config::chunk_size`
/// (and per-test via `Coordinator::with_chunk_size`).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of `POST /api/upload/init`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub upload_id: String,
    pub filename: String,
    pub file_size: u64,
}

/// Response to `POST /api/upload/init` and `GET /api/upload/{id}/status`'s
/// session half.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub upload_id: String,
    pub uploaded_chunks: Vec<u64>,
    pub status: SessionStatus,
}

/// Response to `POST /api/upload/chunk`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub success: bool,
    pub is_complete: bool,
    pub received_chunks: u64,
    pub total_chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to `GET /api/upload/{id}/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub upload: UploadSession,
    pub chunks: Vec<ChunkRecord>,
}

// ============================================================================
// Session Types
// ============================================================================

/// One upload session's durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    pub filename: String,
    pub total_size: u64,
    pub total_chunks: u64,
    pub status: SessionStatus,
    pub final_hash: Option<String>,
    /// Top-level entries of a ZIP-family archive, as found by the
    /// Container Peeker during finalization. Informational only — never
    /// gates `COMPLETED`, and absent for non-archive uploads or when the
    /// peek failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peek_entries: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

impl UploadSession {
    /// Build the initial `UPLOADING` record for a freshly-validated `init` call.
    pub fn new(id: String, filename: String, total_size: u64, chunk_size: u64) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id,
            filename,
            total_size,
            total_chunks: total_chunks_for(total_size, chunk_size),
            status: SessionStatus::Uploading,
            final_hash: None,
            peek_entries: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Hand-rolled rather than `#[derive(sqlx::FromRow)]` because `peek_entries`
/// is stored as a JSON text column and needs decoding, not a 1:1 column map.
impl<'r> sqlx::FromRow<'r, SqliteRow> for UploadSession {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let total_size: i64 = row.try_get("total_size")?;
        let total_chunks: i64 = row.try_get("total_chunks")?;
        let peek_entries: Option<String> = row.try_get("peek_entries")?;

        Ok(Self {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            total_size: total_size as u64,
            total_chunks: total_chunks as u64,
            status: SessionStatus::try_from(status).map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: Box::new(e),
            })?,
            final_hash: row.try_get("final_hash")?,
            peek_entries: peek_entries.and_then(|raw| serde_json::from_str(&raw).ok()),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// `ceil(total_size / chunk_size)`, with the degenerate `total_size == 0`
/// case (rejected earlier by validation) never reaching here.
pub fn total_chunks_for(total_size: u64, chunk_size: u64) -> u64 {
    total_size.div_ceil(chunk_size)
}

/// Expected length of a given chunk index: `chunk_size` for every chunk but
/// the last, which carries the remainder.
pub fn expected_chunk_len(chunk_index: u64, total_size: u64, total_chunks: u64, chunk_size: u64) -> u64 {
    if chunk_index + 1 == total_chunks {
        total_size - chunk_index * chunk_size
    } else {
        chunk_size
    }
}

/// Session lifecycle status (I3: one-way DAG, `FAILED` reachable from either
/// non-terminal state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "UPLOADING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = UnrecognizedStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "UPLOADING" => Ok(Self::Uploading),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(UnrecognizedStatus(value)),
        }
    }
}

/// Raised when a `status` column holds a value outside the known set —
/// only reachable via direct database tampering, since every write path
/// here goes through `SessionStatus::as_str()`/`ChunkStatus::as_str()`.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized status value: {0}")]
pub struct UnrecognizedStatus(String);

// ============================================================================
// Chunk Record
// ============================================================================

/// One `(upload_id, chunk_index)` receipt record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub upload_id: String,
    #[sqlx(try_from = "i64")]
    pub chunk_index: u64,
    #[sqlx(try_from = "String")]
    pub status: ChunkStatus,
    pub received_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChunkStatus {
    Pending,
    Received,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Received => "RECEIVED",
        }
    }
}

impl TryFrom<String> for ChunkStatus {
    type Error = UnrecognizedStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "PENDING" => Ok(Self::Pending),
            "RECEIVED" => Ok(Self::Received),
            _ => Err(UnrecognizedStatus(value)),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the Session Coordinator and its collaborators, mapped
/// to HTTP status codes at the Request Surface boundary.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("missing or invalid field: {0}")]
    Validation(String),

    #[error("upload not found: {0}")]
    NotFound(String),

    #[error("chunk index {index} out of bounds (total chunks: {total})")]
    ChunkIndexOutOfBounds { index: u64, total: u64 },

    #[error("chunk length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl UploadError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ChunkIndexOutOfBounds { .. } => StatusCode::BAD_REQUEST,
            Self::LengthMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ChunkIndexOutOfBounds { .. } => "CHUNK_INDEX_OUT_OF_BOUNDS",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::Write(_) => "WRITE_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}
