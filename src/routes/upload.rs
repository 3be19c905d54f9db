//! Upload Routes
//!
//! HTTP endpoints for the resumable chunked upload protocol.
//!
//! Endpoints:
//! - POST /api/upload/init            - Create or resume an upload session
//! - POST /api/upload/chunk           - Upload one chunk (multipart)
//! - GET  /api/upload/:upload_id/status - Poll session + chunk status

use std::path::PathBuf;

use axum::{
    extract::multipart::Field,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::state::AppState;
use crate::upload::coordinator::received_chunk_indices;
use crate::upload::types::{
    ChunkResponse, InitRequest, InitResponse, SessionStatus, StatusResponse, UploadError,
};

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/init", post(init))
        .route("/chunk", post(upload_chunk))
        .route("/:upload_id/status", get(get_status))
}

async fn init(
    State(state): State<AppState>,
    Json(req): Json<InitRequest>,
) -> Result<Json<InitResponse>, UploadError> {
    let session = state
        .coordinator()
        .init(req.upload_id, req.filename, req.file_size)
        .await?;

    let chunks = state.coordinator().get_status(&session.id).await?.1;
    let uploaded_chunks = received_chunk_indices(&chunks);

    Ok(Json(InitResponse {
        upload_id: session.id,
        uploaded_chunks,
        status: session.status,
    }))
}

async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkResponse>, UploadError> {
    let (upload_id, chunk_index, spool_path) = collect_chunk_fields(&state, &mut multipart).await?;

    let outcome = state
        .coordinator()
        .receive_chunk(&upload_id, chunk_index, spool_path)
        .await?;

    let message = outcome.is_duplicate().then(|| "Chunk already uploaded".to_string());
    let session = outcome.session();

    Ok(Json(ChunkResponse {
        success: true,
        is_complete: session.status == SessionStatus::Completed,
        received_chunks: outcome.received(),
        total_chunks: session.total_chunks,
        message,
    }))
}

/// Parse the `chunk` multipart form and stream its binary part straight to
/// a scratch file under the configured temp directory — the payload never
/// sits fully in memory, however large an individual chunk turns out to be.
/// `totalChunks` is accepted (per the wire contract) but not otherwise
/// used: `total_chunks` is derived once, at `init`, from the declared
/// file size.
async fn collect_chunk_fields(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<(String, u64, PathBuf), UploadError> {
    let mut upload_id: Option<String> = None;
    let mut chunk_index: Option<u64> = None;
    let mut spool_path: Option<PathBuf> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "uploadId" => {
                upload_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| UploadError::Validation(e.to_string()))?,
                );
            }
            "chunkIndex" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Validation(e.to_string()))?;
                chunk_index = Some(
                    text.parse()
                        .map_err(|_| UploadError::Validation("chunkIndex must be an integer".into()))?,
                );
            }
            "chunk" => {
                let path = state.temp_dir().join(Uuid::new_v4().to_string());
                if let Err(e) = spool_field(&mut field, &path).await {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(e);
                }
                spool_path = Some(path);
            }
            _ => {
                // Unrecognized fields (e.g. totalChunks) are drained and dropped.
                let _ = field.bytes().await;
            }
        }
    }

    let upload_id = match upload_id {
        Some(v) => v,
        None => return fail_missing(spool_path, "missing uploadId field").await,
    };
    let chunk_index = match chunk_index {
        Some(v) => v,
        None => return fail_missing(spool_path, "missing chunkIndex field").await,
    };
    let spool_path = match spool_path {
        Some(v) => v,
        None => return Err(UploadError::Validation("missing chunk field".into())),
    };

    Ok((upload_id, chunk_index, spool_path))
}

async fn fail_missing<T>(spool_path: Option<PathBuf>, message: &str) -> Result<T, UploadError> {
    if let Some(path) = spool_path {
        let _ = tokio::fs::remove_file(path).await;
    }
    Err(UploadError::Validation(message.into()))
}

async fn spool_field(field: &mut Field<'_>, path: &std::path::Path) -> Result<(), UploadError> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(bytes) = field
        .chunk()
        .await
        .map_err(|e| UploadError::Validation(format!("malformed chunk field: {e}")))?
    {
        file.write_all(&bytes).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

async fn get_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<StatusResponse>, UploadError> {
    let (session, chunks) = state.coordinator().get_status(&upload_id).await?;

    Ok(Json(StatusResponse {
        upload: session,
        chunks,
    }))
}
