//! Integration tests driving the upload HTTP surface end-to-end through a
//! real router, an in-memory SQLite store, and a temp-dir-backed writer.

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chunked_upload_server::config::Config;
use chunked_upload_server::db::{initialize_schema, MetadataStore, SqliteStore};
use chunked_upload_server::state::AppState;
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn test_server() -> (TestServer, TempDir) {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    initialize_schema(&pool).await.unwrap();
    let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(pool.clone()));

    let work_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.upload_dir = work_dir.path().join("uploads");
    config.temp_dir = work_dir.path().join("temp");
    config.chunk_size = 4;

    let app_state = AppState::new(config, pool, store);
    let app: Router = Router::new()
        .nest("/api/upload", chunked_upload_server::routes::upload::router())
        .with_state(app_state);

    (TestServer::new(app).unwrap(), work_dir)
}

async fn post_chunk(server: &TestServer, upload_id: &str, index: u64, bytes: &[u8]) -> axum_test::TestResponse {
    server
        .post("/api/upload/chunk")
        .multipart(
            axum_test::multipart::MultipartForm::new()
                .add_text("uploadId", upload_id)
                .add_text("chunkIndex", index.to_string())
                .add_part("chunk", axum_test::multipart::Part::bytes(bytes.to_vec())),
        )
        .await
}

#[tokio::test]
async fn init_then_chunk_then_status_completes_an_upload() {
    let (server, work_dir) = test_server().await;

    let init_resp = server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-1",
            "filename": "hello.txt",
            "fileSize": 11,
        }))
        .await;
    init_resp.assert_status_ok();
    let init_body: serde_json::Value = init_resp.json();
    assert_eq!(init_body["status"], "UPLOADING");
    assert_eq!(init_body["uploadedChunks"].as_array().unwrap().len(), 0);

    for (index, bytes) in [(0, &b"hell"[..]), (1, &b"o wo"[..]), (2, &b"rld"[..])] {
        post_chunk(&server, "test-upload-1", index, bytes).await.assert_status_ok();
    }

    let status_resp = server.get("/api/upload/test-upload-1/status").await;
    status_resp.assert_status_ok();
    let status_body: serde_json::Value = status_resp.json();
    assert_eq!(status_body["upload"]["status"], "COMPLETED");
    assert!(status_body["upload"]["finalHash"].is_string());

    let assembled = tokio::fs::read(work_dir.path().join("uploads").join("test-upload-1"))
        .await
        .unwrap();
    assert_eq!(assembled, b"hello world");
}

#[tokio::test]
async fn chunks_arriving_out_of_order_still_assemble_correctly() {
    let (server, work_dir) = test_server().await;

    server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-ooo",
            "filename": "hello.txt",
            "fileSize": 11,
        }))
        .await
        .assert_status_ok();

    post_chunk(&server, "test-upload-ooo", 2, b"rld").await.assert_status_ok();
    post_chunk(&server, "test-upload-ooo", 0, b"hell").await.assert_status_ok();
    let last = post_chunk(&server, "test-upload-ooo", 1, b"o wo").await;
    last.assert_status_ok();
    let last_body: serde_json::Value = last.json();
    assert_eq!(last_body["isComplete"], true);

    let assembled = tokio::fs::read(work_dir.path().join("uploads").join("test-upload-ooo"))
        .await
        .unwrap();
    assert_eq!(assembled, b"hello world");
}

#[tokio::test]
async fn duplicate_chunk_after_completion_reports_already_uploaded() {
    let (server, _work_dir) = test_server().await;

    server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-dup",
            "filename": "hello.txt",
            "fileSize": 4,
        }))
        .await
        .assert_status_ok();

    post_chunk(&server, "test-upload-dup", 0, b"data").await.assert_status_ok();

    let retry = post_chunk(&server, "test-upload-dup", 0, b"data").await;
    retry.assert_status_ok();
    let retry_body: serde_json::Value = retry.json();
    assert_eq!(retry_body["success"], true);
    assert_eq!(retry_body["message"], "Chunk already uploaded");
}

#[tokio::test]
async fn chunk_for_unknown_upload_is_not_found() {
    let (server, _work_dir) = test_server().await;

    let resp = post_chunk(&server, "never-initialized", 0, b"data").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn init_is_idempotent_and_reports_progress_on_retry() {
    let (server, _work_dir) = test_server().await;

    server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-resume",
            "filename": "hello.txt",
            "fileSize": 11,
        }))
        .await
        .assert_status_ok();

    post_chunk(&server, "test-upload-resume", 0, b"hell").await.assert_status_ok();

    let resume = server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-resume",
            "filename": "hello.txt",
            "fileSize": 11,
        }))
        .await;
    resume.assert_status_ok();
    let resume_body: serde_json::Value = resume.json();
    assert_eq!(resume_body["status"], "UPLOADING");
    assert_eq!(resume_body["uploadedChunks"], serde_json::json!([0]));
}

#[tokio::test]
async fn init_rejects_empty_filename() {
    let (server, _work_dir) = test_server().await;

    let resp = server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-2",
            "filename": "",
            "fileSize": 10,
        }))
        .await;

    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_for_unknown_upload_is_not_found() {
    let (server, _work_dir) = test_server().await;

    let resp = server.get("/api/upload/does-not-exist/status").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chunk_with_wrong_length_is_rejected() {
    let (server, _work_dir) = test_server().await;

    server
        .post("/api/upload/init")
        .json(&serde_json::json!({
            "uploadId": "test-upload-3",
            "filename": "a.bin",
            "fileSize": 10,
        }))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/upload/chunk")
        .multipart(
            axum_test::multipart::MultipartForm::new()
                .add_text("uploadId", "test-upload-3")
                .add_text("chunkIndex", "0")
                .add_part("chunk", axum_test::multipart::Part::bytes(b"short".to_vec())),
        )
        .await;

    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
}
