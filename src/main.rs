//! Chunked Upload Server
//!
//! A resumable chunked upload core: session tracking, offset-addressed
//! chunk assembly, streaming digesting, and exactly-once finalization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunked_upload_server::config::Config;
use chunked_upload_server::db::{MetadataStore, SqliteStore};
use chunked_upload_server::routes;
use chunked_upload_server::state::AppState;
use chunked_upload_server::upload::{ChunkWriter, Janitor};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunked_upload_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("starting chunked-upload-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(upload_dir = ?config.upload_dir, temp_dir = ?config.temp_dir, "storage directories configured");

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .expect("failed to create upload directory");
    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .expect("failed to create temp directory");

    let db_pool = chunked_upload_server::db::create_pool(&config.database_url)
        .await
        .expect("failed to initialize database");
    tracing::info!("database initialized at {}", config.database_url);

    let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(db_pool.clone()));

    let app_state = AppState::new(config.clone(), db_pool, store.clone());

    let janitor = Janitor::new(
        store,
        ChunkWriter::new(config.upload_dir.clone()),
        config.temp_dir.clone(),
        config.session_retention_hours,
        config.scratch_retention_hours,
        Duration::from_secs(config.janitor_interval_secs),
    );
    janitor.spawn();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .nest("/api/upload", routes::upload::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("chunked-upload-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("server shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown...");
        },
    }
}
