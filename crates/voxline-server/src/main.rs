mod config;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header::CONTENT_TYPE};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use voxline_api::credentials::Argon2Hasher;
use voxline_api::messages::MessageService;
use voxline_api::routes;
use voxline_api::state::{AppState, AppStateInner};
use voxline_api::users::UserService;
use voxline_db::Database;
use voxline_store::FileStore;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxline=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Storage first: a missing upload directory that cannot be created is fatal
    let db = Arc::new(
        Database::open(&config.db_path)
            .with_context(|| format!("Failed to open database {}", config.db_path.display()))?,
    );
    let store = Arc::new(
        FileStore::open(&config.upload_dir, config.io_timeout)
            .await
            .context("Failed to initialise audio storage")?,
    );

    let state: AppState = Arc::new(AppStateInner {
        users: UserService::new(db.clone(), Arc::new(Argon2Hasher::new())),
        messages: MessageService::new(db, store),
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .context("Invalid VOXLINE_CORS_ORIGIN")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let app = routes::router(state, config.max_upload_bytes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.listen_addr()?;
    info!("Voxline server listening on {}", addr);
    info!("Upload limit: {} MB", config.max_upload_bytes / (1024 * 1024));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            tracing::warn!("Failed to install SIGTERM handler, only Ctrl+C will stop the server");
            ctrl_c.await.ok();
            return;
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
