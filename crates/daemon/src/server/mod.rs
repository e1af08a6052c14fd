//! HTTP surface of the daemon.
//!
//! File routes live under the configured mount path and are only mounted
//! when at least one root is configured. `/health` is always served at the
//! server root.

mod error;
mod handlers;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::files::{Archiver, RootRegistry};

pub use error::ApiError;

/// Shared, read-only state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    pub registry: RootRegistry,
    pub archiver: Archiver,
    pub preview_max_bytes: u64,
    pub max_part_bytes: u64,
    pub max_request_bytes: u64,
    pub mount_path: String,
    /// Cancelled on shutdown; in-flight archivers hold child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &Config, registry: RootRegistry) -> Self {
        Self {
            registry,
            archiver: Archiver::from_config(&config.archive),
            preview_max_bytes: config.files.preview_max_bytes,
            max_part_bytes: config.upload.max_part_bytes,
            max_request_bytes: config.upload.max_request_bytes,
            mount_path: config.server.mount_path.clone(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new().route("/health", get(handlers::health));

    if state.registry.is_empty() {
        warn!("No file roots configured, file routes are disabled");
    } else {
        let body_limit = usize::try_from(state.max_request_bytes).unwrap_or(usize::MAX);
        let files = Router::new()
            .route("/files/roots", get(handlers::roots))
            .route("/files/list", get(handlers::list))
            .route("/files/read", get(handlers::read))
            .route("/files/download", get(handlers::download))
            .route("/files/mkdir", post(handlers::mkdir))
            .route("/files/upload", post(handlers::upload))
            .route("/files/write", post(handlers::write))
            .route("/files/rename", post(handlers::rename))
            .route("/files/delete", post(handlers::delete))
            .layer(DefaultBodyLimit::max(body_limit));

        let mount = state.mount_path.trim_end_matches('/');
        app = if mount.is_empty() {
            app.merge(files)
        } else {
            app.nest(mount, files)
        };
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Load roots, bind and serve until `shutdown` resolves.
pub async fn serve<F>(config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = RootRegistry::load(&config.roots)?;
    if !config.archiver_available() {
        warn!(
            program = %config.archive.program,
            "Archiver not found on PATH, directory downloads will fail"
        );
    }

    let state = Arc::new(AppState::new(config, registry));
    let cancel = state.shutdown.clone();
    let app = router(Arc::clone(&state));

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        addr = %listener.local_addr()?,
        mount_path = %state.mount_path,
        roots = state.registry.len(),
        "NavFiles server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down, stopping in-flight archives");
            cancel.cancel();
        })
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}
