use axum::{
    Router,
    routing::get,
    http::StatusCode,
    Json,
};
use async_trait::async_trait;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{Result, CasterError};
use crate::media::{file_extension, served_route};

use super::EmbeddedServer;

/// Open streams keep graceful shutdown waiting; give up on them after this.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct RunningServer {
    port: u16,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// axum server for a single media file, with range support from `ServeFile`.
#[derive(Default)]
pub struct HttpMediaServer {
    served_file: Option<PathBuf>,
    running: Option<RunningServer>,
}

impl HttpMediaServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn served_file(&self) -> Option<&Path> {
        self.served_file.as_deref()
    }

    pub fn router(file: &Path) -> Router {
        let route = served_route(&file_extension(file));

        Router::new()
            .route_service(&route, ServeFile::new(file))
            .route("/health", get(health_check))
            // Cast receivers fetch cross-origin
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl EmbeddedServer for HttpMediaServer {
    fn set_served_file(&mut self, path: &Path) {
        self.served_file = Some(path.to_path_buf());
    }

    async fn start(&mut self, port: u16) -> Result<()> {
        if self.running.is_some() {
            warn!("Embedded server already running, restarting on port {}", port);
            self.stop().await;
        }

        let file = self.served_file.clone().ok_or_else(|| {
            CasterError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no file configured for the embedded server",
            ))
        })?;
        let app = Self::router(&file);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await
            .map_err(|source| CasterError::ServerBind { port, source })?;

        let (shutdown, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!("Embedded server error: {}", e);
            }
        });

        info!("Serving {} on http://{}{}", file.display(), addr, served_route(&file_extension(&file)));
        self.running = Some(RunningServer { port, shutdown, task });
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut running.task).await.is_err() {
            running.task.abort();
        }
        info!("Embedded server on port {} stopped", running.port);
    }

    fn port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.port)
    }
}

impl Drop for HttpMediaServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({
        "status": "healthy",
        "service": "cast-relay",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
