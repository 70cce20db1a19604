//! HTTP and WebSocket transport for recording clients.
//!
//! This module provides a server that:
//! - Accepts session and reading frames over a WebSocket at `/ws`
//! - Broadcasts detection results to every connected socket
//! - Accepts classifier artifacts via `POST /bool-classifier` and `POST /type-classifier`
//!
//! # Architecture
//!
//! ```text
//! Recording app ──ws──→ MotionEngine ──→ SessionLifecycle ──→ JsonFileStore
//!       ↑                    │
//!       └──── event_found ───┘ (Analyzer → ClassifierPort)
//! ```

use crate::analysis::Stage;
use crate::classifier::{ClassifierPort, ARTIFACT_EXTENSION};
use crate::config::Config;
use crate::engine::MotionEngine;
use crate::persistence::JsonFileStore;
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::stats::{IngestStats, StatsSnapshot};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Agent configuration; `port` 0 binds a random port
    pub config: Config,
}

impl ServerConfig {
    /// Create a server configuration bound to localhost
    pub fn new(config: Config) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            config,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }
}

/// Shared server state
pub struct ServerState {
    engine: Arc<MotionEngine>,
    event_detection_dir: PathBuf,
    type_classification_dir: PathBuf,
}

impl ServerState {
    /// Open the session store, resume statistics and load the latest classifiers.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        config.ensure_directories()?;

        let store = Arc::new(JsonFileStore::open(config.sessions_path())?);
        let stats = Arc::new(IngestStats::with_persistence(config.stats_path()));
        let classifiers = Arc::new(ClassifierPort::new());
        classifiers.load_latest(
            &config.event_detection_models(),
            &config.type_classification_models(),
        );

        let engine = MotionEngine::new(&config.analysis, store, classifiers, stats)?;

        Ok(Self {
            engine: Arc::new(engine),
            event_detection_dir: config.event_detection_models(),
            type_classification_dir: config.type_classification_models(),
        })
    }

    pub fn engine(&self) -> &Arc<MotionEngine> {
        &self.engine
    }

    /// Broadcast shutdown, persist open sessions, finish outstanding
    /// analyses and save statistics.
    async fn shutdown(&self) {
        let persisted = self.engine.shutdown().await;
        let stats = self.engine.stats();
        if let Err(e) = stats.save() {
            tracing::warn!("Failed to save ingestion stats: {}", e);
        }
        tracing::info!(sessions = persisted, "Open sessions persisted on shutdown");
        tracing::info!("{}", stats.summary());
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
    pub event_detector: String,
    pub type_classifier: String,
}

/// Classifier upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub model: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
}

/// GET /
async fn index() -> &'static str {
    "athlete-motion-agent: connect a recording client to /ws"
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let classifiers = state.engine.classifiers();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.engine.lifecycle().active_count(),
        event_detector: classifiers.event_detector().name().to_string(),
        type_classifier: classifiers.type_classifier().name().to_string(),
    })
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsSnapshot> {
    Json(state.engine.stats().snapshot())
}

/// POST /bool-classifier
async fn upload_event_detector(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    install_artifact(&state, Stage::EventDetection, &body)
}

/// POST /type-classifier
async fn upload_type_classifier(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    install_artifact(&state, Stage::TypeClassification, &body)
}

/// Store an uploaded artifact next to earlier ones and make it active.
///
/// An artifact that fails to load is removed again so it is never picked up
/// as the latest model on restart.
fn install_artifact(
    state: &ServerState,
    stage: Stage,
    body: &[u8],
) -> Result<Json<UploadResponse>, ApiError> {
    let dir = match stage {
        Stage::EventDetection => &state.event_detection_dir,
        Stage::TypeClassification => &state.type_classification_dir,
    };
    let path = write_artifact(dir, body).map_err(|e| {
        tracing::error!("Failed to store classifier artifact: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORAGE_ERROR",
            format!("Could not store artifact: {e}"),
        )
    })?;

    let classifiers = state.engine.classifiers();
    let loaded = match stage {
        Stage::EventDetection => classifiers.load_event_detection_model(&path),
        Stage::TypeClassification => classifiers.load_type_classification_model(&path),
    };

    match loaded {
        Ok(model) => Ok(Json(UploadResponse {
            status: "ok".to_string(),
            model,
        })),
        Err(e) => {
            let _ = std::fs::remove_file(&path);
            tracing::warn!("Rejected classifier upload: {}", e);
            Err(api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_MODEL",
                e.to_string(),
            ))
        }
    }
}

fn write_artifact(dir: &Path, body: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let path = dir.join(format!("{stamp}.{ARTIFACT_EXTENSION}"));
    std::fs::write(&path, body)?;
    Ok(path)
}

/// GET /ws
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(socket: &mut WebSocket, message: &OutboundMessage) -> Result<(), axum::Error> {
    let text = message.to_json().map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut outbound = state.engine.subscribe();
    tracing::debug!("Client connected");

    if send(&mut socket, &OutboundMessage::heartbeat()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("Socket error: {}", e);
                        break;
                    }
                };
                let message = match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!("Ignoring malformed frame: {}", e);
                        continue;
                    }
                };
                if let Some(reply) = state.engine.handle(message) {
                    if send(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
            }
            frame = outbound.recv() => {
                match frame {
                    Ok(message) => {
                        let closing = message == OutboundMessage::Shutdown;
                        if send(&mut socket, &message).await.is_err() || closing {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Client too slow, frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("Client disconnected");
}

/// Build the router for a prepared state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws", get(ws_upgrade))
        .route("/bool-classifier", post(upload_event_detector))
        .route("/type-classifier", post(upload_type_classifier))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the server
///
/// Returns the bound address, the shutdown trigger and the server task. The
/// task completes once shutdown has persisted every session and event.
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>, JoinHandle<()>)> {
    let state = Arc::new(ServerState::new(&config.config)?);
    let app = router(state.clone());

    let addr = SocketAddr::new(config.host, config.config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Motion agent listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
                state.shutdown().await;
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx, server))
}
