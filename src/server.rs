//! HTTP exposure surface.
//!
//! Binds two routes behind the credential gate: the configured metrics
//! path, serving the registry's rendered exposition, and an index page
//! at `/` linking to it. Binding failure is fatal; there is no
//! graceful shutdown path, termination happens on external signal or
//! serve error.

use crate::auth::CredentialGate;
use crate::metrics::{MetricRegistry, TEXT_FORMAT};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during exposure server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the exposure server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Path under which metrics are exposed.
    pub metrics_path: String,
}

impl ServerConfig {
    /// Creates a config listening on all interfaces at the given port.
    pub fn new(port: u16, metrics_path: impl Into<String>) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
            metrics_path: metrics_path.into(),
        }
    }
}

/// Shared state for the request handlers.
struct AppState {
    registry: Arc<MetricRegistry>,
    gate: CredentialGate,
    metrics_path: String,
}

/// HTTP server exposing the gated metrics surface.
pub struct ExposureServer {
    config: ServerConfig,
    registry: Arc<MetricRegistry>,
    gate: CredentialGate,
}

impl ExposureServer {
    /// Creates a new exposure server. The registry is frozen here: no
    /// further registration happens once requests are being served.
    pub fn new(config: ServerConfig, registry: MetricRegistry, gate: CredentialGate) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            gate,
        }
    }

    /// Starts the HTTP server.
    ///
    /// Runs until the serve loop fails; a bind failure surfaces as
    /// [`ServerError::Bind`] for the caller to treat as fatal.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = router(self.registry, self.gate, &self.config.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %self.config.bind_addr,
            path = %self.config.metrics_path,
            "Exposure server listening"
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Builds the gated router. Separate from [`ExposureServer::run`] so
/// the full request path can be exercised without binding a socket.
fn router(registry: Arc<MetricRegistry>, gate: CredentialGate, metrics_path: &str) -> Router {
    let state = Arc::new(AppState {
        registry,
        gate,
        metrics_path: metrics_path.to_string(),
    });

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/", get(index_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_credentials,
        ))
        .with_state(state)
}

/// Gate middleware: rejects before any handler runs. The response body
/// deliberately does not distinguish missing from wrong credentials.
async fn require_credentials(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if state.gate.authorize(authorization) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized.").into_response()
    }
}

/// Handler for the metrics path.
///
/// Producers perform blocking socket and file I/O, so the sequential
/// render pass runs off the async executor.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let registry = Arc::clone(&state.registry);

    match tokio::task::spawn_blocking(move || registry.render()).await {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Render task failed: {e}"),
        )
            .into_response(),
    }
}

/// Handler for the index page.
async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(index_page(&state.metrics_path))
}

fn index_page(metrics_path: &str) -> String {
    format!(
        "<html>\n\
         \t<head>\n\
         \t\t<title>PgBouncer Exporter</title>\n\
         \t</head>\n\
         \t<body>\n\
         \t\t<h1>PgBouncer Exporter</h1>\n\
         \t\t<p>\n\
         \t\t<a href='{metrics_path}'>Metrics</a>\n\
         \t\t</p>\n\
         \t</body>\n\
         </html>"
    )
}
