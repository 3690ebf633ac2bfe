//! HTTP API server implementation
//!
//! Builds the Axum router around a [`GenerationEngine`] and serves it.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::routes;
use crate::config::ServerConfig;
use crate::generation::GenerationEngine;
use crate::types::RuntimeError;

/// Shared handler state
#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<dyn GenerationEngine>,
    /// Used for requests that do not name a working directory
    pub default_working_directory: Option<PathBuf>,
}

impl ServerState {
    pub fn new(engine: Arc<dyn GenerationEngine>) -> Self {
        Self {
            engine,
            default_working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_working_directory = Some(dir.into());
        self
    }
}

/// HTTP API Server
pub struct HttpApiServer {
    config: ServerConfig,
    state: ServerState,
}

impl HttpApiServer {
    pub fn new(config: ServerConfig, state: ServerState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP API server
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let app = self.router();

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RuntimeError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("HTTP API server listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| RuntimeError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Create the Axum router with all routes and middleware
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route(
                "/v1/generate",
                post(routes::generate).fallback(routes::not_found),
            )
            .route("/healthz", get(routes::health).fallback(routes::not_found))
            .route("/status", get(routes::status).fallback(routes::not_found))
            .route("/v1/tools", get(routes::tools).fallback(routes::not_found))
            .fallback(routes::not_found)
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes));

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        // Outermost, so every OPTIONS request ends as an empty 204 whatever
        // the inner layers answered.
        router.layer(middleware::from_fn(preflight))
    }
}

/// Answer `OPTIONS` with 204 and no body, keeping any CORS headers the inner
/// service added.
async fn preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let (mut parts, _) = next.run(request).await.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(axum::http::header::CONTENT_TYPE);
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}
