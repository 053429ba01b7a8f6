//! HTTP endpoint exposing acquisition metrics to Prometheus.
//!
//! Counters are published by the acquisition side through
//! [`MetricsState::publish`]; the health probe reads the live store.

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::store::SampleStore;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Errors raised while serving metrics.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind metrics listener: {0}")]
    Bind(#[from] std::io::Error),
    #[error("metrics server stopped: {0}")]
    Serve(String),
}

/// Listener settings for the metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsServerConfig {
    /// Listening address; all interfaces by default.
    pub addr: SocketAddr,
}

impl MetricsServerConfig {
    /// Listens on every interface at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        }
    }
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

/// Handle shared by the acquisition loop and the request handlers.
#[derive(Clone)]
pub struct MetricsState {
    registry: Arc<MetricsRegistry>,
    store: SampleStore,
}

impl MetricsState {
    /// Applies a snapshot to the exported series.
    pub fn publish(&self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
    }

    /// Frames currently held by the watched store.
    pub fn stored_frames(&self) -> usize {
        self.store.len()
    }
}

/// Serves `/metrics` and `/health`.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: MetricsState,
}

impl MetricsServer {
    /// Creates a server exporting `registry` and watching `store`.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry, store: SampleStore) -> Self {
        Self {
            config,
            state: MetricsState {
                registry: Arc::new(registry),
                store,
            },
        }
    }

    /// Returns a publishing handle.
    pub fn state(&self) -> MetricsState {
        self.state.clone()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(export))
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Runs until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        tracing::info!(addr = %self.config.addr, "Metrics server listening");

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}

async fn export(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.registry.encode() {
        Ok(body) => (StatusCode::OK, [("content-type", PROMETHEUS_CONTENT_TYPE)], body),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics encoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}

async fn health(State(state): State<MetricsState>) -> impl IntoResponse {
    format!("OK frames={}", state.stored_frames())
}
