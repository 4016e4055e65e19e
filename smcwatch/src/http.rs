//! HTTP output server.
//!
//! When `--http` is set the transcript goes into a shared buffer instead of
//! stdout, and this server serves it on `GET /`. The query `flush=true`
//! clears the buffer after serving it; any other flush value serves without
//! clearing.

use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::sink::SharedBuffer;

/// Errors that can occur while serving buffered output over HTTP
#[derive(Debug, Error)]
pub enum HttpError {
    /// Failed to bind the output server to an address
    #[error("failed to bind HTTP output server to {address}: {source}")]
    BindAddress {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serve requests
    #[error("failed to serve requests: {0}")]
    Serve(#[source] std::io::Error),
}

impl HttpError {
    /// Create a bind address error
    pub fn bind_address(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::BindAddress {
            address: address.into(),
            source,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    flush: Option<String>,
}

/// Serves the buffered transcript; clears it only on `flush=true`.
pub async fn output_handler(
    State(buffer): State<SharedBuffer>,
    Query(query): Query<OutputQuery>,
) -> String {
    let body = String::from_utf8_lossy(&buffer.snapshot()).into_owned();
    if query.flush.as_deref() == Some("true") {
        buffer.reset();
    }
    body
}

pub fn create_output_router(buffer: SharedBuffer) -> Router {
    Router::new()
        .route("/", get(output_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(buffer)
}

/// Binds the output server; separate from [`serve`] so startup failures
/// surface before the capture loop starts.
pub async fn bind(address: &str) -> Result<TcpListener, HttpError> {
    TcpListener::bind(address)
        .await
        .map_err(|e| HttpError::bind_address(address, e))
}

pub async fn serve(listener: TcpListener, buffer: SharedBuffer) -> Result<(), HttpError> {
    let app = create_output_router(buffer);
    info!(
        net.listen.address = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        "http output server has started"
    );
    axum::serve(listener, app).await.map_err(HttpError::Serve)
}
