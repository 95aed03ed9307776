//! Liveness endpoint for the hosting platform's probes.
//!
//! Answers `GET /` and `GET /health` with `OK`.  It shares nothing with the
//! poll engine; if this responds, the process is up.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

/// Build the router.
pub fn router() -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

/// Bind `0.0.0.0:<port>` and serve until the process exits.
pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");
    axum::serve(listener, router()).await
}
