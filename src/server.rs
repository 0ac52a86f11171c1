use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}

pub async fn serve_health(bind_addr: &str) -> Result<()> {
    let bind_addr = bind_addr
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid bind address '{}' (expected host:port)", bind_addr))?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind health server to {}", bind_addr))?;
    tracing::info!("Health endpoint listening on http://{}", bind_addr);
    axum::serve(listener, router())
        .await
        .context("Health server failed")?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "Online" })
}
