//! # cascade-server: HTTP Service for the Cascades Query Optimizer
//!
//! Exposes the optimizer as a network service. A client sends a logical plan together
//! with the statistics of the tables it reads and receives the cheapest physical plan.
//!
//! ## Architecture
//!
//! ```text
//! Client (query frontend)
//!   |
//!   | HTTP POST /optimize (JSON: tables + logical plan + required properties)
//!   v
//! cascade-server (this binary)
//!   |
//!   +-> request catalog (tables, statistics, indexes, distribution)
//!   +-> Cascades search (explore + implement + cost, bounded by a budget)
//!   |
//!   | HTTP response (JSON: cost, explain text, physical plan)
//!   v
//! Client
//! ```
//!
//! ## Endpoints
//!
//! - `GET  /health`   - Health check
//! - `GET  /rules`    - List active optimization rules
//! - `POST /optimize` - Optimize a logical plan
//!
//! ## Configuration
//!
//! See [`config`] for the environment variables. Logging is controlled by `RUST_LOG`
//! (defaults to `cascade=debug`).

mod config;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::state::AppState;

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/rules", get(routes::list_rules))
        .route("/optimize", post(routes::optimize))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cascade=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    let addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("cascade-server listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
