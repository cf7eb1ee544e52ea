use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use super::{log_requests, make_analysis_routes, state::*, ServerConfig};
use crate::analysis::Orchestrator;
use crate::mcp::{create_mcp_state, mcp_handler};

pub const SERVICE_NAME: &str = "blockchain-vuln-analyzer";

#[derive(Serialize)]
struct ServerStats {
    pub name: &'static str,
    pub version: &'static str,
    pub hash: String,
    pub uptime: String,
    pub tools: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> Json<ServerStats> {
    Json(ServerStats {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        hash: state.hash.clone(),
        uptime: format_uptime(state.start_time.elapsed()),
        tools: state.orchestrator.registry().len(),
    })
}

pub fn make_app(config: ServerConfig, orchestrator: Arc<Orchestrator>) -> Router {
    let mcp_state = Arc::new(create_mcp_state(orchestrator.clone()));
    let state = ServerState {
        config,
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        orchestrator,
        mcp_state,
    };

    let home_router: Router = Router::new()
        .route("/", get(home))
        .route("/mcp", get(mcp_handler))
        .with_state(state.clone());

    home_router
        .merge(make_analysis_routes(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(config: ServerConfig, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let app = make_app(config, orchestrator);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", address);

    Ok(axum::serve(listener, app).await?)
}
