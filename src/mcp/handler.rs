//! MCP WebSocket Handler
//!
//! Handles WebSocket connections for MCP protocol.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::connection::{McpSession, OUTBOUND_QUEUE_SIZE};
use super::registry::McpRegistry;
use crate::analysis::Orchestrator;
use crate::server::state::GuardedMcpState;

pub const SERVER_NAME: &str = "blockchain-vuln-analyzer";

pub fn server_version() -> String {
    format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"))
}

/// State shared across MCP connections
pub struct McpState {
    pub registry: Arc<McpRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

/// WebSocket upgrade handler for MCP
pub async fn mcp_handler(ws: WebSocketUpgrade, State(mcp_state): State<GuardedMcpState>) -> Response {
    info!("MCP WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_mcp_socket(socket, mcp_state))
}

/// Handle an established MCP WebSocket connection
async fn handle_mcp_socket(socket: WebSocket, mcp_state: Arc<McpState>) {
    debug!("MCP connection established");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_SIZE);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let session = McpSession::new(mcp_state);
    let forwarder = session.forward_notifications(outbound_tx.clone());

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !session.dispatch(&text, &outbound_tx).await {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                // Axum/tungstenite handles pong automatically
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Received close frame");
                break;
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }

    forwarder.abort();
    drop(outbound_tx);
    let _ = writer.await;
    debug!("MCP connection closed");
}

/// Create the MCP state with registered tools, resources and prompts
pub fn create_mcp_state(orchestrator: Arc<Orchestrator>) -> McpState {
    let mut registry = McpRegistry::new();

    // Register all tools
    super::tools::register_all_tools(&mut registry, orchestrator.registry());

    // Register all resources
    super::resources::register_all_resources(&mut registry);

    // Register all prompts
    super::prompts::register_all_prompts(&mut registry);

    info!(
        "MCP registry initialized with {} tools, {} resources and {} prompts",
        registry.tool_count(),
        registry.resource_count(),
        registry.prompt_count()
    );

    McpState {
        registry: Arc::new(registry),
        orchestrator,
    }
}
