//! Test server spawning and lifecycle management

use super::constants::*;
use super::fixtures::FakeTools;
use blockchain_vuln_analyzer::analysis::{
    Orchestrator, OrchestratorSettings, ProcessInvoker, ResultStore, ToolRegistry,
};
use blockchain_vuln_analyzer::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Test server instance wrapping a running vuln-analyzer server
///
/// Every analysis tool is a fake from [`FakeTools`]. The server is shut down
/// and the fakes removed when this value is dropped.
pub struct TestServer {
    /// Base URL of the server (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// WebSocket URL of the MCP endpoint
    pub mcp_url: String,

    /// Port the server is listening on
    pub port: u16,

    pub orchestrator: Arc<Orchestrator>,

    pub tools: FakeTools,

    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server with fake tools
    ///
    /// # Panics
    ///
    /// Panics if the fake tools cannot be installed or the server doesn't
    /// become ready within the timeout.
    pub async fn spawn() -> Self {
        let tools = FakeTools::install().expect("Failed to install fake tools");

        let registry = ToolRegistry::builtin()
            .with_overrides(&tools.overrides())
            .expect("Failed to configure fake tools");
        let settings = OrchestratorSettings {
            default_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_concurrent_runs: 4,
            heartbeat_interval: Duration::from_secs(1),
        };
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            Arc::new(ProcessInvoker),
            Arc::new(ResultStore::unbounded()),
            settings,
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            host: "127.0.0.1".to_string(),
            port,
        };
        let app = make_app(config, orchestrator.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let base_url = format!("http://127.0.0.1:{}", port);
        let mcp_url = format!("ws://127.0.0.1:{}/mcp", port);

        wait_for_ready(&base_url).await;

        Self {
            base_url,
            mcp_url,
            port,
            orchestrator,
            tools,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn wait_for_ready(base_url: &str) {
    let client = reqwest::Client::new();
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

    loop {
        if start.elapsed() > timeout {
            panic!(
                "Server failed to become ready within {}ms",
                SERVER_READY_TIMEOUT_MS
            );
        }

        if let Ok(response) = client.get(base_url).send().await {
            if response.status().is_success() {
                return;
            }
        }

        tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
    }
}
