//! Transport-independent MCP session.
//!
//! A session owns the initialization state of one client connection and
//! turns raw JSON-RPC frames into responses. Transports (WebSocket, stdio)
//! only move frames around.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::context::ToolContext;
use super::handler::{server_version, McpState, SERVER_NAME};
use super::protocol::{
    methods, InitializeParams, InitializeResult, McpError, McpNotification, McpRequest,
    McpResponse, PingResult, PromptsCapability, PromptsGetParams, PromptsListResult,
    ResourcesCapability, ResourcesListResult, ResourcesReadParams, ResourcesReadResult,
    ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCapability, ToolsListResult,
    JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
use crate::analysis::ResourceEvent;

/// Outbound frames queued per connection before notifications get dropped.
pub const OUTBOUND_QUEUE_SIZE: usize = 64;

#[derive(Clone)]
pub struct McpSession {
    state: Arc<McpState>,
    initialized: Arc<AtomicBool>,
}

impl McpSession {
    pub fn new(state: Arc<McpState>) -> Self {
        Self {
            state,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Starts forwarding resource-change notifications into `outbound`.
    /// Nothing is forwarded until the client has initialized.
    pub fn forward_notifications(&self, outbound: mpsc::Sender<String>) -> JoinHandle<()> {
        let mut events = self.state.orchestrator.notifier().subscribe();
        let initialized = self.initialized.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ResourceEvent::Created { analysis_id }) => {
                        debug!("Resource created: analysis {}", analysis_id);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Notification forwarder lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }

                if !initialized.load(Ordering::Acquire) {
                    continue;
                }

                let Some(frame) = list_changed_frame() else {
                    continue;
                };
                match outbound.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!("Outbound queue full, dropping list_changed notification");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Connection closed, stopping notification forwarding");
                        break;
                    }
                }
            }
        })
    }

    /// Handles one incoming frame and queues its response on `outbound`.
    ///
    /// Tool calls run on their own task, so a slow analysis never holds up
    /// the frames behind it. Everything else is answered before this returns,
    /// which keeps `initialize` ahead of the requests that depend on it.
    ///
    /// Returns `false` once the connection's outbound queue is closed.
    pub async fn dispatch(&self, text: &str, outbound: &mpsc::Sender<String>) -> bool {
        let request = match parse_request(text) {
            Ok(request) => request,
            Err(response) => return queue_response(outbound, &response).await,
        };

        if request.method == methods::TOOLS_CALL && request.id.is_some() {
            let session = self.clone();
            let task_outbound = outbound.clone();
            tokio::spawn(async move {
                if let Some(response) = session.handle_request(request).await {
                    queue_response(&task_outbound, &response).await;
                }
            });
            return !outbound.is_closed();
        }

        match self.handle_request(request).await {
            Some(response) => queue_response(outbound, &response).await,
            None => true,
        }
    }

    /// Handles one incoming frame. Notifications yield no response.
    pub async fn handle_message(&self, text: &str) -> Option<McpResponse> {
        match parse_request(text) {
            Ok(request) => self.handle_request(request).await,
            Err(response) => Some(response),
        }
    }

    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        let Some(request_id) = request.id.clone() else {
            match request.method.as_str() {
                methods::INITIALIZED => debug!("Client confirmed initialization"),
                other => debug!("Ignoring notification {}", other),
            }
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(McpResponse::error(
                Some(request_id),
                McpError::InvalidRequest(format!("Unsupported jsonrpc version {}", request.jsonrpc)),
            ));
        }

        // Dispatch based on method
        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(&request),
            methods::PING => to_value(PingResult {}),
            methods::SHUTDOWN => Ok(serde_json::json!({})),
            methods::TOOLS_LIST => self.gated(|| self.handle_tools_list()),
            methods::TOOLS_CALL => match self.require_initialized() {
                Ok(()) => self.handle_tools_call(&request).await,
                Err(e) => Err(e),
            },
            methods::RESOURCES_LIST => self.gated(|| self.handle_resources_list()),
            methods::RESOURCES_READ => match self.require_initialized() {
                Ok(()) => self.handle_resources_read(&request).await,
                Err(e) => Err(e),
            },
            methods::PROMPTS_LIST => self.gated(|| self.handle_prompts_list()),
            methods::PROMPTS_GET => self.gated(|| self.handle_prompts_get(&request)),
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        Some(match result {
            Ok(value) => McpResponse::success(request_id, value),
            Err(error) => McpResponse::error(Some(request_id), error),
        })
    }

    fn require_initialized(&self) -> Result<(), McpError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(McpError::InvalidRequest("Not initialized".to_string()))
        }
    }

    fn gated<F>(&self, handler: F) -> Result<Value, McpError>
    where
        F: FnOnce() -> Result<Value, McpError>,
    {
        self.require_initialized()?;
        handler()
    }

    fn context(&self) -> ToolContext {
        ToolContext::new(self.state.orchestrator.clone())
    }

    fn handle_initialize(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: Option<InitializeParams> = request
            .params
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?;
        if let Some(params) = params {
            debug!(
                "MCP client {} {} (protocol {})",
                params.client_info.name, params.client_info.version, params.protocol_version
            );
        }

        self.initialized.store(true, Ordering::Release);

        to_value(InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(true),
                }),
                prompts: Some(PromptsCapability { list_changed: None }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: server_version(),
            },
        })
    }

    fn handle_tools_list(&self) -> Result<Value, McpError> {
        to_value(ToolsListResult {
            tools: self.state.registry.get_available_tools(),
        })
    }

    async fn handle_tools_call(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: ToolsCallParams = request.parse_params()?;

        // Find the tool
        let tool = self
            .state
            .registry
            .get_tool(&params.name)
            .ok_or_else(|| McpError::MethodNotFound(format!("Unknown tool: {}", params.name)))?;

        // Execute the tool
        let arguments = params.arguments.unwrap_or(serde_json::json!({}));
        let result = (tool.handler)(self.context(), arguments).await?;

        to_value(result)
    }

    fn handle_resources_list(&self) -> Result<Value, McpError> {
        to_value(ResourcesListResult {
            resources: self.state.registry.get_available_resources(&self.context()),
        })
    }

    async fn handle_resources_read(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: ResourcesReadParams = request.parse_params()?;

        // Find matching resource
        let resource = self
            .state
            .registry
            .find_resource(&params.uri)
            .ok_or_else(|| McpError::ResourceNotFound(params.uri.clone()))?;

        // Read the resource
        let contents = (resource.handler)(self.context(), params.uri).await?;

        to_value(ResourcesReadResult { contents })
    }

    fn handle_prompts_list(&self) -> Result<Value, McpError> {
        to_value(PromptsListResult {
            prompts: self.state.registry.get_available_prompts(),
        })
    }

    fn handle_prompts_get(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: PromptsGetParams = request.parse_params()?;
        let prompt = self
            .state
            .registry
            .get_prompt(&params.name)
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown prompt: {}", params.name)))?;

        to_value((prompt.handler)(params.arguments.unwrap_or_default())?)
    }
}

fn parse_request(text: &str) -> Result<McpRequest, McpResponse> {
    serde_json::from_str(text)
        .map_err(|e| McpResponse::error(None, McpError::ParseError(e.to_string())))
}

/// Serializes and queues one response. Returns `false` if the queue is closed.
async fn queue_response(outbound: &mpsc::Sender<String>, response: &McpResponse) -> bool {
    match serde_json::to_string(response) {
        Ok(json) => outbound.send(json).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize MCP response: {}", e);
            true
        }
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}

fn list_changed_frame() -> Option<String> {
    match serde_json::to_string(&McpNotification::new(methods::RESOURCES_LIST_CHANGED)) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize MCP notification: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        Orchestrator, OrchestratorSettings, ProcessInvoker, ResultStore, ToolRegistry,
    };
    use crate::analysis::ToolOverride;
    use crate::mcp::handler::create_mcp_state;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    fn session() -> McpSession {
        let orchestrator = Orchestrator::new(
            ToolRegistry::builtin(),
            Arc::new(ProcessInvoker),
            Arc::new(ResultStore::unbounded()),
            OrchestratorSettings::default(),
        );
        McpSession::new(Arc::new(create_mcp_state(Arc::new(orchestrator))))
    }

    async fn call(session: &McpSession, id: i64, method: &str, params: Value) -> Value {
        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let response = session.handle_message(&frame.to_string()).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    async fn initialize(session: &McpSession) {
        let response = call(
            session,
            0,
            methods::INITIALIZE,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }),
        )
        .await;
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn malformed_frame_is_a_parse_error() {
        let response = session().handle_message("{nope").await.unwrap();
        assert!(response.id.is_none());
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let session = session();
        let response = call(&session, 1, methods::TOOLS_LIST, Value::Null).await;
        assert_eq!(response["error"]["code"], -32600);

        // ping works regardless
        let response = call(&session, 2, methods::PING, Value::Null).await;
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let session = session();
        let frame = json!({"jsonrpc": "2.0", "method": methods::INITIALIZED});
        assert!(session.handle_message(&frame.to_string()).await.is_none());
    }

    #[tokio::test]
    async fn lists_tools_in_registry_order() {
        let session = session();
        initialize(&session).await;

        let response = call(&session, 1, methods::TOOLS_LIST, Value::Null).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 5);
        assert_eq!(tools[0]["name"], "mythril-analyze");
        assert!(tools[0]["inputSchema"]["properties"]["max_depth"].is_object());
    }

    #[tokio::test]
    async fn tool_call_errors_map_to_protocol_codes() {
        let session = session();
        initialize(&session).await;

        let response = call(
            &session,
            1,
            methods::TOOLS_CALL,
            json!({"name": "nonexistent-tool", "arguments": {"contract_code": "contract A {}"}}),
        )
        .await;
        assert_eq!(response["error"]["code"], -32601);

        let response = call(
            &session,
            2,
            methods::TOOLS_CALL,
            json!({"name": "mythril-analyze", "arguments": {"contract_code": "contract A {}", "max_depth": 0}}),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        assert!(response["error"]["data"]["violations"].is_array());

        let response = call(
            &session,
            3,
            methods::TOOLS_CALL,
            json!({"name": "slither-analyze", "arguments": {}}),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let session = session();
        initialize(&session).await;

        let response = call(
            &session,
            1,
            methods::RESOURCES_READ,
            json!({"uri": "analysis://slither_42"}),
        )
        .await;
        assert_eq!(response["error"]["code"], -32004);

        let response = call(&session, 2, methods::RESOURCES_LIST, Value::Null).await;
        assert!(response["result"]["resources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompts_are_listed_and_rendered() {
        let session = session();
        initialize(&session).await;

        let response = call(&session, 1, methods::PROMPTS_LIST, Value::Null).await;
        assert_eq!(response["result"]["prompts"][0]["name"], "analyze-contract");

        let response = call(
            &session,
            2,
            methods::PROMPTS_GET,
            json!({"name": "analyze-contract", "arguments": {"contract_type": "DeFi"}}),
        )
        .await;
        let text = response["result"]["messages"][0]["content"]["text"]
            .as_str()
            .unwrap();
        assert!(text.contains("DeFi"));
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let session = session();
        let response = call(&session, 9, "sampling/createMessage", Value::Null).await;
        assert_eq!(response["error"]["code"], -32601);
    }

    /// A session whose slither sleeps before printing an empty report.
    fn slow_slither_session(delay_secs: f64) -> McpSession {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "slither-analyze".to_string(),
            ToolOverride {
                command: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        r#"sleep {}; echo '{{"success": true, "results": {{"detectors": []}}}}'"#,
                        delay_secs
                    ),
                    "slither".to_string(),
                ]),
                ..Default::default()
            },
        );
        let orchestrator = Orchestrator::new(
            ToolRegistry::builtin().with_overrides(&overrides).unwrap(),
            Arc::new(ProcessInvoker),
            Arc::new(ResultStore::unbounded()),
            OrchestratorSettings::default(),
        );
        McpSession::new(Arc::new(create_mcp_state(Arc::new(orchestrator))))
    }

    fn frame(id: i64, method: &str, params: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    fn initialize_frame() -> String {
        frame(
            0,
            methods::INITIALIZE,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }),
        )
    }

    fn slither_call(id: i64) -> String {
        frame(
            id,
            methods::TOOLS_CALL,
            json!({"name": "slither-analyze", "arguments": {"contract_code": "contract A {}"}}),
        )
    }

    async fn next_id(rx: &mut mpsc::Receiver<String>) -> i64 {
        let frame = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        value["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn ping_is_answered_while_a_tool_call_runs() {
        let session = slow_slither_session(1.5);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);

        assert!(session.dispatch(&initialize_frame(), &tx).await);
        assert!(session.dispatch(&slither_call(1), &tx).await);
        assert!(session.dispatch(&frame(2, methods::PING, Value::Null), &tx).await);

        assert_eq!(next_id(&mut rx).await, 0);
        assert_eq!(next_id(&mut rx).await, 2);
        assert_eq!(next_id(&mut rx).await, 1);
    }

    #[tokio::test]
    async fn tool_calls_on_one_connection_overlap() {
        let delay = Duration::from_millis(1500);
        let session = slow_slither_session(delay.as_secs_f64());
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);

        session.dispatch(&initialize_frame(), &tx).await;
        assert_eq!(next_id(&mut rx).await, 0);

        let started = Instant::now();
        session.dispatch(&slither_call(1), &tx).await;
        session.dispatch(&slither_call(2), &tx).await;

        let mut ids = vec![next_id(&mut rx).await, next_id(&mut rx).await];
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert!(started.elapsed() < delay * 2);
    }

    #[tokio::test]
    async fn dispatch_answers_parse_errors_inline() {
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        assert!(session().dispatch("{nope", &tx).await);
        let frame = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn forwards_list_changed_after_initialize() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let forwarder = session.forward_notifications(tx);
        initialize(&session).await;

        session.state.orchestrator.notifier().notify(ResourceEvent::Created {
            analysis_id: "slither_0".into(),
        });
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], methods::RESOURCES_LIST_CHANGED);
        assert!(value.get("id").is_none());
        forwarder.abort();
    }
}
