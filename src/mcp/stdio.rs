//! Line-delimited MCP transport over stdin/stdout.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::connection::{McpSession, OUTBOUND_QUEUE_SIZE};
use super::handler::McpState;

/// Serves one MCP session on the process's stdin and stdout.
pub async fn serve_stdio(mcp_state: Arc<McpState>) -> Result<()> {
    info!("Serving MCP on stdio");
    serve_lines(
        mcp_state,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Reads one JSON-RPC frame per line until EOF, writing responses and
/// notifications one per line.
pub async fn serve_lines<R, W>(mcp_state: Arc<McpState>, reader: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_SIZE);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let written = async {
                output.write_all(frame.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await
            };
            if let Err(e) = written.await {
                error!("Failed to write MCP frame: {}", e);
                break;
            }
        }
    });

    let session = McpSession::new(mcp_state);
    let forwarder = session.forward_notifications(outbound_tx.clone());

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if !session.dispatch(&line, &outbound_tx).await {
            break;
        }
    }

    debug!("MCP input closed");
    forwarder.abort();
    drop(outbound_tx);
    let _ = writer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        Orchestrator, OrchestratorSettings, ProcessInvoker, ResultStore, ToolOverride,
        ToolRegistry,
    };
    use std::collections::BTreeMap;
    use crate::mcp::handler::create_mcp_state;
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn answers_each_request_line() {
        let orchestrator = Orchestrator::new(
            ToolRegistry::builtin(),
            Arc::new(ProcessInvoker),
            Arc::new(ResultStore::unbounded()),
            OrchestratorSettings::default(),
        );
        let state = Arc::new(create_mcp_state(Arc::new(orchestrator)));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"0"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let (client, server) = tokio::io::duplex(64 * 1024);
        serve_lines(state, BufReader::new(input.as_bytes()), server)
            .await
            .unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();

        let frames: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[1]["id"], 2);
        assert_eq!(frames[1]["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn slow_tool_call_does_not_hold_up_later_lines() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "slither-analyze".to_string(),
            ToolOverride {
                command: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    r#"sleep 1; echo '{"success": true, "results": {"detectors": []}}'"#.to_string(),
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
        let state = Arc::new(create_mcp_state(Arc::new(orchestrator)));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"0"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"slither-analyze","arguments":{"contract_code":"contract A {}"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let (client, server) = tokio::io::duplex(64 * 1024);
        serve_lines(state, BufReader::new(input.as_bytes()), server)
            .await
            .unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();

        let ids: Vec<i64> = output
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }
}
