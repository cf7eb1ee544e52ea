//! HTTP client wrapper for end-to-end tests

use super::constants::*;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

/// One server-sent event
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

/// HTTP client for the analysis API
pub struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self { client, base_url }
    }

    // ========================================================================
    // Service
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(&self.base_url)
            .send()
            .await
            .expect("Home request failed")
    }

    /// GET /tools
    pub async fn get_tools(&self) -> Response {
        self.client
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .expect("Tools request failed")
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// POST /analyze with inline source and no options
    pub async fn analyze(&self, tool: &str, code: &str) -> Response {
        self.analyze_json(json!({"tool": tool, "contract_code": code}))
            .await
    }

    /// POST /analyze with an arbitrary body
    pub async fn analyze_json(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/analyze", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Analyze request failed")
    }

    /// POST /analyze with a raw, possibly malformed body
    pub async fn analyze_raw(&self, body: &str) -> Response {
        self.client
            .post(format!("{}/analyze", self.base_url))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Analyze request failed")
    }

    /// POST /analyze/stream
    pub async fn analyze_stream(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/analyze/stream", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Analyze stream request failed")
    }

    /// POST /analyze/batch
    pub async fn analyze_batch(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/analyze/batch", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Batch request failed")
    }

    /// POST /analyze/batch/stream
    pub async fn analyze_batch_stream(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/analyze/batch/stream", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Batch stream request failed")
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// GET /results
    pub async fn list_results(&self) -> Response {
        self.client
            .get(format!("{}/results", self.base_url))
            .send()
            .await
            .expect("Results request failed")
    }

    /// GET /results/{id}
    pub async fn get_result(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/results/{}", self.base_url, id))
            .send()
            .await
            .expect("Result request failed")
    }
}

/// Reads an SSE response to the end and returns its events in order.
///
/// Keep-alive comments are skipped.
pub async fn read_events(response: Response) -> Vec<SseEvent> {
    let body = response.text().await.expect("Failed to read SSE body");
    parse_events(&body)
}

fn parse_events(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    for block in body.split("\n\n") {
        let mut name = None;
        let mut data = String::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push_str(value.trim_start());
            }
        }
        if let Some(event) = name {
            let data = serde_json::from_str(&data).expect("SSE data is not JSON");
            events.push(SseEvent { event, data });
        }
    }
    events
}

impl SseEvent {
    pub fn names(events: &[SseEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event.as_str()).collect()
    }
}
