//! Analysis API routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;

use crate::analysis::{AnalysisRequest, AnalysisResult, BatchRequest, ToolDescriptor};

use super::error::ApiError;
use super::state::{GuardedOrchestrator, ServerState};

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct ToolsResponse {
    tools: Vec<ToolDescriptor>,
}

#[derive(Serialize)]
struct ResultsResponse {
    results: Vec<AnalysisResult>,
}

fn to_event<T: Serialize>(phase: &'static str, payload: &T) -> Event {
    let json = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(phase).data(json)
}

/// GET /tools
async fn list_tools(State(orchestrator): State<GuardedOrchestrator>) -> Json<ToolsResponse> {
    let tools = orchestrator
        .registry()
        .list()
        .into_iter()
        .cloned()
        .collect();
    Json(ToolsResponse { tools })
}

/// POST /analyze
async fn analyze(
    State(orchestrator): State<GuardedOrchestrator>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(request) = body?;
    let result = orchestrator.run(&request).await?;
    Ok(Json(result))
}

/// POST /analyze/stream
async fn analyze_stream(
    State(orchestrator): State<GuardedOrchestrator>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = body?;
    let events = orchestrator.run_streaming(&request)?;
    debug!("Streaming {} analysis", request.tool);

    let stream = events.map(|event| Ok(to_event(event.phase(), &event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

/// POST /analyze/batch
async fn analyze_batch(
    State(orchestrator): State<GuardedOrchestrator>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let Json(batch) = body?;
    let results = orchestrator.run_batch(&batch).await?;
    Ok(Json(ResultsResponse { results }))
}

/// POST /analyze/batch/stream
async fn analyze_batch_stream(
    State(orchestrator): State<GuardedOrchestrator>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(batch) = body?;
    let events = orchestrator.run_batch_streaming(&batch)?;

    let stream = events.map(|event| Ok(to_event(event.phase(), &event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

/// GET /results
async fn list_results(State(orchestrator): State<GuardedOrchestrator>) -> Json<ResultsResponse> {
    Json(ResultsResponse {
        results: orchestrator.store().list(),
    })
}

/// GET /results/{id}
async fn get_result(
    State(orchestrator): State<GuardedOrchestrator>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    Ok(Json(orchestrator.store().get(&id)?))
}

pub fn make_analysis_routes(state: ServerState) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/analyze", post(analyze))
        .route("/analyze/stream", post(analyze_stream))
        .route("/analyze/batch", post(analyze_batch))
        .route("/analyze/batch/stream", post(analyze_batch_stream))
        .route("/results", get(list_results))
        .route("/results/{id}", get(get_result))
        .with_state(state)
}
