//! Coordinates registry lookup, invocation, formatting and storage.
//!
//! Every request goes through [`Orchestrator::prepare`] first. Validation
//! errors are returned from there, before any identifier is allocated or any
//! process spawned. From then on a run always ends in a terminal result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use super::descriptor::ValidatedParams;
use super::error::AnalysisError;
use super::formatter::{format_output, FormattedOutput};
use super::invoker::{ContractWorkspace, Invocation, InvokeError, ProcessOutput, ProcessRunner};
use super::models::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, BatchProgressEvent, BatchRequest,
    ProgressEvent, SourceSpec,
};
use super::notifier::{ResourceEvent, ResourceNotifier};
use super::registry::{RegisteredTool, ToolRegistry};
use super::scoring;
use super::store::ResultStore;

/// Most stderr carried into a failure message.
const STDERR_EXCERPT_CHARS: usize = 500;

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Wall-clock budget for tools without their own configured timeout.
    pub default_timeout: Duration,
    /// Maximum number of external processes running at once.
    pub max_concurrent_runs: usize,
    /// Interval between `running` events of a streamed run.
    pub heartbeat_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            max_concurrent_runs: 4,
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// A request that passed validation and is ready to run.
pub struct PreparedRun {
    tool: Arc<RegisteredTool>,
    params: ValidatedParams,
    source: SourceSpec,
}

impl PreparedRun {
    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }
}

type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

pub struct Orchestrator {
    registry: ToolRegistry,
    runner: Arc<dyn ProcessRunner>,
    store: Arc<ResultStore>,
    notifier: ResourceNotifier,
    permits: Semaphore,
    next_index: Mutex<HashMap<String, u64>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        registry: ToolRegistry,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<ResultStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            runner,
            store,
            notifier: ResourceNotifier::new(),
            permits: Semaphore::new(settings.max_concurrent_runs.max(1)),
            next_index: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn notifier(&self) -> &ResourceNotifier {
        &self.notifier
    }

    /// Validates tool, parameters and source, in that order.
    pub fn prepare(&self, request: &AnalysisRequest) -> Result<PreparedRun, AnalysisError> {
        let tool = self.registry.get(&request.tool)?;
        let params = tool.descriptor().validate(&request.options)?;
        let source = request.source()?;
        Ok(PreparedRun {
            tool,
            params,
            source,
        })
    }

    /// Runs one tool to completion.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let run = self.prepare(request)?;
        Ok(self.execute(run, None).await)
    }

    /// Runs every tool of the batch concurrently. Results come back in the
    /// order the tools were requested.
    pub async fn run_batch(&self, batch: &BatchRequest) -> Result<Vec<AnalysisResult>, AnalysisError> {
        let runs = self.prepare_batch(batch)?;
        info!("Running batch of {} tools", runs.len());
        Ok(join_all(runs.into_iter().map(|run| self.execute(run, None))).await)
    }

    /// Starts a run in the background and returns its progress events.
    ///
    /// The run continues to completion and is stored even if the returned
    /// stream is dropped early.
    pub fn run_streaming(
        self: &Arc<Self>,
        request: &AnalysisRequest,
    ) -> Result<BoxStream<'static, ProgressEvent>, AnalysisError> {
        let run = self.prepare(request)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            emit(
                &event_tx,
                ProgressEvent::Starting {
                    tool: run.tool_name().to_string(),
                },
            );
            let result = orchestrator.execute(run, Some(&event_tx)).await;
            let analysis_id = result.analysis_id.clone();
            let status = result.status;
            emit(
                &event_tx,
                ProgressEvent::Result {
                    analysis_id: analysis_id.clone(),
                    payload: Box::new(result),
                },
            );
            emit(&event_tx, ProgressEvent::Complete { analysis_id, status });
        });

        Ok(receiver_stream(event_rx))
    }

    /// Runs the batch one tool at a time, reporting each step.
    pub fn run_batch_streaming(
        self: &Arc<Self>,
        batch: &BatchRequest,
    ) -> Result<BoxStream<'static, BatchProgressEvent>, AnalysisError> {
        let runs = self.prepare_batch(batch)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let total = runs.len();
            emit(&event_tx, BatchProgressEvent::Starting { total_tools: total });

            let mut analysis_ids = Vec::with_capacity(total);
            for (i, run) in runs.into_iter().enumerate() {
                let tool = run.tool_name().to_string();
                emit(
                    &event_tx,
                    BatchProgressEvent::Running {
                        tool: tool.clone(),
                        index: i + 1,
                        total,
                    },
                );
                let result = orchestrator.execute(run, None).await;
                analysis_ids.push(result.analysis_id.clone());
                emit(
                    &event_tx,
                    BatchProgressEvent::ToolResult {
                        tool,
                        payload: Box::new(result),
                    },
                );
            }

            emit(&event_tx, BatchProgressEvent::Complete { analysis_ids });
        });

        Ok(receiver_stream(event_rx))
    }

    /// Validates every tool of a batch up front. Parameter violations of all
    /// tools are reported together, prefixed with the tool name.
    fn prepare_batch(&self, batch: &BatchRequest) -> Result<Vec<PreparedRun>, AnalysisError> {
        if batch.tools.is_empty() {
            return Err(AnalysisError::InvalidRequest(
                "At least one tool must be requested".to_string(),
            ));
        }

        let mut runs = Vec::with_capacity(batch.tools.len());
        let mut violations = Vec::new();
        for request in batch.requests() {
            match self.prepare(&request) {
                Ok(run) => runs.push(run),
                Err(AnalysisError::InvalidParameters(found)) => violations.extend(
                    found
                        .into_iter()
                        .map(|v| format!("{}: {}", request.tool, v)),
                ),
                Err(other) => return Err(other),
            }
        }

        if violations.is_empty() {
            Ok(runs)
        } else {
            Err(AnalysisError::InvalidParameters(violations))
        }
    }

    fn allocate_id(&self, prefix: &str) -> String {
        let mut next_index = self
            .next_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let index = next_index.entry(prefix.to_string()).or_insert(0);
        let id = format!("{}_{}", prefix, index);
        *index += 1;
        id
    }

    /// Writes the local copy of a result back to the store.
    fn record(&self, result: &AnalysisResult) {
        if let Err(e) = self
            .store
            .update(&result.analysis_id, |stored| *stored = result.clone())
        {
            error!("Could not record analysis {}: {}", result.analysis_id, e);
        }
    }

    async fn execute(&self, run: PreparedRun, progress: Option<&ProgressSender>) -> AnalysisResult {
        let tool_name = run.tool_name().to_string();
        let analysis_id = self.allocate_id(run.tool.descriptor().id_prefix());
        let mut result =
            AnalysisResult::pending(&analysis_id, &tool_name, run.params.as_map().clone());

        if let Err(e) = self.store.put(result.clone()) {
            error!("Could not store analysis {}: {}", analysis_id, e);
        } else {
            self.notifier.notify(ResourceEvent::Created {
                analysis_id: analysis_id.clone(),
            });
        }
        info!("Analysis {} created for {}", analysis_id, tool_name);

        // The semaphore is never closed, so acquiring only waits.
        let _permit = self.permits.acquire().await.ok();

        result.status = AnalysisStatus::Running;
        result.started_at = Some(Utc::now());
        self.record(&result);
        if let Some(event_tx) = progress {
            emit(
                event_tx,
                ProgressEvent::Running {
                    tool: tool_name.clone(),
                    message: format!("Running {}", tool_name),
                    elapsed_secs: 0,
                },
            );
        }

        match self.invoke(&run, progress).await {
            Ok(formatted) => apply_formatted(&mut result, formatted),
            Err(err) => apply_error(&mut result, err),
        }
        result.finished_at = Some(Utc::now());
        self.record(&result);

        match result.status {
            AnalysisStatus::Completed => info!(
                "Analysis {} completed with {} findings",
                analysis_id,
                result.findings.len()
            ),
            _ => warn!(
                "Analysis {} failed: {}",
                analysis_id,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
        result
    }

    async fn invoke(
        &self,
        run: &PreparedRun,
        progress: Option<&ProgressSender>,
    ) -> Result<FormattedOutput, AnalysisError> {
        let workspace = ContractWorkspace::prepare(&run.source).await.map_err(|e| {
            AnalysisError::ExecutionFailure(format!("could not prepare contract source: {}", e))
        })?;

        let adapter = run.tool.adapter();
        let timeout = match run.tool.timeout() {
            Some(configured) => configured,
            None => adapter.time_budget(&run.params, self.settings.default_timeout),
        };
        let args = adapter.build_args(workspace.contract_path(), &run.params);
        let invocation = Invocation::new(run.tool.command(), args, timeout)
            .ok_or_else(|| {
                AnalysisError::ExecutionFailure(format!("no command configured for {}", run.tool_name()))
            })?
            .in_dir(workspace.working_dir());

        info!(
            "Invoking {} {:?} in {:?}",
            invocation.program, invocation.args, invocation.working_dir
        );
        let outcome = match progress {
            Some(event_tx) => self.run_with_heartbeats(&invocation, run.tool_name(), event_tx).await,
            None => self.runner.run(&invocation).await,
        };
        let output = outcome.map_err(|e| match e {
            InvokeError::Timeout { secs } => AnalysisError::Timeout { secs },
            other => AnalysisError::ExecutionFailure(other.to_string()),
        })?;
        debug!(
            "{} finished with exit code {:?} in {:?}",
            run.tool_name(),
            output.exit_code,
            output.duration
        );

        // The workspace lives until formatting is done; dropping it removes any
        // temporary source.
        let formatted = format_output(adapter, &run.params, &output);
        drop(workspace);
        Ok(formatted)
    }

    async fn run_with_heartbeats(
        &self,
        invocation: &Invocation,
        tool_name: &str,
        event_tx: &ProgressSender,
    ) -> Result<ProcessOutput, InvokeError> {
        let started = Instant::now();
        let interval = self.settings.heartbeat_interval.max(MIN_HEARTBEAT);
        let mut heartbeat = interval_at(started + interval, interval);
        let running = self.runner.run(invocation);
        tokio::pin!(running);

        loop {
            tokio::select! {
                outcome = &mut running => return outcome,
                _ = heartbeat.tick() => {
                    let elapsed_secs = started.elapsed().as_secs();
                    emit(event_tx, ProgressEvent::Running {
                        tool: tool_name.to_string(),
                        message: format!("{} still running ({}s)", tool_name, elapsed_secs),
                        elapsed_secs,
                    });
                }
            }
        }
    }
}

fn apply_formatted(result: &mut AnalysisResult, formatted: FormattedOutput) {
    result.success = formatted.success;
    result.findings = formatted.findings;
    result.raw_output = formatted.raw_output;
    result.structured_output = formatted.structured_output;
    result.stderr = formatted.stderr;
    result.exit_code = formatted.exit_code;
    result.annotations = formatted.annotations;
    result.risk_score = Some(formatted.risk_score);

    if result.success {
        result.status = AnalysisStatus::Completed;
        return;
    }

    result.status = AnalysisStatus::Failed;
    let code = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let excerpt: String = result
        .stderr
        .as_deref()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(STDERR_EXCERPT_CHARS)
        .collect();
    let message = if excerpt.is_empty() {
        format!("{} exited with status {}", result.tool, code)
    } else {
        format!("{} exited with status {}: {}", result.tool, code, excerpt)
    };
    let error = AnalysisError::ExecutionFailure(message).to_string();
    if result.raw_output.trim().is_empty() {
        result.raw_output = error.clone();
    }
    result.error = Some(error);
}

fn apply_error(result: &mut AnalysisResult, err: AnalysisError) {
    let message = err.to_string();
    result.status = AnalysisStatus::Failed;
    result.success = false;
    result.risk_score = Some(scoring::FAILED_SCORE);
    result.raw_output = message.clone();
    result.error = Some(message);
}

fn emit<T: std::fmt::Debug>(event_tx: &mpsc::UnboundedSender<T>, event: T) {
    if let Err(e) = event_tx.send(event) {
        debug!("Progress listener went away, dropping {:?}", e.0);
    }
}

fn receiver_stream<T: Send + 'static>(event_rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(event_rx, |mut event_rx| async move {
        event_rx.recv().await.map(|event| (event, event_rx))
    })
    .boxed()
}
