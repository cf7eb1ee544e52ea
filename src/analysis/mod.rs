//! Analysis orchestration core: tool registry, process invocation, output
//! formatting and the in-memory result store.

pub mod descriptor;
pub mod error;
pub mod formatter;
pub mod invoker;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod registry;
pub mod scoring;
pub mod store;
pub mod tools;

pub use descriptor::{ParamKind, ParamSpec, ToolDescriptor, ValidatedParams};
pub use error::AnalysisError;
pub use formatter::summarize;
pub use invoker::{ProcessInvoker, ProcessRunner};
pub use models::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, BatchProgressEvent, BatchRequest, Finding,
    ProgressEvent, Severity,
};
pub use notifier::{ResourceEvent, ResourceNotifier};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use registry::{ToolOverride, ToolRegistry};
pub use store::ResultStore;
