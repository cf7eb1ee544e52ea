//! MCP Tool Execution Context
//!
//! Provides access to the analysis core for tool, resource and prompt handlers.

use std::sync::Arc;

use crate::analysis::{Orchestrator, ResultStore};

/// Context provided to tool and resource handlers during execution
#[derive(Clone)]
pub struct ToolContext {
    pub orchestrator: Arc<Orchestrator>,
}

impl ToolContext {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn store(&self) -> &ResultStore {
        self.orchestrator.store()
    }
}
