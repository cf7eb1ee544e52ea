//! MCP Tools
//!
//! One protocol tool per registered analysis tool.

pub mod analyze;

use super::registry::McpRegistry;
use crate::analysis::ToolRegistry;

/// Register all tools with the registry
pub fn register_all_tools(registry: &mut McpRegistry, analysis_tools: &ToolRegistry) {
    analyze::register_tools(registry, analysis_tools);
}
