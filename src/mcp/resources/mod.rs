//! MCP Resources
//!
//! Read-only access to stored analysis results.

pub mod analysis;

use super::registry::McpRegistry;

/// Register all resources with the registry
pub fn register_all_resources(registry: &mut McpRegistry) {
    analysis::register_resources(registry);
}
