//! Analysis Resources
//!
//! Every stored result is readable as `analysis://{analysis_id}`.

use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ResourceContent, ResourceDefinition};
use crate::mcp::registry::{McpRegistry, RegisteredResource, ResourceBuilder, ResourceResult};

pub const ANALYSIS_URI_SCHEME: &str = "analysis://";

const JSON_MIME_TYPE: &str = "application/json";

/// Register analysis resources with the registry
pub fn register_resources(registry: &mut McpRegistry) {
    registry.register_resource(analysis_result_resource());
}

pub fn analysis_uri(analysis_id: &str) -> String {
    format!("{}{}", ANALYSIS_URI_SCHEME, analysis_id)
}

fn analysis_result_resource() -> RegisteredResource {
    ResourceBuilder::new("analysis://{analysis_id}", "Analysis Result")
        .description("Full stored result of one analysis run")
        .mime_type(JSON_MIME_TYPE)
        .lister(list_analysis_results)
        .build(analysis_result_handler)
}

fn list_analysis_results(ctx: &ToolContext) -> Vec<ResourceDefinition> {
    ctx.store()
        .list()
        .into_iter()
        .map(|result| ResourceDefinition {
            uri: analysis_uri(&result.analysis_id),
            name: format!("Analysis: {}", result.analysis_id),
            description: Some(format!(
                "{} result ({})",
                result.tool,
                result.status.as_str()
            )),
            mime_type: Some(JSON_MIME_TYPE.to_string()),
        })
        .collect()
}

fn extract_analysis_id(uri: &str) -> Option<&str> {
    uri.strip_prefix(ANALYSIS_URI_SCHEME)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

async fn analysis_result_handler(ctx: ToolContext, uri: String) -> ResourceResult {
    let analysis_id = extract_analysis_id(&uri)
        .ok_or_else(|| McpError::InvalidParams(format!("Invalid analysis URI: {}", uri)))?;

    let result = ctx
        .store()
        .get(analysis_id)
        .map_err(|_| McpError::ResourceNotFound(uri.clone()))?;

    let text = serde_json::to_string_pretty(&result)
        .map_err(|e| McpError::InternalError(e.to_string()))?;

    Ok(vec![ResourceContent {
        uri,
        mime_type: Some(JSON_MIME_TYPE.to_string()),
        text,
    }])
}
