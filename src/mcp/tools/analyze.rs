//! Analysis Tools
//!
//! Exposes every analysis tool under its own name. Arguments are flat: the
//! contract source fields sit next to the tool's own parameters.

use serde_json::{Map, Value};
use tracing::debug;

use crate::analysis::{summarize, AnalysisRequest, AnalysisStatus, ToolDescriptor, ToolRegistry};
use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ToolsCallResult};
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolBuilder, ToolResult};

const SOURCE_FIELDS: [&str; 4] = ["contract_code", "source", "contract_file", "file_path"];

/// Register analysis tools with the registry
pub fn register_tools(registry: &mut McpRegistry, analysis_tools: &ToolRegistry) {
    for descriptor in analysis_tools.list() {
        registry.register_tool(analysis_tool(descriptor));
    }
}

fn analysis_tool(descriptor: &ToolDescriptor) -> RegisteredTool {
    let tool_name = descriptor.name.clone();
    ToolBuilder::new(descriptor.name.clone())
        .description(descriptor.description.clone())
        .input_schema(descriptor.input_schema())
        .build(move |ctx, args| run_analysis(ctx, tool_name.clone(), args))
}

async fn run_analysis(ctx: ToolContext, tool: String, arguments: Value) -> ToolResult {
    let request = request_from_arguments(tool, arguments)?;
    let result = ctx.orchestrator.run(&request).await?;
    debug!(
        "MCP call {} finished as {}",
        result.analysis_id,
        result.status.as_str()
    );

    let summary = summarize(&result);
    Ok(match result.status {
        AnalysisStatus::Completed => ToolsCallResult::text(summary),
        _ => ToolsCallResult::error(summary),
    })
}

/// Splits flat tool arguments into the contract source and tool options.
/// A nested `options` object is accepted as well.
fn request_from_arguments(tool: String, arguments: Value) -> Result<AnalysisRequest, McpError> {
    let mut arguments = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(McpError::InvalidParams(format!(
                "Arguments must be an object, got {}",
                other
            )))
        }
    };

    let mut take_string = |keys: [&str; 2]| -> Result<Option<String>, McpError> {
        let mut found = None;
        for key in keys {
            match arguments.remove(key) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => found = found.or(Some(s)),
                Some(_) => {
                    return Err(McpError::InvalidParams(format!("{} must be a string", key)))
                }
            }
        }
        Ok(found)
    };
    let contract_code = take_string([SOURCE_FIELDS[0], SOURCE_FIELDS[1]])?;
    let contract_file = take_string([SOURCE_FIELDS[2], SOURCE_FIELDS[3]])?;

    let mut options = match arguments.remove("options") {
        Some(Value::Object(nested)) => nested,
        None | Some(Value::Null) => Map::new(),
        Some(_) => return Err(McpError::InvalidParams("options must be an object".to_string())),
    };
    options.extend(arguments);

    Ok(AnalysisRequest {
        contract_code,
        contract_file,
        tool,
        options,
    })
}
