//! MCP Tool, Resource and Prompt Registry
//!
//! Manages registration and lookup of tools, resources and prompts.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::context::ToolContext;
use super::protocol::{
    McpError, PromptArgument, PromptDefinition, PromptsGetResult, ResourceContent,
    ResourceDefinition, ToolDefinition, ToolsCallResult,
};

// ============================================================================
// Tool Types
// ============================================================================

/// Result type for tool execution
pub type ToolResult = Result<ToolsCallResult, McpError>;

/// Boxed future for async tool execution
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Tool handler function type
pub type ToolHandler = Arc<dyn Fn(ToolContext, Value) -> ToolFuture + Send + Sync>;

/// A registered tool with metadata and handler
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

// ============================================================================
// Resource Types
// ============================================================================

/// Result type for resource read
pub type ResourceResult = Result<Vec<ResourceContent>, McpError>;

/// Boxed future for async resource read
pub type ResourceFuture = Pin<Box<dyn Future<Output = ResourceResult> + Send>>;

/// Resource handler function type
pub type ResourceHandler = Arc<dyn Fn(ToolContext, String) -> ResourceFuture + Send + Sync>;

/// Enumerates the concrete resources behind a URI pattern
pub type ResourceLister = Arc<dyn Fn(&ToolContext) -> Vec<ResourceDefinition> + Send + Sync>;

/// A registered resource with metadata and handler
pub struct RegisteredResource {
    pub uri_pattern: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub handler: ResourceHandler,
    /// When set, listing reports these entries instead of the pattern itself.
    pub lister: Option<ResourceLister>,
}

// ============================================================================
// Prompt Types
// ============================================================================

pub type PromptResult = Result<PromptsGetResult, McpError>;

pub type PromptHandler = Arc<dyn Fn(HashMap<String, String>) -> PromptResult + Send + Sync>;

pub struct RegisteredPrompt {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    pub handler: PromptHandler,
}

// ============================================================================
// Registry
// ============================================================================

/// Registry for MCP tools, resources and prompts
#[derive(Default)]
pub struct McpRegistry {
    tools: Vec<RegisteredTool>,
    resources: Vec<RegisteredResource>,
    prompts: Vec<RegisteredPrompt>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name
    pub fn register_tool(&mut self, tool: RegisteredTool) {
        self.tools.retain(|t| t.name != tool.name);
        self.tools.push(tool);
    }

    /// Register a resource
    pub fn register_resource(&mut self, resource: RegisteredResource) {
        self.resources.push(resource);
    }

    pub fn register_prompt(&mut self, prompt: RegisteredPrompt) {
        self.prompts.retain(|p| p.name != prompt.name);
        self.prompts.push(prompt);
    }

    /// Tool definitions in registration order
    pub fn get_available_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Resources currently available
    pub fn get_available_resources(&self, ctx: &ToolContext) -> Vec<ResourceDefinition> {
        self.resources
            .iter()
            .flat_map(|resource| match &resource.lister {
                Some(lister) => lister(ctx),
                None => vec![ResourceDefinition {
                    uri: resource.uri_pattern.clone(),
                    name: resource.name.clone(),
                    description: resource.description.clone(),
                    mime_type: resource.mime_type.clone(),
                }],
            })
            .collect()
    }

    /// Find a resource handler for a URI
    pub fn find_resource(&self, uri: &str) -> Option<&RegisteredResource> {
        self.resources
            .iter()
            .find(|resource| matches_uri_pattern(&resource.uri_pattern, uri))
    }

    pub fn get_available_prompts(&self) -> Vec<PromptDefinition> {
        self.prompts
            .iter()
            .map(|prompt| PromptDefinition {
                name: prompt.name.clone(),
                description: prompt.description.clone(),
                arguments: prompt.arguments.clone(),
            })
            .collect()
    }

    pub fn get_prompt(&self, name: &str) -> Option<&RegisteredPrompt> {
        self.prompts.iter().find(|prompt| prompt.name == name)
    }

    /// Get the number of registered tools
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Get the number of registered resources
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }
}

/// Check if a URI matches a pattern with {param} placeholders
fn matches_uri_pattern(pattern: &str, uri: &str) -> bool {
    // Pattern: analysis://{analysis_id}
    // URI: analysis://slither_0

    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();

    if pattern_parts.len() != uri_parts.len() {
        return false;
    }

    for (pattern_part, uri_part) in pattern_parts.iter().zip(uri_parts.iter()) {
        if pattern_part.starts_with('{') && pattern_part.ends_with('}') {
            // Parameter placeholder - matches any non-empty segment
            if uri_part.is_empty() {
                return false;
            }
            continue;
        }
        if pattern_part != uri_part {
            return false;
        }
    }

    true
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for registering a tool
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredTool
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        RegisteredTool {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            handler: Arc::new(move |ctx, params| Box::pin(handler(ctx, params))),
        }
    }
}

/// Builder for registering a resource
pub struct ResourceBuilder {
    uri_pattern: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    lister: Option<ResourceLister>,
}

impl ResourceBuilder {
    pub fn new(uri_pattern: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri_pattern: uri_pattern.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            lister: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn lister<L>(mut self, lister: L) -> Self
    where
        L: Fn(&ToolContext) -> Vec<ResourceDefinition> + Send + Sync + 'static,
    {
        self.lister = Some(Arc::new(lister));
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredResource
    where
        F: Fn(ToolContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResourceResult> + Send + 'static,
    {
        RegisteredResource {
            uri_pattern: self.uri_pattern,
            name: self.name,
            description: self.description,
            mime_type: self.mime_type,
            handler: Arc::new(move |ctx, uri| Box::pin(handler(ctx, uri))),
            lister: self.lister,
        }
    }
}

/// Builder for registering a prompt
pub struct PromptBuilder {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
}

impl PromptBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn argument(mut self, name: &str, description: &str, required: bool) -> Self {
        self.arguments.push(PromptArgument {
            name: name.to_string(),
            description: Some(description.to_string()),
            required,
        });
        self
    }

    pub fn build<F>(self, handler: F) -> RegisteredPrompt
    where
        F: Fn(HashMap<String, String>) -> PromptResult + Send + Sync + 'static,
    {
        RegisteredPrompt {
            name: self.name,
            description: self.description,
            arguments: self.arguments,
            handler: Arc::new(handler),
        }
    }
}
