//! MCP (Model Context Protocol) Server
//!
//! Exposes every analysis tool as an MCP tool, stored results as
//! `analysis://{id}` resources and an analysis prompt.
//!
//! ## Architecture
//!
//! - Transports: WebSocket at `/mcp`, or line-delimited stdin/stdout
//! - Sessions: [`connection::McpSession`] handles frames for either transport
//! - Notifications: `notifications/resources/list_changed` when a result is stored

pub mod connection;
pub mod context;
pub mod handler;
pub mod prompts;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod stdio;
pub mod tools;

pub use connection::McpSession;
pub use handler::{create_mcp_state, mcp_handler, McpState};
pub use protocol::{McpError, McpRequest, McpResponse};
pub use registry::McpRegistry;
pub use stdio::serve_stdio;
