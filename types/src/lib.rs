//! Shared wire types for the toolmux MCP server.
//!
//! This crate contains the JSON-RPC envelopes, tool catalog shapes, and
//! content blocks exchanged between the server and its clients.

/// Default port for the toolmux server.
pub const DEFAULT_PORT: u16 = 8080;

/// HTTP header carrying the session id after the handshake.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// MCP protocol version advertised during `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub mod content;
pub mod jsonrpc;
pub mod notification;
pub mod tool;

// Re-export commonly used types
pub use content::{
    CallToolResult, ContentBlock, EmbeddedResource, ImageContent, ResourceContent, ToolResponse,
};
pub use jsonrpc::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutboundMessage,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_SESSION, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use notification::{LogLevel, LogParams, ProgressParams, LOG_METHOD, PROGRESS_METHOD};
pub use tool::{RequestMeta, ToolCallParams, ToolDefinition, ToolExposure};
