//! MCP (Model Context Protocol) Streamable HTTP support.
//!
//! Sessions are multiplexed over one HTTP endpoint. A client starts with an
//! `initialize` request, receives a session id in the `mcp-session-id`
//! header, and repeats that header on every later call. Each session owns a
//! [`StreamableHttpTransport`] and the [`CallContext`](crate::auth::CallContext)
//! captured during its handshake.
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC requests (JSON reply, or SSE for streamed tool calls)
//! - `GET /mcp` - Open the standalone SSE stream of a session
//! - `DELETE /mcp` - Terminate a session

pub mod emit;
pub mod handler;
pub mod pipeline;
pub mod resource;
pub mod schema;
pub mod service;
pub mod session;
pub mod tools;
pub mod transport;

pub use emit::{EmitKind, EmitOptions, Emitter};
pub use handler::{McpHandler, ServerInfo};
pub use service::McpService;
pub use session::{Session, SessionRegistry};
pub use tools::{Tool, ToolRegistry};
pub use transport::{ResponseSink, StreamableHttpTransport, TransportError};
