//! Tool invocation pipeline.
//!
//! Runs one resolved, validated `tools/call` against its session: looks up
//! the context captured at handshake, binds an [`Emitter`] to the session's
//! transport, awaits the handler, and normalizes the outcome into a
//! [`CallToolResult`]. Handler failures become `isError` results, never
//! transport errors.

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use toolmux_types::CallToolResult;
use tracing::{debug, warn};

use super::emit::Emitter;
use super::session::SessionRegistry;
use super::tools::Tool;

/// Why a call could not reach its handler.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Session ID is required")]
    MissingSession,

    #[error("Params not found for session ID")]
    MissingContext,
}

/// Correlation data for one in-flight call.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub request_id: Option<Value>,
    pub session_id: Option<String>,
    pub progress_token: Option<Value>,
}

#[derive(Clone)]
pub struct ToolPipeline {
    sessions: SessionRegistry,
}

impl ToolPipeline {
    pub fn new(sessions: SessionRegistry) -> Self {
        Self { sessions }
    }

    /// Run `tool` with already validated `input`.
    pub async fn invoke(
        &self,
        tool: Arc<dyn Tool>,
        input: Value,
        invocation: Invocation,
    ) -> Result<CallToolResult, PipelineError> {
        let session_id = invocation
            .session_id
            .as_deref()
            .ok_or(PipelineError::MissingSession)?;
        let session = self
            .sessions
            .peek(session_id)
            .ok_or(PipelineError::MissingContext)?;

        let emitter = Emitter::new(
            Some(session.transport.clone()),
            invocation.progress_token,
            invocation.request_id,
        );

        debug!("MCP: Calling tool {} for session {}", tool.name(), session_id);
        let outcome = AssertUnwindSafe(tool.handle(input, &session.context, &emitter))
            .catch_unwind()
            .await;
        session.touch();

        Ok(match outcome {
            Ok(Ok(response)) => CallToolResult::success(response.into_content()),
            Ok(Err(e)) => {
                warn!("MCP: Tool {} failed: {}", tool.name(), e);
                CallToolResult::error_text(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("MCP: Tool {} panicked: {}", tool.name(), message);
                CallToolResult::error_text(message)
            }
        })
    }
}

/// Text of a panic payload, as carried by `panic!` with a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool handler panicked".to_string()
    }
}
