//! MCP JSON-RPC request handler.
//!
//! Answers the protocol methods forwarded by a bound transport and resolves
//! `tools/call` to a registered tool before handing it to the pipeline.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use toolmux_types::{
    CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallParams,
    PROTOCOL_VERSION,
};
use tracing::{debug, error, info};

use super::pipeline::{Invocation, ToolPipeline};
use super::schema::Validator;
use super::tools::{Tool, ToolRegistry};

pub const INITIALIZE_METHOD: &str = "initialize";
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Name and version reported in the handshake.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "toolmux".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Per-request data supplied by the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    pub session_id: Option<String>,
}

struct ResolvedTool {
    tool: Arc<dyn Tool>,
    input: Validator,
}

/// MCP protocol method dispatcher.
pub struct McpHandler {
    info: ServerInfo,
    registry: Arc<ToolRegistry>,
    tools: HashMap<String, ResolvedTool>,
    pipeline: ToolPipeline,
}

impl McpHandler {
    /// Build the handler. Input validators are compiled once here; a tool
    /// whose schema cannot be converted is left out.
    pub fn new(info: ServerInfo, registry: Arc<ToolRegistry>, pipeline: ToolPipeline) -> Self {
        let mut tools = HashMap::new();
        for tool in registry.for_mcp() {
            match Validator::object_from_schema(&tool.input_schema()) {
                Ok(input) => {
                    tools.insert(tool.name().to_string(), ResolvedTool { tool, input });
                }
                Err(e) => error!("MCP: Skipping tool {}: {}", tool.name(), e),
            }
        }

        Self {
            info,
            registry,
            tools,
            pipeline,
        }
    }

    /// Handle a request. Returns `None` for notifications.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        scope: RequestScope,
    ) -> Option<JsonRpcResponse> {
        if request.id.is_none() || request.has_notification_method() {
            self.handle_notification(&request, &scope);
            return None;
        }

        let id = request.id_or_null();
        debug!("MCP: Handling method: {}", request.method);

        let outcome = match request.method.as_str() {
            INITIALIZE_METHOD => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_list_tools()),
            "tools/call" => self.handle_call_tool(&request, scope).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "logging/setLevel" => {
                let level = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("level"))
                    .and_then(Value::as_str)
                    .unwrap_or("info");
                info!("MCP: Client requested log level {}", level);
                Ok(json!({}))
            }
            method => Err(JsonRpcError::method_not_found(
                method,
                scope.session_id.as_deref(),
            )),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    /// Notifications never produce a reply.
    pub fn handle_notification(&self, request: &JsonRpcRequest, scope: &RequestScope) {
        match request.method.as_str() {
            INITIALIZED_NOTIFICATION => {
                debug!("MCP: Client initialized session {:?}", scope.session_id)
            }
            "notifications/cancelled" => {
                debug!("MCP: Client cancelled a request on {:?}", scope.session_id)
            }
            other => debug!("MCP: Ignoring notification {}", other),
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": {},
                "prompts": {},
                "logging": {}
            },
            "serverInfo": self.info,
        })
    }

    fn handle_list_tools(&self) -> Value {
        let tools: Vec<_> = self
            .registry
            .catalog()
            .into_iter()
            .filter(|definition| self.tools.contains_key(&definition.name))
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_call_tool(
        &self,
        request: &JsonRpcRequest,
        scope: RequestScope,
    ) -> Result<Value, JsonRpcError> {
        let params: ToolCallParams =
            serde_json::from_value(request.params.clone().unwrap_or_else(|| json!({})))
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))?;

        let resolved = self.tools.get(&params.name).ok_or_else(|| {
            JsonRpcError::invalid_params(format!("Tool {} not found", params.name))
        })?;

        let arguments = params.arguments.clone().unwrap_or_else(|| json!({}));
        let input = resolved.input.validate(&arguments).map_err(|e| {
            let message = format!("Invalid arguments for tool {}: {}", params.name, e);
            JsonRpcError::invalid_params(message)
        })?;

        let invocation = Invocation {
            request_id: request.id.clone(),
            session_id: scope.session_id,
            progress_token: params.progress_token().cloned(),
        };

        let result = match self
            .pipeline
            .invoke(resolved.tool.clone(), input, invocation)
            .await
        {
            Ok(result) => result,
            Err(e) => CallToolResult::error_text(e.to_string()),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }
}
