//! Tool descriptors and the registry that exposes them per channel.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use toolmux_types::{ToolDefinition, ToolExposure, ToolResponse};
use tracing::{debug, warn};

use super::emit::Emitter;
use crate::auth::CallContext;

/// A named, schema-described server capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments. Must be an object schema.
    fn input_schema(&self) -> Value;

    fn output_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    fn exposure(&self) -> ToolExposure {
        ToolExposure::default()
    }

    /// Run the tool with validated input and the session's context.
    async fn handle(
        &self,
        input: Value,
        context: &CallContext,
        emit: &Emitter,
    ) -> anyhow::Result<ToolResponse>;
}

/// Registered tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("Tool '{}' registered twice, keeping the last one", name);
        } else {
            debug!("Registered tool '{}'", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All tools, sorted by name.
    pub fn get_all(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn for_mcp(&self) -> Vec<Arc<dyn Tool>> {
        self.get_all()
            .into_iter()
            .filter(|t| t.exposure().mcp())
            .collect()
    }

    pub fn for_openai(&self) -> Vec<Arc<dyn Tool>> {
        self.get_all()
            .into_iter()
            .filter(|t| t.exposure().openai())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `tools/list` entries for the MCP channel.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.for_mcp()
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: strip_schema_id(tool.input_schema()),
                output_schema: Some(strip_schema_id(tool.output_schema())),
            })
            .collect()
    }

    /// Discriminated union of every exposed tool call:
    /// `{id, name: <literal>, parameters}`.
    pub fn toolcall_schema(&self) -> Value {
        let variants: Vec<Value> = self
            .for_mcp()
            .iter()
            .map(|tool| {
                json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "number" },
                        "name": { "const": tool.name() },
                        "parameters": strip_schema_id(tool.input_schema()),
                    },
                    "required": ["id", "name", "parameters"],
                    "additionalProperties": false,
                })
            })
            .collect();

        json!({ "$id": "McpData", "anyOf": variants })
    }

    /// Catalog shape of every exposed tool, for downstream clients.
    pub fn tools_schema(&self) -> Value {
        let variants: Vec<Value> = self
            .for_mcp()
            .iter()
            .map(|tool| {
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "const": tool.name() },
                        "description": { "type": "string" },
                        "parameters": strip_schema_id(tool.input_schema()),
                        "outputSchema": strip_schema_id(tool.output_schema()),
                    },
                    "required": ["name", "description", "parameters", "outputSchema"],
                })
            })
            .collect();

        json!({
            "$id": "Tools",
            "type": "array",
            "items": { "anyOf": variants },
        })
    }
}

fn strip_schema_id(schema: Value) -> Value {
    match schema {
        Value::Object(mut map) => {
            map.remove("$id");
            Value::Object(map)
        }
        other => other,
    }
}

/// Builds the `{"type":"object", ...}` schema most tools use.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), properties);
    schema.insert("required".into(), json!(required));
    Value::Object(schema)
}
