use async_trait::async_trait;
use serde_json::{json, Value};
use toolmux_types::ToolResponse;

use crate::auth::CallContext;
use crate::mcp::tools::object_schema;
use crate::mcp::{Emitter, Tool};

/// Replies with the text it was given.
pub struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back to the caller"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "text": { "type": "string", "description": "Text to echo" }
            }),
            &["text"],
        )
    }

    async fn handle(
        &self,
        input: Value,
        _context: &CallContext,
        _emit: &Emitter,
    ) -> anyhow::Result<ToolResponse> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("text is required"))?;
        Ok(ToolResponse::text(text))
    }
}
