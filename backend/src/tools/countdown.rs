use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use toolmux_types::{ToolExposure, ToolResponse};

use crate::auth::CallContext;
use crate::mcp::tools::object_schema;
use crate::mcp::{EmitOptions, Emitter, Tool};

/// Counts down, reporting progress at every step.
pub struct Countdown;

#[async_trait]
impl Tool for Countdown {
    fn name(&self) -> &str {
        "countdown"
    }

    fn description(&self) -> &str {
        "Count down a number of steps, streaming a progress notification per step"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "steps": { "type": "integer", "minimum": 1, "maximum": 100, "default": 3 },
                "delay_ms": { "type": "integer", "minimum": 0, "maximum": 10000, "default": 0 }
            }),
            &[],
        )
    }

    fn output_schema(&self) -> Value {
        object_schema(json!({ "completed": { "type": "integer" } }), &["completed"])
    }

    fn exposure(&self) -> ToolExposure {
        ToolExposure {
            mcp: None,
            openai: Some(false),
        }
    }

    async fn handle(
        &self,
        input: Value,
        _context: &CallContext,
        emit: &Emitter,
    ) -> anyhow::Result<ToolResponse> {
        let steps = input.get("steps").and_then(Value::as_u64).unwrap_or(3);
        let delay_ms = input.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        let delay = Duration::from_millis(delay_ms);

        for step in 1..=steps {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            emit.emit(
                format!("{} of {}", step, steps),
                EmitOptions::progress(step as f64).with_total(steps as f64),
            );
        }

        Ok(ToolResponse::json(json!({ "completed": steps })))
    }
}
