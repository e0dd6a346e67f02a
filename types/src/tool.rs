//! Tool catalog and call parameter types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool entry returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Per-channel exposure flags. An absent flag means exposed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolExposure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<bool>,
}

impl ToolExposure {
    pub fn mcp(&self) -> bool {
        self.mcp != Some(false)
    }

    pub fn openai(&self) -> bool {
        self.openai != Some(false)
    }
}

/// Request metadata attached to `tools/call` as `_meta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestMeta {
    #[serde(rename = "progressToken", default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<Value>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl ToolCallParams {
    pub fn progress_token(&self) -> Option<&Value> {
        self.meta.as_ref().and_then(|m| m.progress_token.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exposure_defaults_to_enabled() {
        let exposure = ToolExposure::default();
        assert!(exposure.mcp());
        assert!(exposure.openai());

        let hidden = ToolExposure {
            openai: Some(false),
            ..Default::default()
        };
        assert!(hidden.mcp());
        assert!(!hidden.openai());
    }

    #[test]
    fn call_params_read_progress_token() {
        let params: ToolCallParams = serde_json::from_value(json!({
            "name": "echo",
            "arguments": {"text": "hi"},
            "_meta": {"progressToken": "tok-1"}
        }))
        .unwrap();
        assert_eq!(params.progress_token(), Some(&json!("tok-1")));

        let params: ToolCallParams = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert!(params.progress_token().is_none());
        assert!(params.arguments.is_none());
    }
}
