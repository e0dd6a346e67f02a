//! Progress and log notifications streamed while a tool runs.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::jsonrpc::JsonRpcNotification;

pub const PROGRESS_METHOD: &str = "notifications/progress";
pub const LOG_METHOD: &str = "notifications/log";

/// Severity of a log notification.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressParams {
    #[serde(rename = "progressToken")]
    pub progress_token: Value,
    #[serde(serialize_with = "whole_as_integer")]
    pub progress: f64,
    #[serde(serialize_with = "whole_as_integer")]
    pub total: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogParams {
    pub level: LogLevel,
    pub message: String,
}

/// `42.0` goes on the wire as `42`.
fn whole_as_integer<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

impl From<ProgressParams> for JsonRpcNotification {
    fn from(params: ProgressParams) -> Self {
        JsonRpcNotification::new(PROGRESS_METHOD, serde_json::to_value(params).ok())
    }
}

impl From<LogParams> for JsonRpcNotification {
    fn from(params: LogParams) -> Self {
        JsonRpcNotification::new(LOG_METHOD, serde_json::to_value(params).ok())
    }
}
