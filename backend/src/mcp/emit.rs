//! Progress and log notifications raised by running tools.

use serde_json::Value;
use std::sync::Arc;
use toolmux_types::{JsonRpcNotification, LogLevel, LogParams, ProgressParams};
use tracing::{debug, warn};

use super::transport::StreamableHttpTransport;

/// Default `total` for progress notifications.
pub const DEFAULT_PROGRESS_TOTAL: f64 = 100.0;

/// Requested notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    Progress,
    Log,
}

/// Options for [`Emitter::emit`].
///
/// A bare number converts into `progress` for callers that only report a
/// percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitOptions {
    pub progress: Option<f64>,
    pub total: f64,
    pub level: LogLevel,
    pub kind: Option<EmitKind>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            progress: None,
            total: DEFAULT_PROGRESS_TOTAL,
            level: LogLevel::Info,
            kind: None,
        }
    }
}

impl EmitOptions {
    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn log(level: LogLevel) -> Self {
        Self {
            level,
            kind: Some(EmitKind::Log),
            ..Default::default()
        }
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = total;
        self
    }

    pub fn with_kind(mut self, kind: EmitKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl From<f64> for EmitOptions {
    fn from(progress: f64) -> Self {
        Self::progress(progress)
    }
}

impl From<u32> for EmitOptions {
    fn from(progress: u32) -> Self {
        Self::progress(f64::from(progress))
    }
}

impl From<i32> for EmitOptions {
    fn from(progress: i32) -> Self {
        Self::progress(f64::from(progress))
    }
}

impl From<LogLevel> for EmitOptions {
    fn from(level: LogLevel) -> Self {
        Self::log(level)
    }
}

/// Notification sink handed to a tool for the duration of one call.
#[derive(Clone)]
pub struct Emitter {
    transport: Option<Arc<StreamableHttpTransport>>,
    progress_token: Option<Value>,
    request_id: Option<Value>,
}

impl Emitter {
    pub fn new(
        transport: Option<Arc<StreamableHttpTransport>>,
        progress_token: Option<Value>,
        request_id: Option<Value>,
    ) -> Self {
        Self {
            transport,
            progress_token,
            request_id,
        }
    }

    /// An emitter with no transport. Every emit only logs a warning.
    pub fn detached() -> Self {
        Self::new(None, None, None)
    }

    pub fn progress_token(&self) -> Option<&Value> {
        self.progress_token.as_ref()
    }

    /// Send a progress or log notification for this call.
    ///
    /// Never fails: delivery problems are logged.
    pub fn emit(&self, message: impl Into<String>, options: impl Into<EmitOptions>) {
        let notification = self.notification_for(message.into(), &options.into());

        let Some(transport) = &self.transport else {
            warn!("MCP: No transport bound, dropping {}", notification.method);
            return;
        };

        match transport.send(notification.into(), self.request_id.as_ref()) {
            Ok(()) => debug!("MCP: Emitted notification for request {:?}", self.request_id),
            Err(e) => warn!("MCP: Failed to emit notification: {}", e),
        }
    }

    /// Build the notification `emit` would send.
    pub fn notification_for(&self, message: String, options: &EmitOptions) -> JsonRpcNotification {
        let wants_progress = match options.kind {
            Some(EmitKind::Progress) => true,
            Some(EmitKind::Log) => false,
            None => options.progress.is_some(),
        };

        match &self.progress_token {
            Some(token) if wants_progress => ProgressParams {
                progress_token: token.clone(),
                progress: options.progress.unwrap_or(0.0),
                total: options.total,
                message,
            }
            .into(),
            _ => LogParams {
                level: options.level,
                message,
            }
            .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolmux_types::{LOG_METHOD, PROGRESS_METHOD};

    fn with_token() -> Emitter {
        Emitter::new(None, Some(json!("tok")), Some(json!(1)))
    }

    #[test]
    fn bare_number_is_progress() {
        let notification = with_token().notification_for("step".into(), &42.into());
        assert_eq!(notification.method, PROGRESS_METHOD);
        let params = notification.params.unwrap();
        assert_eq!(
            params,
            json!({"progressToken": "tok", "progress": 42, "total": 100, "message": "step"})
        );
    }

    #[test]
    fn log_kind_wins_over_progress_value() {
        let options = EmitOptions::log(LogLevel::Info).with_progress(5.0);
        let notification = with_token().notification_for("x".into(), &options);
        assert_eq!(notification.method, LOG_METHOD);
        assert_eq!(
            notification.params.unwrap(),
            json!({"level": "info", "message": "x"})
        );
    }

    #[test]
    fn progress_kind_without_value_defaults_to_zero() {
        let options = EmitOptions::default().with_kind(EmitKind::Progress);
        let notification = with_token().notification_for("start".into(), &options);
        assert_eq!(notification.method, PROGRESS_METHOD);
        assert_eq!(notification.params.unwrap()["progress"].as_f64(), Some(0.0));
    }

    #[test]
    fn no_token_always_logs() {
        let emitter = Emitter::new(None, None, None);
        let notification = emitter.notification_for("x".into(), &EmitOptions::progress(10.0));
        assert_eq!(notification.method, LOG_METHOD);
    }

    #[test]
    fn plain_message_without_progress_logs() {
        let notification = with_token().notification_for("x".into(), &EmitOptions::default());
        assert_eq!(notification.method, LOG_METHOD);
    }

    #[test]
    fn detached_emit_does_not_panic() {
        Emitter::detached().emit("nobody listens", 1);
    }
}
