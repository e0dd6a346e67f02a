//! Request router for MCP sessions.
//!
//! Every inbound envelope is classified, in order, as:
//!
//! 1. a handshake (`initialize` without a session id): a new transport is
//!    created, bound, and registered with the caller's context;
//! 2. a notification: forwarded to its session if known, otherwise dropped;
//! 3. a call on a registered session: forwarded to that session's transport;
//! 4. anything else: Method-Not-Found.
//!
//! Failures are [`RouteError`] values until [`McpService::create`] turns them
//! into a JSON-RPC error, which is the only place that happens.

use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use toolmux_types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutboundMessage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handler::{McpHandler, ServerInfo, INITIALIZE_METHOD};
use super::pipeline::{panic_message, ToolPipeline};
use super::session::{Session, SessionError, SessionRegistry};
use super::tools::ToolRegistry;
use super::transport::{
    ResponseSink, SessionIdGenerator, StreamableHttpTransport, TransportError,
};
use crate::auth::CallContext;

/// Why an envelope could not be routed.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("no route for method")]
    UnknownRoute,

    #[error("handshake failed: {0}")]
    Handshake(#[source] TransportError),

    #[error("{0}")]
    Forward(#[source] TransportError),

    #[error("{0}")]
    Registry(#[from] SessionError),
}

impl RouteError {
    fn into_rpc_error(self, method: &str, session_id: Option<&str>) -> JsonRpcError {
        match self {
            RouteError::UnknownRoute => JsonRpcError::method_not_found(method, session_id),
            other => JsonRpcError::internal(other.to_string()),
        }
    }
}

/// Owns the session registry and routes envelopes to sessions.
pub struct McpService {
    sessions: SessionRegistry,
    tools: Arc<ToolRegistry>,
    handler: Arc<McpHandler>,
}

impl McpService {
    pub fn new(info: ServerInfo, tools: Arc<ToolRegistry>) -> Self {
        let sessions = SessionRegistry::new();
        let handler = Arc::new(McpHandler::new(
            info,
            tools.clone(),
            ToolPipeline::new(sessions.clone()),
        ));
        Self {
            sessions,
            tools,
            handler,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Route one envelope.
    ///
    /// Replies produced by a transport are written to `sink`. The return
    /// value is the router's own error reply, if any.
    pub async fn create(
        &self,
        request: JsonRpcRequest,
        session_id: Option<&str>,
        context: CallContext,
        sink: ResponseSink,
    ) -> Option<JsonRpcResponse> {
        let id = request.id_or_null();
        let method = request.method.clone();

        let outcome = AssertUnwindSafe(self.dispatch(request, session_id, context, sink))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => {
                debug!("MCP: Routing {} failed: {}", method, e);
                e.into_rpc_error(&method, session_id)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("MCP: Panic while routing {}: {}", method, message);
                JsonRpcError::internal(message)
            }
        };
        Some(JsonRpcResponse::error(id, error))
    }

    async fn dispatch(
        &self,
        request: JsonRpcRequest,
        session_id: Option<&str>,
        context: CallContext,
        sink: ResponseSink,
    ) -> Result<(), RouteError> {
        if session_id.is_none() && request.method == INITIALIZE_METHOD {
            return self.handshake(request, context, sink).await;
        }

        if request.has_notification_method() {
            match session_id.and_then(|id| self.sessions.get(id)) {
                Some(session) => {
                    if let Err(e) = session.transport.handle_request(request, sink).await {
                        warn!("MCP: Failed to forward notification to {}: {}", session.id, e);
                    }
                }
                None => debug!(
                    "MCP: Dropping {} for unknown session {:?}",
                    request.method, session_id
                ),
            }
            return Ok(());
        }

        let session = session_id
            .and_then(|id| self.sessions.get(id))
            .ok_or(RouteError::UnknownRoute)?;

        if let Err(e) = session.transport.handle_request(request, sink).await {
            warn!("MCP: Evicting session {}: {}", session.id, e);
            if let Err(e) = session.transport.close() {
                debug!("MCP: Session {} was already closed: {}", session.id, e);
            }
            self.sessions.remove(&session.id);
            return Err(RouteError::Forward(e));
        }
        Ok(())
    }

    async fn handshake(
        &self,
        request: JsonRpcRequest,
        context: CallContext,
        sink: ResponseSink,
    ) -> Result<(), RouteError> {
        let transport = Arc::new(self.new_transport());
        transport
            .handle_request(request, sink)
            .await
            .map_err(RouteError::Handshake)?;

        if let Some(session_id) = transport.session_id() {
            self.sessions
                .put(Session::new(session_id.clone(), transport, context))?;
            info!("MCP: New session initialized: {}", session_id);
        }
        Ok(())
    }

    /// Open the standalone stream of a registered session.
    ///
    /// The error is a ready-to-send reply; the registry is left untouched.
    pub fn get(
        &self,
        session_id: Option<&str>,
    ) -> Result<broadcast::Receiver<OutboundMessage>, JsonRpcResponse> {
        let invalid = |data: Option<Value>| {
            let error = JsonRpcError::invalid_session();
            JsonRpcResponse::error(
                Value::Null,
                match data {
                    Some(data) => error.with_data(data),
                    None => error,
                },
            )
        };

        let session = session_id
            .and_then(|id| self.sessions.get(id))
            .ok_or_else(|| invalid(None))?;
        session
            .transport
            .handle_read()
            .map_err(|e| invalid(Some(json!(e.to_string()))))
    }

    /// Terminate a session. Returns false when the id is unknown.
    pub fn delete(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.peek(session_id) else {
            return false;
        };
        if let Err(e) = session.transport.close() {
            debug!("MCP: Session {} was already closed: {}", session_id, e);
        }
        self.sessions.remove(session_id);
        true
    }

    /// Close every session.
    pub fn teardown(&self) -> usize {
        self.sessions.remove_all()
    }

    fn new_transport(&self) -> StreamableHttpTransport {
        let registered = self.sessions.clone();
        let generator: SessionIdGenerator = Arc::new(move || loop {
            let id = Uuid::new_v4().to_string();
            if !registered.contains(&id) {
                return id;
            }
            warn!("MCP: Session id {} already in use, generating another", id);
        });

        let on_close = self.sessions.clone();
        let on_error = self.sessions.clone();
        StreamableHttpTransport::new(generator, self.handler.clone())
            .on_close(move |session_id| {
                on_close.remove(session_id);
            })
            .on_error(move |session_id, e| {
                warn!("MCP: Session {} failed: {}", session_id, e);
                on_error.remove(session_id);
            })
            .on_message(|session_id, request| {
                debug!(
                    "MCP: Message {} for session {:?}",
                    request.method, session_id
                );
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::tests::StubTool;
    use toolmux_types::{INTERNAL_ERROR, INVALID_SESSION, METHOD_NOT_FOUND};

    fn service() -> McpService {
        let mut tools = ToolRegistry::new();
        tools.register(StubTool::named("stub"));
        McpService::new(ServerInfo::default(), Arc::new(tools))
    }

    async fn handshake(service: &McpService) -> String {
        let (sink, mut rx) = ResponseSink::channel(false);
        let reply = service
            .create(
                JsonRpcRequest::new(0, "initialize", Some(json!({}))),
                None,
                CallContext::anonymous(),
                sink.clone(),
            )
            .await;
        assert!(reply.is_none());
        assert!(rx.try_recv().unwrap().as_response().unwrap().result.is_some());
        sink.session_id().unwrap()
    }

    #[tokio::test]
    async fn handshakes_register_unique_sessions() {
        let service = service();
        let first = handshake(&service).await;
        let second = handshake(&service).await;

        assert_ne!(first, second);
        assert!(service.sessions().contains(&first));
        assert!(service.sessions().contains(&second));
    }

    #[tokio::test]
    async fn call_on_registered_session_reaches_tool() {
        let service = service();
        let session_id = handshake(&service).await;

        let (sink, mut rx) = ResponseSink::channel(false);
        let reply = service
            .create(
                JsonRpcRequest::new(
                    1,
                    "tools/call",
                    Some(json!({"name": "stub", "arguments": {}})),
                ),
                Some(&session_id),
                CallContext::anonymous(),
                sink,
            )
            .await;

        assert!(reply.is_none());
        let response = rx.try_recv().unwrap();
        let result = response.as_response().unwrap().result.clone().unwrap();
        assert_eq!(result["content"], json!([{"type": "text", "text": "ok"}]));
    }

    #[tokio::test]
    async fn unknown_session_is_method_not_found() {
        let service = service();
        let (sink, _rx) = ResponseSink::channel(false);
        let reply = service
            .create(
                JsonRpcRequest::new(7, "tools/list", None),
                Some("unknown"),
                CallContext::anonymous(),
                sink,
            )
            .await
            .unwrap();

        assert_eq!(reply.id, json!(7));
        let error = reply.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert_eq!(error.message, "Method not found: tools/list");
        assert_eq!(
            error.data.unwrap(),
            json!({"method": "tools/list", "sessionId": "unknown"})
        );
    }

    #[tokio::test]
    async fn missing_session_is_method_not_found() {
        let service = service();
        let (sink, _rx) = ResponseSink::channel(false);
        let reply = service
            .create(
                JsonRpcRequest::new("abc", "ping", None),
                None,
                CallContext::anonymous(),
                sink,
            )
            .await
            .unwrap();

        assert_eq!(reply.id, json!("abc"));
        assert_eq!(reply.error.unwrap().data.unwrap()["sessionId"], "missing");
    }

    #[tokio::test]
    async fn notification_for_unknown_session_is_dropped() {
        let service = service();
        let (sink, mut rx) = ResponseSink::channel(false);
        let reply = service
            .create(
                JsonRpcRequest::notification("notifications/initialized", None),
                Some("ghost"),
                CallContext::anonymous(),
                sink,
            )
            .await;
        assert!(reply.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_on_unknown_session_is_invalid_session() {
        let service = service();
        let existing = handshake(&service).await;

        let reply = service.get(Some("ghost")).unwrap_err();
        assert_eq!(reply.id, Value::Null);
        assert_eq!(reply.error.unwrap().code, INVALID_SESSION);
        assert!(service.get(None).is_err());

        assert_eq!(service.sessions().ids(), vec![existing.clone()]);
        assert!(service.get(Some(&existing)).is_ok());
    }

    #[tokio::test]
    async fn forwarding_failure_evicts_session() {
        let service = service();
        let session_id = handshake(&service).await;

        let (sink, rx) = ResponseSink::channel(false);
        drop(rx);
        let reply = service
            .create(
                JsonRpcRequest::new(2, "ping", None),
                Some(&session_id),
                CallContext::anonymous(),
                sink,
            )
            .await
            .unwrap();

        let error = reply.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.message, "Internal error");
        assert!(error.data.is_some());
        assert!(!service.sessions().contains(&session_id));
    }

    #[tokio::test]
    async fn closing_transport_removes_session_once() {
        let service = service();
        let session_id = handshake(&service).await;
        let session = service.sessions().peek(&session_id).unwrap();

        session.transport.close().unwrap();
        assert!(!service.sessions().contains(&session_id));
        assert!(session.transport.close().is_err());
        assert!(!service.sessions().remove(&session_id));
    }

    #[tokio::test]
    async fn delete_and_teardown() {
        let service = service();
        let first = handshake(&service).await;
        handshake(&service).await;

        assert!(service.delete(&first));
        assert!(!service.delete(&first));
        assert_eq!(service.sessions().len(), 1);

        assert_eq!(service.teardown(), 1);
        assert!(service.sessions().is_empty());
    }
}
