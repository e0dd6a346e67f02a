//! Streamable HTTP transport adapter.
//!
//! One adapter terminates one client's channel. It starts unbound, becomes
//! bound exactly once while answering `initialize` (that is when the session
//! id is generated), and ends closed. Replies to a request go to that
//! request's [`ResponseSink`]; other server messages go to the standalone
//! stream opened with `GET`.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, mpsc};
use toolmux_types::jsonrpc::{JsonRpcError, INVALID_REQUEST};
use toolmux_types::{JsonRpcRequest, JsonRpcResponse, OutboundMessage};
use tracing::{debug, info, warn};

use super::handler::{McpHandler, RequestScope, INITIALIZE_METHOD, INITIALIZED_NOTIFICATION};

/// Capacity of the standalone stream buffer per session.
const STANDALONE_STREAM_CAPACITY: usize = 100;

/// Produces session ids during the handshake.
pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

type CloseCallback = Box<dyn Fn(&str) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str, &TransportError) + Send + Sync>;
type MessageCallback = Box<dyn Fn(Option<&str>, &JsonRpcRequest) + Send + Sync>;

/// Adapter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unbound,
    Bound,
    Closed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("transport is already closed")]
    AlreadyClosed,

    #[error("transport has no session yet")]
    NotBound,

    #[error("client stream closed before the reply to request {request_id} was delivered")]
    ChannelClosed { request_id: String },
}

/// The response half of one HTTP exchange.
///
/// Cloning shares the same channel. The receiving end is drained by the
/// HTTP handler, either into a JSON body or into an SSE stream.
#[derive(Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    session_id: Arc<OnceLock<String>>,
    streaming: bool,
}

impl ResponseSink {
    /// Create a sink and its receiver. A streaming sink also accepts the
    /// notifications raised while its request is in flight.
    pub fn channel(streaming: bool) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                session_id: Arc::new(OnceLock::new()),
                streaming,
            },
            rx,
        )
    }

    /// Queue a message. Returns false when the client side is gone.
    pub fn send(&self, message: OutboundMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Record the session id to echo in the response headers.
    pub fn assign_session_id(&self, session_id: &str) {
        let _ = self.session_id.set(session_id.to_string());
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.get().cloned()
    }
}

struct Inner {
    state: TransportState,
    session_id: Option<String>,
    initialized: bool,
    events: Option<broadcast::Sender<OutboundMessage>>,
    in_flight: HashMap<String, ResponseSink>,
}

/// Server side of one Streamable HTTP channel.
pub struct StreamableHttpTransport {
    inner: Mutex<Inner>,
    generate_session_id: SessionIdGenerator,
    handler: Arc<McpHandler>,
    on_close: Option<CloseCallback>,
    on_error: Option<ErrorCallback>,
    on_message: Option<MessageCallback>,
}

impl StreamableHttpTransport {
    /// Create an unbound adapter that answers through `handler`.
    pub fn new(generate_session_id: SessionIdGenerator, handler: Arc<McpHandler>) -> Self {
        let (events, _) = broadcast::channel(STANDALONE_STREAM_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                state: TransportState::Unbound,
                session_id: None,
                initialized: false,
                events: Some(events),
                in_flight: HashMap::new(),
            }),
            generate_session_id,
            handler,
            on_close: None,
            on_error: None,
            on_message: None,
        }
    }

    /// Called once with the session id when the adapter is closed.
    pub fn on_close(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }

    /// Called once with the session id when the channel fails.
    pub fn on_error(
        mut self,
        callback: impl Fn(&str, &TransportError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Called for every inbound envelope.
    pub fn on_message(
        mut self,
        callback: impl Fn(Option<&str>, &JsonRpcRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> TransportState {
        self.inner.lock().state
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }

    /// True once the client acknowledged the handshake.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// True while a request is being handled or a standalone stream is open.
    pub fn is_busy(&self) -> bool {
        let inner = self.inner.lock();
        !inner.in_flight.is_empty()
            || inner
                .events
                .as_ref()
                .is_some_and(|events| events.receiver_count() > 0)
    }

    /// Handle one inbound envelope, writing any reply to `sink`.
    ///
    /// Protocol-level rejections (e.g. a request before `initialize`) are
    /// answered on the sink and are not errors. An error means the channel
    /// itself is unusable.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        sink: ResponseSink,
    ) -> Result<(), TransportError> {
        if let Some(callback) = &self.on_message {
            callback(self.session_id().as_deref(), &request);
        }

        let is_initialize = request.method == INITIALIZE_METHOD;
        let rejection = {
            let mut inner = self.inner.lock();
            match inner.state {
                TransportState::Closed => return Err(TransportError::Closed),
                TransportState::Unbound if is_initialize => {
                    let session_id = (self.generate_session_id)();
                    sink.assign_session_id(&session_id);
                    inner.session_id = Some(session_id);
                    inner.state = TransportState::Bound;
                    None
                }
                TransportState::Unbound => Some("Bad Request: Server not initialized"),
                TransportState::Bound if is_initialize => {
                    Some("Invalid Request: Server already initialized")
                }
                TransportState::Bound => {
                    if let Some(session_id) = &inner.session_id {
                        sink.assign_session_id(session_id);
                    }
                    None
                }
            }
        };

        if let Some(message) = rejection {
            warn!("MCP: Rejecting {}: {}", request.method, message);
            if request.id.is_some() {
                let response = JsonRpcResponse::error(
                    request.id_or_null(),
                    JsonRpcError::new(INVALID_REQUEST, message),
                );
                self.deliver(&sink, response, &request)?;
            }
            return Ok(());
        }

        let scope = RequestScope {
            session_id: self.session_id(),
        };

        if request.id.is_none() || request.has_notification_method() {
            if request.method == INITIALIZED_NOTIFICATION {
                self.inner.lock().initialized = true;
                debug!("MCP session {:?} marked as initialized", scope.session_id);
            }
            self.handler.handle_notification(&request, &scope);
            return Ok(());
        }

        let key = request_key(&request.id_or_null());
        self.inner.lock().in_flight.insert(key.clone(), sink.clone());
        let response = self.handler.handle_request(request.clone(), scope).await;
        self.inner.lock().in_flight.remove(&key);

        match response {
            Some(response) => self.deliver(&sink, response, &request),
            None => Ok(()),
        }
    }

    /// Open the standalone server-to-client stream.
    pub fn handle_read(&self) -> Result<broadcast::Receiver<OutboundMessage>, TransportError> {
        let inner = self.inner.lock();
        match inner.state {
            TransportState::Closed => Err(TransportError::Closed),
            TransportState::Unbound => Err(TransportError::NotBound),
            TransportState::Bound => inner
                .events
                .as_ref()
                .map(|events| events.subscribe())
                .ok_or(TransportError::Closed),
        }
    }

    /// Send a server message.
    ///
    /// With `related_request` set and a streaming reply open for it, the
    /// message is written there; otherwise it goes to the standalone stream.
    /// A standalone stream with no subscriber drops the message.
    pub fn send(
        &self,
        message: OutboundMessage,
        related_request: Option<&Value>,
    ) -> Result<(), TransportError> {
        let inner = self.inner.lock();
        if inner.state == TransportState::Closed {
            return Err(TransportError::Closed);
        }

        if let Some(sink) = related_request
            .and_then(|id| inner.in_flight.get(&request_key(id)))
            .filter(|sink| sink.is_streaming())
        {
            if sink.send(message.clone()) {
                return Ok(());
            }
        }

        if let Some(events) = &inner.events {
            if events.send(message).is_err() {
                debug!(
                    "MCP: No standalone stream for session {:?}, message dropped",
                    inner.session_id
                );
            }
        }
        Ok(())
    }

    /// Close the adapter. Fires the close callback exactly once.
    pub fn close(&self) -> Result<(), TransportError> {
        let session_id = {
            let mut inner = self.inner.lock();
            if inner.state == TransportState::Closed {
                return Err(TransportError::AlreadyClosed);
            }
            inner.state = TransportState::Closed;
            inner.events = None;
            inner.in_flight.clear();
            inner.session_id.clone()
        };

        info!("MCP: Transport closed for session {:?}", session_id);
        if let (Some(session_id), Some(callback)) = (session_id, &self.on_close) {
            callback(&session_id);
        }
        Ok(())
    }

    /// Mark the channel failed. Fires the error callback exactly once and
    /// only if the adapter was not already closed.
    fn fail(&self, error: &TransportError) {
        let session_id = {
            let mut inner = self.inner.lock();
            if inner.state == TransportState::Closed {
                return;
            }
            inner.state = TransportState::Closed;
            inner.events = None;
            inner.in_flight.clear();
            inner.session_id.clone()
        };

        warn!("MCP: Transport error for session {:?}: {}", session_id, error);
        if let (Some(session_id), Some(callback)) = (session_id, &self.on_error) {
            callback(&session_id, error);
        }
    }

    fn deliver(
        &self,
        sink: &ResponseSink,
        response: JsonRpcResponse,
        request: &JsonRpcRequest,
    ) -> Result<(), TransportError> {
        if sink.send(response.into()) {
            return Ok(());
        }
        let error = TransportError::ChannelClosed {
            request_id: request_key(&request.id_or_null()),
        };
        self.fail(&error);
        Err(error)
    }
}

fn request_key(id: &Value) -> String {
    id.to_string()
}
