//! MCP Streamable HTTP endpoint handlers.
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC requests (returns JSON, or SSE for streamed tool calls)
//! - `GET /mcp` - Open SSE stream for server-initiated messages
//! - `DELETE /mcp` - Terminate a session

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;
use toolmux_types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutboundMessage};
use tracing::{debug, info, warn};

use crate::auth::CallContext;
use crate::mcp::ResponseSink;
use crate::state::AppState;

/// Header name for MCP session ID.
const MCP_SESSION_ID_HEADER: &str = toolmux_types::SESSION_ID_HEADER;

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Validate Origin header for DNS rebinding protection.
fn validate_origin(headers: &HeaderMap) -> bool {
    // Requests without Origin (non-browser clients) and from localhost are accepted
    if let Some(origin) = headers.get(header::ORIGIN) {
        if let Ok(origin_str) = origin.to_str() {
            if origin_str.starts_with("http://localhost")
                || origin_str.starts_with("https://localhost")
                || origin_str.starts_with("http://127.0.0.1")
                || origin_str.starts_with("https://127.0.0.1")
            {
                return true;
            }
            warn!("Rejecting MCP request from origin: {}", origin_str);
            return false;
        }
    }
    true
}

/// Extract session ID from headers.
fn get_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// Origin check and context capture shared by every method.
#[allow(clippy::result_large_err)]
fn admit(state: &AppState, headers: &HeaderMap) -> Result<CallContext, Response> {
    if !validate_origin(headers) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Invalid origin"})),
        )
            .into_response());
    }

    state.context_provider().provide(headers).map_err(|e| {
        warn!("MCP: Authentication failed: {}", e);
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": e.to_string()})),
        )
            .into_response()
    })
}

fn with_session_header(mut response: Response, session_id: Option<&str>) -> Response {
    if let Some(hv) = session_id.and_then(|sid| HeaderValue::from_str(sid).ok()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), hv);
    }
    response
}

fn to_event(message: OutboundMessage) -> Result<Event, axum::Error> {
    Event::default().json_data(message)
}

/// POST /mcp - Handle JSON-RPC requests.
///
/// Returns `application/json` with the final response, or `202 Accepted`
/// when there is nothing to reply. A `tools/call` from a client that accepts
/// `text/event-stream` is answered as an SSE stream carrying the call's
/// notifications followed by its response.
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let context = match admit(&state, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("MCP: Unparseable request body: {}", e);
            let response =
                JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error(e.to_string()));
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let session_id = get_session_id(&headers);
    debug!(
        "MCP POST: method={}, session={:?}",
        request.method, session_id
    );

    if request.method == "tools/call" && accepts_event_stream(&headers) {
        return stream_call(state, request, session_id, context);
    }

    let (sink, mut rx) = ResponseSink::channel(false);
    let routed = state
        .service()
        .create(request, session_id.as_deref(), context, sink.clone())
        .await;

    // The router's own error wins; otherwise the last reply the transport wrote.
    let mut reply = None;
    while let Ok(message) = rx.try_recv() {
        if let OutboundMessage::Response(response) = message {
            reply = Some(response);
        }
    }
    let assigned = sink.session_id().or(session_id);

    match routed.or(reply) {
        Some(response) => {
            with_session_header(Json(response).into_response(), assigned.as_deref())
        }
        None => with_session_header(StatusCode::ACCEPTED.into_response(), assigned.as_deref()),
    }
}

fn stream_call(
    state: AppState,
    request: JsonRpcRequest,
    session_id: Option<String>,
    context: CallContext,
) -> Response {
    let (sink, rx) = ResponseSink::channel(true);
    let header_session_id = session_id.clone();

    // Runs to completion even if the client goes away.
    tokio::spawn(async move {
        let routed = state
            .service()
            .create(request, session_id.as_deref(), context, sink.clone())
            .await;
        if let Some(response) = routed {
            sink.send(response.into());
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(to_event);
    with_session_header(Sse::new(stream).into_response(), header_session_id.as_deref())
}

/// GET /mcp - Open SSE stream for server-initiated messages.
pub async fn mcp_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = admit(&state, &headers) {
        return response;
    }

    let session_id = get_session_id(&headers);
    let receiver = match state.service().get(session_id.as_deref()) {
        Ok(receiver) => receiver,
        Err(response) => return (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    info!("MCP: SSE stream opened for session {:?}", session_id);

    // Lagged receivers skip what they missed.
    let stream =
        BroadcastStream::new(receiver).filter_map(|message| message.ok().map(to_event));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}

/// DELETE /mcp - Terminate a session.
pub async fn mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = admit(&state, &headers) {
        return response;
    }

    let session_id = match get_session_id(&headers) {
        Some(id) => id,
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    if state.service().delete(&session_id) {
        info!("MCP: Session terminated: {}", session_id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_validation() {
        let mut headers = HeaderMap::new();
        assert!(validate_origin(&headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:6274"));
        assert!(validate_origin(&headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert!(!validate_origin(&headers));
    }

    #[test]
    fn event_stream_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_event_stream(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        assert!(accepts_event_stream(&headers));
    }

    #[test]
    fn session_header_is_read() {
        let mut headers = HeaderMap::new();
        assert!(get_session_id(&headers).is_none());
        headers.insert(MCP_SESSION_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(get_session_id(&headers).as_deref(), Some("abc"));
    }
}
