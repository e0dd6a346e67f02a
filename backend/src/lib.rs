//! toolmux backend library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::HeaderValue;
use axum::http::{header, HeaderName, Method};
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod config;
pub mod mcp;
pub mod state;
pub mod tools;

use config::Config;
use state::AppState;

/// Create the Axum application router with default configuration.
///
/// This function is used both by the main server binary and by integration tests.
pub async fn create_app() -> Router {
    let config = Config::default();
    create_app_with_state(AppState::from_config(&config), &config).await
}

/// Create the Axum application router with a given state.
///
/// The MCP endpoint is mounted at `config.mcp_path`. If
/// `config.cors_allowed_origins` is empty, any origin is allowed.
pub async fn create_app_with_state(state: AppState, config: &Config) -> Router {
    if config.auth.enabled() {
        tracing::info!(
            "API key authentication enabled ({} key(s), header {})",
            config.auth.api_keys.len(),
            config.auth.header
        );
    }

    let session_header = HeaderName::from_static(toolmux_types::SESSION_ID_HEADER);
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            session_header.clone(),
        ])
        .expose_headers([session_header]);

    // If no origins specified, allow any origin
    let cors = if config.cors_allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        cors.allow_origin(origins).allow_credentials(true)
    };

    Router::new()
        .route("/health", get(health))
        .route(
            &config.mcp_path,
            get(api::mcp::mcp_get)
                .post(api::mcp::mcp_post)
                .delete(api::mcp::mcp_delete),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
