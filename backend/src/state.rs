//! Application state management.

use crate::auth::{AnonymousContextProvider, ApiKeyContextProvider, ContextProvider};
use crate::config::Config;
use crate::mcp::{McpService, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Session router and tool catalog
    service: McpService,
    /// Builds the call context for every MCP request
    context_provider: Arc<dyn ContextProvider>,
}

impl AppState {
    /// Create state from a service and the context provider guarding it.
    pub fn new(service: McpService, context_provider: Arc<dyn ContextProvider>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service,
                context_provider,
            }),
        }
    }

    /// State with the built-in tools (if enabled) and API-key authentication.
    pub fn from_config(config: &Config) -> Self {
        let mut tools = ToolRegistry::new();
        if config.builtin_tools {
            crate::tools::register_builtin(&mut tools);
        }
        Self::with_tools(config, tools)
    }

    /// State serving `tools` instead of the built-in set.
    ///
    /// Callers must present an API key when any are configured.
    pub fn with_tools(config: &Config, tools: ToolRegistry) -> Self {
        info!("Serving {} MCP tool(s)", tools.len());
        let service = McpService::new(config.server_info.clone(), Arc::new(tools));
        let provider: Arc<dyn ContextProvider> = if config.auth.enabled() {
            Arc::new(ApiKeyContextProvider::new(config.auth.clone()))
        } else {
            warn!("No MCP API keys configured - the MCP endpoint is public!");
            Arc::new(AnonymousContextProvider)
        };
        Self::new(service, provider)
    }

    /// Get the MCP service.
    pub fn service(&self) -> &McpService {
        &self.inner.service
    }

    /// Get the context provider.
    pub fn context_provider(&self) -> &dyn ContextProvider {
        self.inner.context_provider.as_ref()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
