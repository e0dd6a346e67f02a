//! Configuration management.

use crate::auth::AuthConfig;
use crate::mcp::ServerInfo;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    mcp: McpConfig,
    #[serde(default)]
    auth: AuthSection,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    port: u16,
    host: String,
    cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: toolmux_types::DEFAULT_PORT,
            host: "0.0.0.0".to_string(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct McpConfig {
    /// Route of the MCP endpoint
    path: String,
    server_name: String,
    /// Defaults to the crate version
    server_version: Option<String>,
    /// Idle sessions are closed after this many seconds (0 disables)
    session_idle_timeout_secs: u64,
    /// Register the bundled demo tools
    builtin_tools: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            path: "/mcp".to_string(),
            server_name: "toolmux".to_string(),
            server_version: None,
            session_idle_timeout_secs: 3600,
            builtin_tools: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct AuthSection {
    /// Header carrying the API key
    header: String,
    /// API key -> user name. Empty disables authentication.
    api_keys: HashMap<String, String>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            header: "authorization".to_string(),
            api_keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

/// Values given on the command line. They win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub mcp_path: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Address to bind
    pub host: String,
    /// Allowed CORS origins (empty allows any)
    pub cors_allowed_origins: Vec<String>,
    /// Route of the MCP endpoint
    pub mcp_path: String,
    /// Name and version reported during the handshake
    pub server_info: ServerInfo,
    /// Idle session timeout, `None` when disabled
    pub session_idle_timeout: Option<Duration>,
    pub builtin_tools: bool,
    pub auth: AuthConfig,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/toolmux/ on Linux)
    /// 2. `.toolmux.toml` in current directory
    ///
    /// Environment variables use the `TOOLMUX_` prefix with `__` between
    /// section and key, e.g. `TOOLMUX_SERVER__PORT=9000`.
    pub fn from_figment(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".toolmux.toml"));
        let user_config = directories::ProjectDirs::from("", "", "toolmux")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // Priority: defaults < user config < local config < env vars < CLI args
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("TOOLMUX_").split("__"));

        if let Some(port) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }
        if let Some(ref host) = overrides.host {
            figment = figment.merge(Serialized::default("server.host", host));
        }
        if let Some(ref path) = overrides.mcp_path {
            figment = figment.merge(Serialized::default("mcp.path", path));
        }
        if let Some(ref file) = overrides.log_file {
            figment = figment.merge(Serialized::default("logging.log_file", file));
        }
        if let Some(ref level) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }

        let config_file: ConfigFile = figment.extract()?;
        Ok(Self::from(config_file))
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        let mut mcp_path = file.mcp.path;
        if !mcp_path.starts_with('/') {
            mcp_path.insert(0, '/');
        }

        Self {
            port: file.server.port,
            host: file.server.host,
            cors_allowed_origins: file.server.cors_allowed_origins,
            mcp_path,
            server_info: ServerInfo {
                name: file.mcp.server_name,
                version: file
                    .mcp
                    .server_version
                    .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            },
            session_idle_timeout: match file.mcp.session_idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            builtin_tools: file.mcp.builtin_tools,
            auth: AuthConfig::new(file.auth.header, file.auth.api_keys),
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        }
    }
}

impl Default for Config {
    /// Built-in defaults only, without reading files or the environment.
    fn default() -> Self {
        Self::from(ConfigFile::default())
    }
}
