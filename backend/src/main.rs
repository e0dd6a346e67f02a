//! toolmux MCP server.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toolmux::{
    config::{Config, ConfigOverrides},
    create_app_with_state,
    state::AppState,
};

/// toolmux - session-multiplexing MCP tool server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "TOOLMUX_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "TOOLMUX_HOST")]
    host: Option<String>,

    /// Route of the MCP endpoint
    #[arg(long)]
    mcp_path: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_figment(&ConfigOverrides {
        port: args.port,
        host: args.host,
        mcp_path: args.mcp_path,
        log_file: args.log_file,
        log_level: args.log_level,
    })?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config)?;
    info!("Starting toolmux MCP server...");

    let state = AppState::from_config(&config);

    if let Some(max_idle) = config.session_idle_timeout {
        let sessions = state.service().sessions().clone();
        tokio::spawn(async move {
            let period = max_idle.min(Duration::from_secs(60));
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = sessions.evict_idle(max_idle);
                if evicted > 0 {
                    info!("Evicted {} idle MCP session(s)", evicted);
                }
            }
        });
    }

    let app = create_app_with_state(state.clone(), &config).await;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("MCP endpoint listening on http://{}{}", addr, config.mcp_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = state.service().teardown();
    info!("Server shut down, {} session(s) closed", closed);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down gracefully...");
}

/// Initialize logging: stdout always, plus a file when configured.
///
/// The level comes from `logging.log_level`, then `RUST_LOG`, then `info`.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match &config.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
    };
    let stdout = fmt::layer().with_target(false).compact();

    let Some(path) = &config.log_file else {
        tracing_subscriber::registry().with(filter).with(stdout).init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("log_file {} has no file name", path.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
        .init();
    Ok(Some(guard))
}
