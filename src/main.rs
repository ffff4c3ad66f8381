//! MCP Server Entry Point
//!
//! Reads the configuration from environment variables, builds the tool
//! registry once and starts the selected transports.
//!
//! Environment Variables:
//! - SERVER_NAME / SERVER_VERSION: identity reported by `initialize` and `ping`
//! - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "both")
//! - HOST / PORT / WORKER_THREADS: HTTP listener settings
//! - MCP_TOOLS: per-tool switches, e.g. "review_code=false"
//! - LLM_API_URL / LLM_API_KEY / LLM_MODEL / LLM_TIMEOUT_SECS: AI backend
//! - RUST_LOG: log filter (default: "info"); LOG_FORMAT=json for JSON logs

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use mcp_analysis::core::config::{ServerConfig, Transport};
use mcp_analysis::core::server;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    // stdout carries protocol traffic in STDIO mode, so logs always go to stderr
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let dispatcher = server::build_dispatcher(&config).context("Failed to initialize tools")?;

    match config.transport {
        Transport::Stdio => server::run_server_stdio(dispatcher)
            .await
            .context("STDIO server failed"),
        Transport::Http => server::run_server_http(&config.http, dispatcher)
            .await
            .context("HTTP server failed"),
        Transport::Both => {
            // STDIO in the background, HTTP in the foreground
            let stdio = dispatcher.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio).await {
                    tracing::error!(error = %e, "STDIO server error");
                }
            });

            let http_result = server::run_server_http(&config.http, dispatcher).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();

            http_result.context("HTTP server failed")
        }
    }
}
