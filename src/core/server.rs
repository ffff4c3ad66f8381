//! Transport adapters.
//!
//! Both transports are thin byte-in/byte-out shells around one shared
//! [`Dispatcher`]:
//! - HTTP mode runs Actix Web; protocol envelopes are POSTed to `/` or `/mcp`
//! - STDIO mode reads newline-delimited JSON-RPC from stdin and answers on
//!   stdout (logs go to stderr)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use actix_web::http::{Method, header};
use actix_web::middleware::{Compress, DefaultHeaders, Logger};
use actix_web::{App, HttpResponse, HttpServer, web};
use bytes::Bytes;
use serde_json::json;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};

use crate::core::config::{ConfigError, HttpConfig, ServerConfig};
use crate::core::dispatcher::Dispatcher;
use crate::core::error::ProtocolError;
use crate::core::fallback::FallbackExecutor;
use crate::core::protocol::{RequestId, Response, ServerInfo};
use crate::tools;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Build the process-wide dispatcher. The registry is assembled here exactly
/// once and shared by every request afterwards.
pub fn build_dispatcher(config: &ServerConfig) -> Result<Dispatcher, ConfigError> {
    let registry = tools::enabled_for(config)?;
    Ok(Dispatcher::new(
        ServerInfo {
            name: config.name.clone(),
            version: config.version.clone(),
        },
        Arc::new(registry),
        FallbackExecutor::new(config.llm.timeout),
    ))
}

/// Health check endpoint handler.
///
/// Used by load balancers and monitoring systems to verify server availability.
async fn health(dispatcher: web::Data<Dispatcher>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": dispatcher.info().name,
        "version": dispatcher.info().version,
        "tools": dispatcher.registry().len(),
    }))
}

/// Total number of protocol requests processed since start.
async fn metrics(counter: web::Data<AtomicU64>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "requests_total": counter.load(Ordering::Relaxed),
        "status": "ok"
    }))
}

/// Preflight / capability probe. Carries no protocol semantics.
async fn options() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header((header::ALLOW, "GET, POST, OPTIONS"))
        .finish()
}

/// MCP JSON-RPC endpoint.
///
/// The body is taken as raw bytes rather than through a JSON extractor so
/// that malformed input still gets a JSON-RPC parse error envelope.
async fn mcp_endpoint(
    dispatcher: web::Data<Dispatcher>,
    counter: web::Data<AtomicU64>,
    body: Bytes,
) -> HttpResponse {
    counter.fetch_add(1, Ordering::Relaxed);

    match dispatcher.handle_bytes(&body).await {
        Some(response) => HttpResponse::Ok()
            .content_type(header::ContentType::json())
            .body(response.to_bytes()),
        // Notifications are acknowledged without a body
        None => HttpResponse::Accepted().finish(),
    }
}

/// Route table shared by the server and the tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .route("/mcp", web::post().to(mcp_endpoint))
        .route("/mcp", web::method(Method::OPTIONS).to(options))
        .route("/", web::post().to(mcp_endpoint))
        .route("/", web::get().to(health))
        .route("/", web::method(Method::OPTIONS).to(options));
}

/// Run the MCP server in HTTP mode.
///
/// The server is configured with:
/// - Worker threads from `HttpConfig::workers`
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive and request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(config: &HttpConfig, dispatcher: Dispatcher) -> std::io::Result<()> {
    let bind_addr = config.bind_addr();

    tracing::info!(
        name = %dispatcher.info().name,
        version = %dispatcher.info().version,
        bind = %bind_addr,
        workers = config.workers,
        tools = dispatcher.registry().len(),
        "MCP Server Starting (HTTP mode)"
    );

    let dispatcher = web::Data::new(dispatcher);
    // Lock-free counter shared by all workers
    let request_count = web::Data::new(AtomicU64::new(0));

    HttpServer::new(move || {
        App::new()
            .app_data(dispatcher.clone())
            .app_data(request_count.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            // %r = request line, %s = status, %D = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes)
    })
    .workers(config.workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Used by MCP Inspector and local clients. Requests are processed one line
/// at a time; each response is flushed immediately.
pub async fn run_server_stdio(dispatcher: Dispatcher) -> std::io::Result<()> {
    tracing::info!(
        name = %dispatcher.info().name,
        version = %dispatcher.info().version,
        "MCP Server Starting (STDIO mode)"
    );

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&dispatcher, stdin, stdout).await
}

/// Line-delimited JSON-RPC loop over any reader/writer pair.
///
/// Lines are handed to the parser as raw bytes, so invalid UTF-8 or an
/// oversized line is answered with a parse error and the session continues.
pub async fn serve_lines<R, W>(dispatcher: &Dispatcher, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    serve_lines_limited(dispatcher, reader, writer, MAX_BODY_BYTES).await
}

async fn serve_lines_limited<R, W>(
    dispatcher: &Dispatcher,
    mut reader: R,
    mut writer: W,
    limit: usize,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(8192);

    loop {
        line.clear();
        let response = match read_line(&mut reader, &mut line, limit).await? {
            Line::Eof => break,
            Line::Oversized => {
                tracing::warn!(limit, "Rejected oversized STDIO message");
                Some(Response::failure(
                    RequestId::Null,
                    ProtocolError::Parse(format!("message exceeds {} bytes", limit)),
                ))
            }
            Line::Complete => {
                let body = line.trim_ascii();
                if body.is_empty() {
                    continue;
                }
                dispatcher.handle_bytes(body).await
            }
        };

        let Some(response) = response else {
            continue;
        };

        // One response per line
        writer.write_all(&response.to_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    tracing::info!("STDIO input closed, shutting down");
    Ok(())
}

enum Line {
    Complete,
    Oversized,
    Eof,
}

/// Read one `\n`-terminated line into `buf`, never buffering more than
/// `limit + 1` bytes. The rest of an oversized line is discarded.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let cap = limit as u64 + 1;
    let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= limit {
        return Ok(Line::Complete);
    }

    loop {
        buf.clear();
        let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
        if read == 0 || buf.last() == Some(&b'\n') {
            return Ok(Line::Oversized);
        }
    }
}
