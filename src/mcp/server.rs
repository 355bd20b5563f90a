/// Transport Adapters
///
/// This module hosts the dispatcher behind its transports:
/// - HTTP server setup with Actix Web (POST endpoint plus health/info routes)
/// - STDIO server for line-based communication
///
/// Both adapters only move bytes: every request body goes to
/// `Dispatcher::dispatch` and the returned envelope is written back.

use actix_web::{
    App, HttpResponse, HttpServer, web,
    middleware::{Compress, DefaultHeaders, Logger},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::mcp::config::{ServerConfig, TransportMode};
use crate::mcp::dispatcher::Dispatcher;
use crate::tools::powerbi::client::PowerBiClient;

/// Application state shared across all worker threads in HTTP mode.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
}

/// Health check endpoint handler.
///
/// Used by load balancers and monitoring systems to verify server availability.
async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": state.config.name
    }))
}

/// Root info handler: server identity, endpoints, and whether the Power BI
/// credentials are configured (never their values).
async fn info(state: web::Data<AppState>, dispatcher: web::Data<Dispatcher>) -> HttpResponse {
    let set = |v: &Option<String>| if v.is_some() { "SET" } else { "MISSING" };
    let creds = &state.config.powerbi;
    HttpResponse::Ok().json(serde_json::json!({
        "message": format!("{} is running", state.config.name),
        "version": state.config.version,
        "tools": dispatcher.registry().len(),
        "endpoints": {
            "main": "/mcp (POST)",
            "health": "/health (GET)",
            "metrics": "/metrics (GET)",
            "test": "/api/test (GET)"
        },
        "environment_check": {
            "CLIENT_ID": set(&creds.client_id),
            "CLIENT_SECRET": set(&creds.client_secret),
            "TENANT_ID": set(&creds.tenant_id)
        }
    }))
}

/// Main request handler.
///
/// Takes the raw body so malformed JSON is reported through the dispatcher's
/// envelope instead of the framework's own extractor error.
async fn mcp_handler(
    dispatcher: web::Data<Dispatcher>,
    counter: web::Data<AtomicU64>,
    body: web::Bytes,
) -> HttpResponse {
    // Only atomicity is needed, not ordering with other operations.
    counter.fetch_add(1, Ordering::Relaxed);

    let response = dispatcher.dispatch(&body).await;
    HttpResponse::build(response.status_code()).json(response)
}

/// Metrics endpoint handler: total dispatched requests since start.
async fn metrics_handler(counter: web::Data<AtomicU64>) -> HttpResponse {
    let count = counter.load(Ordering::Relaxed);
    HttpResponse::Ok().json(serde_json::json!({
        "requests_total": count,
        "status": "ok"
    }))
}

/// Power BI connection probe.
async fn test_connection(
    state: web::Data<AppState>,
    client: web::Data<PowerBiClient>,
) -> HttpResponse {
    let connection_test = match client.refresh_token().await {
        Ok(_) => "Authentication successful! Token obtained and ready to use.".to_string(),
        Err(e) => format!("Authentication failed! {e}"),
    };
    HttpResponse::Ok().json(serde_json::json!({
        "service": state.config.name,
        "connection_test": connection_test
    }))
}

/// Register all routes on an app. Shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/api/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/api/test", web::get().to(test_connection))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/api/mcp-endpoint", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(info));
}

/// Run the router in HTTP mode.
///
/// The server is configured with:
/// - Worker threads: from configuration (CPU count, max 16, by default)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(
    config: ServerConfig,
    dispatcher: Dispatcher,
    powerbi: Arc<PowerBiClient>,
) -> std::io::Result<()> {
    let bind_addr = config.bind_addr();
    let workers = config.workers;

    tracing::info!(
        name = %config.name,
        version = %config.version,
        bind = %bind_addr,
        workers,
        tools = dispatcher.registry().len(),
        "starting HTTP transport"
    );

    let powerbi = web::Data::from(powerbi);
    let app_state = web::Data::new(AppState { config });
    let dispatcher = web::Data::new(dispatcher);
    let request_count = web::Data::new(AtomicU64::new(0));

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(dispatcher.clone())
            .app_data(request_count.clone())
            .app_data(powerbi.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(configure)
    })
    .workers(workers)
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

/// Run the router in STDIO mode.
///
/// Reads one request body per line from stdin and writes one response
/// envelope per line to stdout. All logging goes to stderr so the stream stays
/// clean.
pub async fn run_server_stdio(dispatcher: Dispatcher) -> std::io::Result<()> {
    tracing::info!(tools = dispatcher.registry().len(), "starting STDIO transport");

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&dispatcher, stdin, stdout).await?;

    tracing::info!("stdin closed, STDIO transport stopping");
    Ok(())
}

/// Line loop behind the STDIO transport. Blank lines are skipped; every other
/// line yields exactly one envelope line.
pub async fn serve_lines<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatcher.dispatch(line.as_bytes()).await;
        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response");
                continue;
            }
        };

        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        // Flush after each response so the caller is never left waiting
        writer.flush().await?;
    }
    Ok(())
}

/// Start the configured transports. `powerbi` is the client the registered
/// tools already share; `/api/test` reuses it.
pub async fn run(
    config: ServerConfig,
    dispatcher: Dispatcher,
    powerbi: Arc<PowerBiClient>,
) -> std::io::Result<()> {
    match config.transport {
        TransportMode::Stdio => run_server_stdio(dispatcher).await,
        TransportMode::Http => run_server_http(config, dispatcher, powerbi).await,
        TransportMode::Both => {
            let stdio_dispatcher = dispatcher.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = run_server_stdio(stdio_dispatcher).await {
                    tracing::error!(error = %e, "STDIO transport failed");
                }
            });

            let http_result = run_server_http(config, dispatcher, powerbi).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();
            http_result
        }
    }
}
