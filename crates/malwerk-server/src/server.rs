// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Embedded HTTP service wrapping the line-art pipeline.
//
// The server listens on a configurable TCP port (default 8000) and turns
// uploaded photographs into printable coloring pages.  It speaks just enough
// HTTP/1.1 for the job: one request per connection, `Connection: close` on
// every response, and permissive CORS headers so browser frontends can call
// it without a proxy.
//
// # Endpoints
//
//   - GET  /                 service description and available styles
//   - GET  /health           liveness probe
//   - POST /process          image upload (raw body or multipart), PNG out
//   - POST /process-base64   JSON request/response with base64 payloads
//
// Uploads are capped at `AppConfig::max_upload_bytes` (10 MiB by default).
// Oversized requests are rejected from the `Content-Length` header alone,
// before any of the body is read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use malwerk_core::config::AppConfig;
use malwerk_core::error::{MalwerkError, Result};
use malwerk_core::types::{ServerStatus, Style, WatermarkSpec};
use malwerk_engine::PagePipeline;

use crate::http::{self, HttpResponse, RequestHead};
use crate::multipart;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum bytes of request head (request line plus headers) we accept.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Socket read granularity while assembling a request.
const READ_CHUNK_BYTES: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Shared state passed to connection handlers
// ---------------------------------------------------------------------------

/// State shared across all connection-handling tasks.
struct SharedState {
    /// Service configuration (upload cap, watermark defaults).
    config: AppConfig,
    /// Counter of active connections (surfaced through [`ArtServer`]).
    active_connections: Arc<AtomicU32>,
}

// ---------------------------------------------------------------------------
// ArtServer
// ---------------------------------------------------------------------------

/// Embedded HTTP server for the coloring-page service.
///
/// Binds a TCP listener and serves the upload endpoints until stopped.  The
/// CPU-heavy pipeline work runs on the blocking thread pool so the accept
/// loop stays responsive while pages render.
pub struct ArtServer {
    /// Service configuration captured at construction.
    config: AppConfig,
    /// Current lifecycle state of the server.
    status: ServerStatus,
    /// Notification handle used to signal a graceful shutdown.
    shutdown_signal: Arc<Notify>,
    /// Handle to the Tokio task running the accept loop.
    task_handle: Option<JoinHandle<()>>,
    /// Counter of currently active TCP connections.
    active_connections: Arc<AtomicU32>,
    /// The address the listener actually bound to, once running.
    bound_addr: Option<SocketAddr>,
}

impl ArtServer {
    /// Create a new server from the given configuration.
    ///
    /// The server is created in `Stopped` state.  Call [`ArtServer::start`]
    /// to begin accepting connections.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            bound_addr: None,
        }
    }

    /// The configured port (the bound port may differ when it is 0).
    pub fn port(&self) -> u16 {
        self.config.server_port
    }

    /// Return the current server status.
    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Return the number of currently active client connections.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// The socket address the listener is bound to, or `None` when stopped.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Start the HTTP server.
    ///
    /// Binds a TCP listener on `0.0.0.0:{port}` and spawns a Tokio task that
    /// accepts incoming connections.  Each connection is handled in its own
    /// spawned task.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is already in use or the listener cannot
    /// be created.
    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(port = self.port(), "art server already running");
            return Ok(());
        }

        self.status = ServerStatus::Starting;

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.config.server_port).into();
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(MalwerkError::Server(format!("bind {bind_addr}: {e}")));
            }
        };

        // The OS picks the port when the config says 0; remember the real one.
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(MalwerkError::Server(format!("local addr: {e}")));
            }
        };
        self.bound_addr = Some(local_addr);

        info!(addr = %local_addr, "art server listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let shared = Arc::new(SharedState {
            config: self.config.clone(),
            active_connections: Arc::clone(&self.active_connections),
        });

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, shared).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Gracefully stop the server.
    ///
    /// Signals the accept loop to exit and awaits its completion.  Existing
    /// connections that are mid-transfer will be allowed to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(port = self.port(), "stopping art server");

        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| MalwerkError::Server(format!("task join: {e}")))?;
        }

        self.bound_addr = None;
        self.status = ServerStatus::Stopped;
        info!("art server stopped");
        Ok(())
    }

    /// The main accept loop.
    ///
    /// Runs until the shutdown signal is received.  Each incoming connection
    /// is handed off to [`ArtServer::handle_connection`] in a separate task.
    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, shared: Arc<SharedState>) {
        loop {
            tokio::select! {
                // Wait for the shutdown signal.
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                // Accept a new connection.
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming connection");
                            let state = Arc::clone(&shared);
                            tokio::spawn(async move {
                                state.active_connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = Self::handle_connection(stream, peer_addr, Arc::clone(&state)).await {
                                    warn!(
                                        peer = %peer_addr,
                                        error = %e,
                                        "connection handler error"
                                    );
                                }
                                state.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Handle a single incoming TCP connection.
    ///
    /// Reads the request head, enforces the upload cap from `Content-Length`
    /// before touching the body, dispatches to the route handlers, and writes
    /// back the response.  Exactly one request is served per connection.
    async fn handle_connection(
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        state: Arc<SharedState>,
    ) -> Result<()> {
        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK_BYTES);
        let mut chunk = [0u8; READ_CHUNK_BYTES];

        // Read until the blank line that terminates the request head.
        let head_end = loop {
            if let Some(pos) = http::find_subsequence(&buf, b"\r\n\r\n") {
                break pos;
            }
            if buf.len() > MAX_HEAD_BYTES {
                warn!(peer = %peer_addr, bytes = buf.len(), "request head too large");
                let response = HttpResponse::error(431, "request header fields too large");
                return send_response(&mut stream, &response).await;
            }
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| MalwerkError::Server(format!("read from {peer_addr}: {e}")))?;
            if n == 0 {
                if buf.is_empty() {
                    debug!(peer = %peer_addr, "empty connection -- nothing to serve");
                    return Ok(());
                }
                warn!(peer = %peer_addr, bytes = buf.len(), "connection closed mid-head");
                let response = HttpResponse::error(400, "truncated request");
                return send_response(&mut stream, &response).await;
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = match http::parse_head(&buf[..head_end]) {
            Ok(head) => head,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "malformed request head");
                let response = HttpResponse::error(400, &e);
                return send_response(&mut stream, &response).await;
            }
        };

        debug!(
            peer = %peer_addr,
            method = %head.method,
            path = %head.path,
            "parsed request head"
        );

        let mut body = buf.split_off(head_end + 4);
        let response = match head.content_length() {
            Some(declared) if declared > state.config.max_upload_bytes => {
                warn!(
                    peer = %peer_addr,
                    declared,
                    limit = state.config.max_upload_bytes,
                    "upload over size limit"
                );
                HttpResponse::error(413, "request body too large")
            }
            Some(declared) => {
                while body.len() < declared {
                    let n = stream
                        .read(&mut chunk)
                        .await
                        .map_err(|e| MalwerkError::Server(format!("read from {peer_addr}: {e}")))?;
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                if body.len() < declared {
                    warn!(
                        peer = %peer_addr,
                        got = body.len(),
                        declared,
                        "connection closed mid-body"
                    );
                    HttpResponse::error(400, "truncated request body")
                } else {
                    body.truncate(declared);
                    dispatch(&head, &body, &state).await
                }
            }
            None if head.method == "POST" => {
                HttpResponse::error(411, "Content-Length required")
            }
            None => dispatch(&head, &body, &state).await,
        };

        send_response(&mut stream, &response).await?;

        info!(
            peer = %peer_addr,
            method = %head.method,
            path = %head.path,
            status = response.status(),
            "response sent"
        );

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Route dispatch
// ---------------------------------------------------------------------------

/// Route a parsed request to the appropriate handler.
async fn dispatch(head: &RequestHead, body: &[u8], state: &SharedState) -> HttpResponse {
    match (head.method.as_str(), head.path.as_str()) {
        // Preflight: the CORS headers are stamped on every response.
        ("OPTIONS", _) => HttpResponse::new(204),
        ("GET", "/") => service_index(),
        ("GET", "/health") => health_check(),
        ("POST", "/process") => process_upload(head, body, state).await,
        ("POST", "/process-base64") => process_base64(body, state).await,
        (_, "/" | "/health" | "/process" | "/process-base64") => {
            warn!(method = %head.method, path = %head.path, "method not allowed");
            HttpResponse::error(405, "method not allowed")
                .header("Allow", allowed_methods(&head.path))
        }
        _ => HttpResponse::error(404, "not found"),
    }
}

/// The methods a known route answers to (for the 405 `Allow` header).
fn allowed_methods(path: &str) -> &'static str {
    match path {
        "/process" | "/process-base64" => "POST, OPTIONS",
        _ => "GET, OPTIONS",
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /` -- service description for API discovery.
fn service_index() -> HttpResponse {
    let styles: Vec<&str> = Style::ALL.iter().map(|s| s.name()).collect();
    HttpResponse::json(
        200,
        &json!({
            "service": "malwerk",
            "version": env!("CARGO_PKG_VERSION"),
            "status": "running",
            "styles": styles,
            "endpoints": {
                "health": "GET /health",
                "process": "POST /process?style=<name>&watermark=<bool>",
                "process_base64": "POST /process-base64",
            },
        }),
    )
}

/// `GET /health` -- liveness probe.
fn health_check() -> HttpResponse {
    HttpResponse::json(
        200,
        &json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
        }),
    )
}

/// `POST /process` -- turn an uploaded image into a coloring page.
///
/// The image arrives either as the raw request body or as the first file
/// part of a `multipart/form-data` body.  Style and watermark toggles come
/// from the query string.  On success the PNG is returned directly with
/// attachment headers; on failure, a JSON error body with a matching status.
async fn process_upload(head: &RequestHead, body: &[u8], state: &SharedState) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let image = match upload_bytes(head, body) {
        Ok(bytes) => bytes,
        Err(message) => {
            warn!(request_id = %request_id, error = %message, "rejecting upload");
            return HttpResponse::error(400, &message)
                .header("X-Request-Id", &request_id.to_string());
        }
    };

    let style_name = head.query_param("style").unwrap_or(Style::default().name());
    let watermark = watermark_spec(head.query_param("watermark"), &state.config);
    let pipeline = PagePipeline::for_name(style_name, watermark);
    let style = pipeline.style();

    info!(
        request_id = %request_id,
        style = %style,
        bytes = image.len(),
        sha256 = %short_digest(&image),
        "processing upload"
    );

    match run_pipeline(pipeline, image).await {
        Ok(png) => {
            info!(
                request_id = %request_id,
                duration_ms = started.elapsed().as_millis() as u64,
                png_bytes = png.len(),
                "upload processed"
            );
            HttpResponse::new(200)
                .body("image/png", png)
                .header(
                    "Content-Disposition",
                    &format!("attachment; filename=coloring_{}.png", style.name()),
                )
                .header("X-Processing-Style", style.name())
                .header("X-Request-Id", &request_id.to_string())
        }
        Err(e) => {
            let status = error_status(&e);
            warn!(request_id = %request_id, status, error = %e, "upload processing failed");
            HttpResponse::error(status, &e.to_string())
                .header("X-Request-Id", &request_id.to_string())
        }
    }
}

/// Request body for `POST /process-base64`.
#[derive(Debug, Deserialize)]
struct Base64Request {
    /// Base64-encoded source image.
    image: String,
    /// Style name; defaults to `cartoon`.
    #[serde(default)]
    style: Option<String>,
    /// Watermark toggle; defaults to the configured behavior.
    #[serde(default)]
    watermark: Option<bool>,
}

/// `POST /process-base64` -- JSON-wrapped processing for clients that cannot
/// handle binary uploads.
///
/// Always answers 200: failures are reported in-band as `{"error": ...}` so
/// browser callers get a body they can show without special-casing statuses.
async fn process_base64(body: &[u8], state: &SharedState) -> HttpResponse {
    let request_id = Uuid::new_v4();

    let request: Base64Request = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return base64_error(request_id, format!("invalid JSON body: {e}")),
    };

    let image = match BASE64.decode(request.image.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => return base64_error(request_id, format!("invalid base64 image: {e}")),
    };
    if image.len() > state.config.max_upload_bytes {
        return base64_error(
            request_id,
            format!(
                "decoded image is {} bytes, over the {} byte limit",
                image.len(),
                state.config.max_upload_bytes
            ),
        );
    }

    let style_name = request.style.as_deref().unwrap_or(Style::default().name());
    let watermark = match request.watermark {
        Some(true) => WatermarkSpec::with_text(state.config.watermark_text.clone()),
        Some(false) => WatermarkSpec::disabled(),
        None => watermark_spec(None, &state.config),
    };
    let pipeline = PagePipeline::for_name(style_name, watermark);
    let style = pipeline.style();

    info!(
        request_id = %request_id,
        style = %style,
        bytes = image.len(),
        sha256 = %short_digest(&image),
        "processing base64 upload"
    );

    match run_pipeline(pipeline, image).await {
        Ok(png) => HttpResponse::json(
            200,
            &json!({
                "image": BASE64.encode(&png),
                "style": style.name(),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        ),
        Err(e) => base64_error(request_id, e.to_string()),
    }
}

/// In-band error for the base64 endpoint (always HTTP 200).
fn base64_error(request_id: Uuid, message: String) -> HttpResponse {
    warn!(request_id = %request_id, error = %message, "base64 request failed");
    HttpResponse::json(200, &json!({ "error": message }))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Extract the image bytes from an upload request.
///
/// Accepts either a raw body or `multipart/form-data` with at least one
/// file part (the first one wins, matching common form uploaders).
fn upload_bytes(head: &RequestHead, body: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let content_type = head.header("content-type").unwrap_or("");
    if content_type.to_ascii_lowercase().starts_with("multipart/") {
        let boundary = multipart::boundary_from_content_type(content_type)
            .ok_or_else(|| "multipart content type without a boundary".to_string())?;
        return multipart::first_file_part(body, &boundary)
            .ok_or_else(|| "multipart body contains no file part".to_string());
    }
    if body.is_empty() {
        return Err("empty request body".to_string());
    }
    Ok(body.to_vec())
}

/// Resolve the watermark toggle for a request.
///
/// An explicit `watermark` query value wins; otherwise the configured
/// default applies.  Only `false`, `0`, `no` and `off` disable it.
fn watermark_spec(param: Option<&str>, config: &AppConfig) -> WatermarkSpec {
    let enabled = match param {
        Some(value) => !matches!(
            value.to_ascii_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ),
        None => config.watermark_default,
    };
    if enabled {
        WatermarkSpec::with_text(config.watermark_text.clone())
    } else {
        WatermarkSpec::disabled()
    }
}

/// Run the CPU-bound pipeline on the blocking thread pool.
async fn run_pipeline(pipeline: PagePipeline, image: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || pipeline.process(&image))
        .await
        .map_err(|e| MalwerkError::Server(format!("pipeline task join: {e}")))?
}

/// HTTP status for a pipeline error.
///
/// Client-caused failures (undecodable or degenerate uploads) map to 400;
/// everything else is on us.
fn error_status(error: &MalwerkError) -> u16 {
    match error {
        MalwerkError::Decode(_)
        | MalwerkError::DegenerateImage { .. }
        | MalwerkError::BadRequest(_) => 400,
        _ => 500,
    }
}

/// First 16 hex characters of the SHA-256 of an upload, for log correlation.
fn short_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Write a response and flush the stream.
async fn send_response(stream: &mut TcpStream, response: &HttpResponse) -> Result<()> {
    let bytes = response.to_bytes();
    stream
        .write_all(&bytes)
        .await
        .map_err(|e| MalwerkError::Server(format!("write response: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| MalwerkError::Server(format!("flush response: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use image::{DynamicImage, GrayImage, Luma};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    // -- Construction ------------------------------------------------------

    #[test]
    fn server_defaults_to_port_8000() {
        let server = ArtServer::new(AppConfig::default());
        assert_eq!(server.port(), 8000);
    }

    #[test]
    fn server_honors_configured_port() {
        let config = AppConfig {
            server_port: 9123,
            ..AppConfig::default()
        };
        let server = ArtServer::new(config);
        assert_eq!(server.port(), 9123);
    }

    #[test]
    fn server_starts_in_stopped_state() {
        let server = ArtServer::new(AppConfig::default());
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.active_connections(), 0);
        assert!(server.bound_addr().is_none());
    }

    // -- Request helpers ---------------------------------------------------

    fn parsed_head(raw: &str) -> RequestHead {
        http::parse_head(raw.as_bytes()).expect("test head parses")
    }

    #[test]
    fn watermark_query_values_toggle_the_spec() {
        let config = AppConfig::default();
        assert!(watermark_spec(None, &config).enabled);
        assert!(watermark_spec(Some("true"), &config).enabled);
        assert!(!watermark_spec(Some("false"), &config).enabled);
        assert!(!watermark_spec(Some("0"), &config).enabled);
        assert!(!watermark_spec(Some("OFF"), &config).enabled);

        let silent = AppConfig {
            watermark_default: false,
            ..AppConfig::default()
        };
        assert!(!watermark_spec(None, &silent).enabled);
        assert!(watermark_spec(Some("yes"), &silent).enabled);
    }

    #[test]
    fn upload_bytes_takes_the_raw_body_by_default() {
        let head = parsed_head("POST /process HTTP/1.1\r\nContent-Type: image/png\r\n");
        let bytes = upload_bytes(&head, b"\x89PNG fake").expect("raw body accepted");
        assert_eq!(bytes, b"\x89PNG fake");
        assert!(upload_bytes(&head, b"").is_err());
    }

    #[test]
    fn upload_bytes_extracts_the_multipart_file_part() {
        let head = parsed_head(
            "POST /process HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=frame\r\n",
        );
        let body = concat!(
            "--frame\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\n",
            "\r\n",
            "IMAGEDATA\r\n",
            "--frame--\r\n",
        );
        let bytes = upload_bytes(&head, body.as_bytes()).expect("file part found");
        assert_eq!(bytes, b"IMAGEDATA");
    }

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(error_status(&MalwerkError::Decode("not an image".into())), 400);
        assert_eq!(
            error_status(&MalwerkError::DegenerateImage { width: 0, height: 4 }),
            400
        );
        assert_eq!(error_status(&MalwerkError::BadRequest("bad".into())), 400);
        assert_eq!(error_status(&MalwerkError::Server("boom".into())), 500);
        assert_eq!(error_status(&MalwerkError::Processing("boom".into())), 500);
    }

    // -- End-to-end over a real socket -------------------------------------

    /// Start a server on an ephemeral port and hand back the port.
    async fn start_test_server() -> (ArtServer, u16) {
        let config = AppConfig {
            server_port: 0,
            ..AppConfig::default()
        };
        let mut server = ArtServer::new(config);
        server.start().await.expect("server starts");
        let port = server.bound_addr().expect("server bound").port();
        (server, port)
    }

    /// Send raw request bytes and split the response into its parts.
    async fn roundtrip(port: u16, request: &[u8]) -> (u16, HashMap<String, String>, Vec<u8>) {
        let mut stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to test server");
        stream.write_all(request).await.expect("send request");
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.expect("read response");

        let head_end =
            http::find_subsequence(&raw, b"\r\n\r\n").expect("response head is complete");
        let head = String::from_utf8(raw[..head_end].to_vec()).expect("response head is UTF-8");
        let mut lines = head.split("\r\n");
        let status: u16 = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .expect("status line");
        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
        (status, headers, raw[head_end + 4..].to_vec())
    }

    fn get(path: &str) -> Vec<u8> {
        format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").into_bytes()
    }

    fn post(path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut request = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
            body.len(),
        )
        .into_bytes();
        request.extend_from_slice(body);
        request
    }

    /// A small stand-in photograph: gray checkers, plenty of edges.
    fn sample_png() -> Vec<u8> {
        let page = GrayImage::from_fn(96, 64, |x, y| {
            if (x / 12 + y / 12) % 2 == 0 {
                Luma([70])
            } else {
                Luma([190])
            }
        });
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(page)
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode sample PNG");
        buf.into_inner()
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let (mut server, port) = start_test_server().await;
        let (status, headers, body) = roundtrip(port, &get("/health")).await;
        assert_eq!(status, 200);
        assert_eq!(headers["content-type"], "application/json");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("JSON body");
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn index_lists_styles_and_endpoints() {
        let (mut server, port) = start_test_server().await;
        let (status, _, body) = roundtrip(port, &get("/")).await;
        assert_eq!(status, 200);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("JSON body");
        assert_eq!(json["service"], "malwerk");
        let styles: Vec<&str> = json["styles"]
            .as_array()
            .expect("styles array")
            .iter()
            .map(|v| v.as_str().expect("style name"))
            .collect();
        assert_eq!(styles, ["simple", "detailed", "cartoon"]);
        assert!(json["endpoints"]["process"].is_string());
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn process_returns_a_png_attachment() {
        let (mut server, port) = start_test_server().await;
        let request = post("/process?style=simple", "image/png", &sample_png());
        let (status, headers, body) = roundtrip(port, &request).await;
        assert_eq!(status, 200);
        assert_eq!(headers["content-type"], "image/png");
        assert_eq!(headers["x-processing-style"], "simple");
        assert!(headers.contains_key("x-request-id"));
        assert!(headers["content-disposition"].contains("coloring_simple.png"));
        assert_eq!(headers["access-control-allow-origin"], "*");
        let page = image::load_from_memory(&body).expect("response is a decodable image");
        assert_eq!((page.width(), page.height()), (96, 64));
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn process_accepts_multipart_uploads() {
        let (mut server, port) = start_test_server().await;
        let boundary = "MalwerkUpload";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(&sample_png());
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        let request = post(
            "/process",
            &format!("multipart/form-data; boundary={boundary}"),
            &body,
        );
        let (status, headers, png) = roundtrip(port, &request).await;
        assert_eq!(status, 200);
        assert_eq!(headers["x-processing-style"], "cartoon");
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn undecodable_upload_is_a_client_error() {
        let (mut server, port) = start_test_server().await;
        let request = post(
            "/process",
            "application/octet-stream",
            b"definitely not an image",
        );
        let (status, _, body) = roundtrip(port, &request).await;
        assert_eq!(status, 400);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("JSON error body");
        assert!(json["error"].as_str().expect("error message").contains("decode"));
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_from_the_header_alone() {
        let (mut server, port) = start_test_server().await;
        // Declare an 11 MiB body but never send it; the server must answer
        // from the Content-Length header.
        let request = format!(
            "POST /process HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
            11 * 1024 * 1024,
        );
        let (status, _, body) = roundtrip(port, request.as_bytes()).await;
        assert_eq!(status, 413);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("JSON error body");
        assert!(json["error"].is_string());
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn unknown_paths_and_methods_are_rejected() {
        let (mut server, port) = start_test_server().await;
        let (status, _, _) = roundtrip(port, &get("/nope")).await;
        assert_eq!(status, 404);
        let (status, headers, _) = roundtrip(port, &get("/process")).await;
        assert_eq!(status, 405);
        assert_eq!(headers["allow"], "POST, OPTIONS");
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn preflight_gets_cors_headers() {
        let (mut server, port) = start_test_server().await;
        let request =
            b"OPTIONS /process HTTP/1.1\r\nHost: localhost\r\nOrigin: http://localhost:3000\r\n\r\n";
        let (status, headers, body) = roundtrip(port, request).await;
        assert_eq!(status, 204);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(headers["access-control-allow-methods"].contains("POST"));
        assert!(body.is_empty());
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn unknown_style_falls_back_to_cartoon() {
        let (mut server, port) = start_test_server().await;
        let request = post("/process?style=woodcut", "image/png", &sample_png());
        let (status, headers, _) = roundtrip(port, &request).await;
        assert_eq!(status, 200);
        assert_eq!(headers["x-processing-style"], "cartoon");
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn base64_endpoint_round_trips_json() {
        let (mut server, port) = start_test_server().await;
        let payload = json!({
            "image": BASE64.encode(sample_png()),
            "style": "detailed",
            "watermark": false,
        });
        let request = post(
            "/process-base64",
            "application/json",
            payload.to_string().as_bytes(),
        );
        let (status, _, body) = roundtrip(port, &request).await;
        assert_eq!(status, 200);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("JSON body");
        assert_eq!(json["style"], "detailed");
        assert!(json["timestamp"].is_string());
        let png = BASE64
            .decode(json["image"].as_str().expect("image field"))
            .expect("valid base64");
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn base64_endpoint_reports_errors_in_band() {
        let (mut server, port) = start_test_server().await;
        let payload = json!({ "image": "@@not-base64@@" });
        let request = post(
            "/process-base64",
            "application/json",
            payload.to_string().as_bytes(),
        );
        let (status, _, body) = roundtrip(port, &request).await;
        assert_eq!(status, 200);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("JSON body");
        assert!(json["error"].as_str().expect("error message").contains("base64"));
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn start_twice_is_a_no_op() {
        let (mut server, port) = start_test_server().await;
        server.start().await.expect("second start");
        assert_eq!(server.status(), ServerStatus::Running);
        assert_eq!(server.bound_addr().expect("still bound").port(), port);
        server.stop().await.expect("server stops");
    }

    #[tokio::test]
    async fn stop_is_clean_and_idempotent() {
        let (mut server, port) = start_test_server().await;
        assert_eq!(server.status(), ServerStatus::Running);
        server.stop().await.expect("first stop");
        assert_eq!(server.status(), ServerStatus::Stopped);
        server.stop().await.expect("second stop");
        // The listener is gone; new connections must fail.
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
