//! HTTP API Server
//!
//! Lightweight HTTP/1.1 server in front of the dispatcher, without an
//! external web framework. Each accepted connection is served by its own
//! thread and carries one request.
//!
//! ## Running the Server
//!
//! ```bash
//! # Start API server with the configured listener
//! baculum-api serve
//!
//! # With custom bind address
//! baculum-api serve --bind 0.0.0.0 --port 9096
//! ```
//!
//! Every response carries the `Baculum-API-Version` header. Authentication
//! failures add a `WWW-Authenticate` challenge for the configured method.

use crate::api::dispatch::{dispatch, ApiResponse};
use crate::api::handlers::AppState;
use crate::api::models::{Envelope, API_VERSION};
use crate::api::request::ApiRequest;
use crate::config::{AuthType, ServerConfig};
use crate::error::{ApiError, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
                            Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
                            Access-Control-Allow-Headers: Content-Type, Authorization\r\n";

/// API HTTP Server
pub struct ApiServer {
    /// Listener configuration
    config: ServerConfig,
    /// Shared application state
    state: Arc<AppState>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
}

impl ApiServer {
    /// Create a server for prepared application state
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.server.clone(),
            state: Arc::new(state),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the listener configuration
    pub fn with_listener(mut self, bind: Option<String>, port: Option<u16>) -> Self {
        if let Some(bind) = bind {
            self.config.bind = bind;
        }
        if let Some(port) = port {
            self.config.port = port;
        }
        self
    }

    /// Get shutdown flag for external control
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Get shared state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server (blocking)
    pub fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.bind, self.config.port);
        let listener = TcpListener::bind(&addr)
            .map_err(|e| ApiError::config(format!("cannot listen on {}: {}", addr, e)))?;
        listener.set_nonblocking(true)?;

        tracing::info!(
            address = %addr,
            auth = ?self.state.config.api.auth_type,
            "Baculum API listening"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&self.state);
                    let config = self.config.clone();

                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &state, &config) {
                            tracing::warn!(peer = %peer, "Connection error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }

        tracing::info!("API server shutting down");
        Ok(())
    }
}

/// Handle a single HTTP connection
fn handle_connection(mut stream: TcpStream, state: &AppState, config: &ServerConfig) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    match read_request(&mut reader, config.max_body_size)? {
        Incoming::Malformed => send_bad_request(&mut stream),
        Incoming::Preflight => send_cors_preflight(&mut stream),
        Incoming::TooLarge(err) => {
            let response = ApiResponse {
                status: 413,
                body: Envelope::from_error(&err),
            };
            send_envelope(&mut stream, &response, state.config.api.auth_type, config)
        }
        Incoming::Request(request) => {
            let response = dispatch(state, &request);
            send_envelope(&mut stream, &response, state.config.api.auth_type, config)
        }
    }
}

/// What a connection asked for
enum Incoming {
    Malformed,
    Preflight,
    TooLarge(ApiError),
    Request(ApiRequest),
}

/// Read the request line, headers and body.
///
/// A body larger than `max_body_size` is left unread and the request is
/// rejected before dispatch.
fn read_request<R: BufRead>(reader: &mut R, max_body_size: usize) -> Result<Incoming> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(Incoming::Malformed);
    }
    let (method, target) = (parts[0], parts[1]);

    let mut request = ApiRequest::new(method, target);
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.trim().split_once(':') {
            let value = value.trim();
            if key.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            request = request.with_header(key.trim(), value);
        }
    }

    if method == "OPTIONS" {
        return Ok(Incoming::Preflight);
    }

    if content_length > max_body_size {
        tracing::warn!(
            method = %request.method,
            path = %request.path,
            content_length,
            max_body_size,
            "Request body exceeds the size limit"
        );
        return Ok(Incoming::TooLarge(ApiError::internal(format!(
            "Request body of {} bytes exceeds the {} byte limit.",
            content_length, max_body_size
        ))));
    }
    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        request = request.with_body(String::from_utf8_lossy(&body));
    }

    Ok(Incoming::Request(request))
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        413 => "Payload Too Large",
        _ => "Unknown",
    }
}

/// Send a dispatched response
fn send_envelope<W: Write>(
    stream: &mut W,
    response: &ApiResponse,
    auth_type: AuthType,
    config: &ServerConfig,
) -> Result<()> {
    let body = serde_json::to_string(&response.body)?;

    let mut head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Baculum-API-Version: {}\r\n\
         Connection: close\r\n",
        response.status,
        status_text(response.status),
        body.len(),
        API_VERSION,
    );
    if response.is_unauthorized() {
        head.push_str(match auth_type {
            AuthType::Basic => "WWW-Authenticate: Basic realm=\"Baculum API\"\r\n",
            AuthType::OAuth2 => "WWW-Authenticate: Bearer realm=\"Baculum API\"\r\n",
        });
    }
    if config.cors_enabled {
        head.push_str(CORS_HEADERS);
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn send_bad_request<W: Write>(stream: &mut W) -> Result<()> {
    let response = format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Baculum-API-Version: {}\r\n\
         Content-Length: 0\r\n\
         Connection: close\r\n\r\n",
        API_VERSION
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Send CORS preflight response
fn send_cors_preflight<W: Write>(stream: &mut W) -> Result<()> {
    let response = format!(
        "HTTP/1.1 204 No Content\r\n\
         {}\
         Access-Control-Max-Age: 86400\r\n\
         Baculum-API-Version: {}\r\n\
         Content-Length: 0\r\n\r\n",
        CORS_HEADERS, API_VERSION
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &str, max_body_size: usize) -> Incoming {
        read_request(&mut Cursor::new(raw.as_bytes()), max_body_size).unwrap()
    }

    #[test]
    fn test_read_request() {
        let raw = "PUT /api/volumes/1?director=dir1 HTTP/1.1\r\n\
                   Host: localhost\r\n\
                   Authorization: Basic YWRtaW46c2VjcmV0\r\n\
                   Content-Type: application/x-www-form-urlencoded\r\n\
                   Content-Length: 22\r\n\r\n\
                   update[volstatus]=Used";
        let Incoming::Request(request) = parse(raw, 1024) else {
            panic!("expected a request");
        };
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/api/volumes/1");
        assert_eq!(request.query.get("director").map(String::as_str), Some("dir1"));
        assert_eq!(request.header("authorization"), Some("Basic YWRtaW46c2VjcmV0"));
        assert_eq!(request.body.as_deref(), Some("update[volstatus]=Used"));
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let raw = "POST /api/jobs/run HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789";
        let Incoming::TooLarge(err) = parse(raw, 4) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.code(), 1000);

        let mut out = Vec::new();
        let response = ApiResponse {
            status: 413,
            body: Envelope::from_error(&err),
        };
        send_envelope(&mut out, &response, AuthType::Basic, &ServerConfig::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(text.ends_with(
            "{\"output\":\"Internal error. Request body of 10 bytes exceeds the 4 byte limit.\",\"error\":1000}"
        ));

        // exactly at the limit is accepted
        let raw = "POST /api/jobs/run HTTP/1.1\r\nContent-Length: 4\r\n\r\n0123";
        let Incoming::Request(request) = parse(raw, 4) else {
            panic!("expected a request");
        };
        assert_eq!(request.body.as_deref(), Some("0123"));
    }

    #[test]
    fn test_malformed_and_preflight() {
        assert!(matches!(parse("\r\n", 1024), Incoming::Malformed));
        assert!(matches!(
            parse("OPTIONS /api/jobs HTTP/1.1\r\n\r\n", 1024),
            Incoming::Preflight
        ));
    }

    #[test]
    fn test_envelope_headers() {
        let mut out = Vec::new();
        let response = ApiResponse {
            status: 401,
            body: Envelope::from_error(&ApiError::Authentication),
        };
        let config = ServerConfig {
            cors_enabled: true,
            ..Default::default()
        };
        send_envelope(&mut out, &response, AuthType::Basic, &config).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(text.contains("Baculum-API-Version: 0.1\r\n"));
        assert!(text.contains("WWW-Authenticate: Basic realm=\"Baculum API\"\r\n"));
        assert!(text.contains("Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS"));
        assert!(text.ends_with(
            "{\"output\":\"Problem with authentication to Baculum API.\",\"error\":6}"
        ));
    }

    #[test]
    fn test_ok_response_has_no_challenge() {
        let mut out = Vec::new();
        let response = ApiResponse {
            status: 200,
            body: Envelope::ok(serde_json::json!(["dir1"])),
        };
        send_envelope(&mut out, &response, AuthType::OAuth2, &ServerConfig::default()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!text.contains("WWW-Authenticate"));
        assert!(!text.contains("Access-Control"));
        assert!(text.ends_with("\r\n\r\n{\"output\":[\"dir1\"],\"error\":0}"));
    }
}
