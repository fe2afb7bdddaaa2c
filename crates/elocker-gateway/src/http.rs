//! Minimal HTTP/1.1 front end.
//!
//! Three POST routes, one request per connection:
//!
//! | Route           | Body                          | Success                    |
//! |-----------------|-------------------------------|----------------------------|
//! | `/getStatus`    | ignored                       | `{"results": [...]}`       |
//! | `/setThreshold` | `{"fullcharged", "notcharged"}` | `{"message": "Full ..."}` |
//! | `/unlock`       | `{"id"}`                      | `{"message": "Success"}`   |
//!
//! Malformed input gets a plain-text 400; a refused unlock gets a JSON 400
//! naming the reason. Anything else is a 404.

use elocker_core::DeviceId;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::service::Gateway;
use crate::state::{DENY_NOT_FOUND, DeviceStatus};

/// Largest accepted request head or body.
const MAX_REQUEST_SIZE: usize = 8 * 1024;

const INVALID_JSON: &str = "Invalid JSON";
const INVALID_DEVICE_ID: &str = "Invalid Device ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn json(status: u16, value: &impl Serialize) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::text(500, e.to_string()),
        }
    }

    fn message(status: u16, message: &str) -> Self {
        Self::json(status, &Message { message })
    }

    fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::Validation(message) => Self::text(err.status_code(), message.as_str()),
            ApiError::PolicyDenied { reason } => Self::message(err.status_code(), reason),
            ApiError::Transport(_) => Self::message(err.status_code(), &err.to_string()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        let mut out = head.into_bytes();
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

#[derive(Serialize)]
struct Message<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    results: &'a [DeviceStatus],
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

/// Dispatch one request.
pub async fn route(gateway: &Gateway, method: &str, path: &str, body: &[u8]) -> Response {
    match (method, path) {
        ("POST", "/getStatus") => {
            let results = gateway.get_status().await;
            Response::json(200, &StatusBody { results: &results })
        }
        ("POST", "/setThreshold") => match set_threshold(gateway, body) {
            Ok(message) => Response::message(200, &message),
            Err(e) => Response::from_error(&e),
        },
        ("POST", "/unlock") => match unlock(gateway, body).await {
            Ok(()) => Response::message(200, "Success"),
            Err(e) => Response::from_error(&e),
        },
        _ => Response::text(404, "Not found"),
    }
}

fn set_threshold(gateway: &Gateway, body: &[u8]) -> Result<String, ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| ApiError::validation(INVALID_JSON))?;

    match (
        value.get("fullcharged").and_then(Value::as_f64),
        value.get("notcharged").and_then(Value::as_f64),
    ) {
        (Some(fullcharged), Some(notcharged)) => gateway.set_threshold(fullcharged, notcharged),
        _ => Err(ApiError::validation("Invalid threshold")),
    }
}

async fn unlock(gateway: &Gateway, body: &[u8]) -> Result<(), ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| ApiError::validation(INVALID_JSON))?;

    let Some(id) = value.get("id").filter(|id| id.is_number()) else {
        return Err(ApiError::validation(INVALID_DEVICE_ID));
    };
    info!(id = %id, "Unlock requested");

    // numeric ids that name no slot are simply unknown devices
    let id = id
        .as_u64()
        .and_then(|id| u8::try_from(id).ok())
        .map(DeviceId::new)
        .ok_or_else(|| ApiError::denied(DENY_NOT_FOUND))?;

    gateway.unlock(id).await
}

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, gateway: Arc<Gateway>) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };

        let gateway = gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &gateway).await {
                debug!(%peer, error = %e, "HTTP connection ended with error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, gateway: &Gateway) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let too_large = Response::text(413, "Request too large");

    // request line and headers share one budget
    let mut head = (&mut reader).take(MAX_REQUEST_SIZE as u64);

    let mut request_line = String::new();
    if head.read_line(&mut request_line).await? == 0 {
        return Ok(());
    }
    if head_overflowed(&request_line, head.limit()) {
        return write_half.write_all(&too_large.to_bytes()).await;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut header = String::new();
    loop {
        header.clear();
        let n = head.read_line(&mut header).await?;
        if head_overflowed(&header, head.limit()) {
            return write_half.write_all(&too_large.to_bytes()).await;
        }
        if n == 0 || header.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let response = if content_length > MAX_REQUEST_SIZE {
        too_large
    } else {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        debug!(%method, %path, len = body.len(), "HTTP request");
        route(gateway, &method, &path, &body).await
    };

    write_half.write_all(&response.to_bytes()).await?;
    write_half.shutdown().await
}

/// The head budget ran out before the line was terminated.
fn head_overflowed(line: &str, remaining: u64) -> bool {
    remaining == 0 && !line.ends_with('\n')
}
