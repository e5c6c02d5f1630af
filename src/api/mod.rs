//! HTTP surface for the monitor.
//!
//! A single accept-loop thread serves requests sequentially, so the monitor
//! needs no internal locking; session keying alone isolates concurrent
//! clients from one another.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{Frame, MAX_IMAGE_BYTES};
use crate::monitor::Monitor;
use crate::{MonitorError, DEFAULT_SESSION};

const MAX_HEADER_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Upper bound on request bodies. Base64 inflates payloads by 4/3, so
    /// this sits above the decoded image cap.
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8471".to_string(),
            max_body_bytes: MAX_IMAGE_BYTES * 2,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    monitor: Monitor,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, monitor: Monitor) -> Self {
        Self { cfg, monitor }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let mut monitor = self.monitor;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, &mut monitor, shutdown_thread) {
                log::error!("monitor api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    monitor: &mut Monitor,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, monitor, &cfg) {
                    log::warn!("monitor api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    frame: Option<String>,
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRequest {
    image: Option<String>,
    session: Option<String>,
}

fn handle_connection(
    mut stream: TcpStream,
    monitor: &mut Monitor,
    cfg: &ApiConfig,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream, cfg.max_body_bytes)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        }
        ("POST", "/detect" | "/detect/") => {
            handle_detect(&mut stream, monitor, &request.body)?;
        }
        ("POST", "/set-reference" | "/set-reference/") => {
            handle_set_reference(&mut stream, monitor, &request.body)?;
        }
        (_, "/health" | "/detect" | "/detect/" | "/set-reference" | "/set-reference/") => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        }
        _ => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
        }
    }
    Ok(())
}

fn handle_detect(stream: &mut TcpStream, monitor: &mut Monitor, body: &[u8]) -> Result<()> {
    let request: DetectRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(_) => {
            write_json_response(stream, 400, r#"{"error":"invalid_json_body"}"#)?;
            return Ok(());
        }
    };

    let report = request
        .frame
        .ok_or(MonitorError::MissingInput("frame"))
        .and_then(|encoded| Frame::from_base64(&encoded))
        .and_then(|frame| {
            let session = request.session.as_deref().unwrap_or(DEFAULT_SESSION);
            monitor.process_frame(session, &frame)
        });

    match report {
        Ok(report) => {
            let payload = serde_json::to_vec(&report)?;
            write_response(stream, 200, "application/json", &payload)?;
        }
        Err(err) => write_monitor_error(stream, &err)?,
    }
    Ok(())
}

fn handle_set_reference(
    stream: &mut TcpStream,
    monitor: &mut Monitor,
    body: &[u8],
) -> Result<()> {
    let request: ReferenceRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(_) => {
            write_json_response(stream, 400, r#"{"error":"invalid_json_body"}"#)?;
            return Ok(());
        }
    };

    let stored = request
        .image
        .ok_or(MonitorError::MissingInput("image"))
        .and_then(|encoded| Frame::from_base64(&encoded))
        .and_then(|image| {
            let session = request.session.as_deref().unwrap_or(DEFAULT_SESSION);
            monitor.set_reference(session, &image)
        });

    match stored {
        Ok(()) => {
            write_json_response(stream, 200, r#"{"message":"reference image set"}"#)?;
        }
        Err(err) => write_monitor_error(stream, &err)?,
    }
    Ok(())
}

/// Map a monitor error to a response. Client errors carry their message;
/// unexpected failures are logged server-side and answered generically.
fn write_monitor_error(stream: &mut TcpStream, err: &MonitorError) -> Result<()> {
    match err {
        MonitorError::Unexpected(inner) => {
            log::error!("monitor api internal error: {:#}", inner);
            write_json_response(stream, 500, r#"{"error":"internal_error"}"#)
        }
        other => {
            let body = serde_json::json!({ "error": other.to_string() }).to_string();
            write_json_response(stream, other.status(), &body)
        }
    }
}

fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 64 * 1024];
    let mut data = Vec::new();
    let mut header_end = None;

    loop {
        if header_end.is_none() {
            if let Some(pos) = find_header_end(&data) {
                header_end = Some(pos);
            } else if data.len() > MAX_HEADER_BYTES {
                return Err(anyhow!("request header too large"));
            }
        }
        if let Some(pos) = header_end {
            let content_length = parse_content_length(&data[..pos])?;
            if content_length > max_body_bytes {
                return Err(anyhow!("request body too large"));
            }
            if data.len() >= pos + 4 + content_length {
                break;
            }
        }

        let n = stream.read(&mut buf)?;
        if n == 0 {
            if header_end.is_some() {
                break;
            }
            return Err(anyhow!("connection closed before request was complete"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_HEADER_BYTES + max_body_bytes {
            return Err(anyhow!("request too large"));
        }
    }

    let header_end = header_end.ok_or_else(|| anyhow!("malformed request"))?;
    let header_text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;

    let content_length = parse_content_length(&data[..header_end])?;
    let body_start = header_end + 4;
    let body_end = (body_start + content_length).min(data.len());
    let body = data[body_start..body_end].to_vec();

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(header_bytes: &[u8]) -> Result<usize> {
    let text = String::from_utf8_lossy(header_bytes);
    let mut headers = HashMap::new();
    for line in text.split("\r\n").skip(1) {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length header")),
        None => Ok(0),
    }
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_is_parsed_case_insensitively() {
        let header = b"POST /detect/ HTTP/1.1\r\nHost: x\r\ncontent-LENGTH: 42\r\n";
        assert_eq!(parse_content_length(header).unwrap(), 42);
    }

    #[test]
    fn missing_content_length_means_empty_body() {
        let header = b"GET /health HTTP/1.1\r\nHost: x\r\n";
        assert_eq!(parse_content_length(header).unwrap(), 0);
    }

    #[test]
    fn garbage_content_length_is_rejected() {
        let header = b"POST / HTTP/1.1\r\nContent-Length: many\r\n";
        assert!(parse_content_length(header).is_err());
    }

    #[test]
    fn header_terminator_is_located() {
        assert_eq!(find_header_end(b"abc\r\n\r\nbody"), Some(3));
        assert_eq!(find_header_end(b"abc\r\n"), None);
    }
}
