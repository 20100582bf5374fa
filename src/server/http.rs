// src/server/http.rs

//! Static file server for the output tree.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, warn};

use crate::errors::ServerStartError;
use crate::server::livereload::MAX_PORT_RETRIES;

/// Bind to `host:port`, retrying the next ports when busy. Port 0 asks the
/// OS for an ephemeral port and is tried once.
pub fn bind_with_retry(host: IpAddr, base_port: u16) -> std::result::Result<(Server, SocketAddr), ServerStartError> {
    let attempts = if base_port == 0 { 1 } else { MAX_PORT_RETRIES };
    let mut last_error = String::new();

    for offset in 0..attempts {
        let port = base_port.saturating_add(offset);
        match Server::http(SocketAddr::new(host, port)) {
            Ok(server) => {
                if offset > 0 {
                    warn!("port {} in use, using {} instead", base_port, port);
                }
                let addr = server
                    .server_addr()
                    .to_ip()
                    .unwrap_or_else(|| SocketAddr::new(host, port));
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(ServerStartError {
        what: "http",
        message: format!(
            "failed to bind after {} attempt(s) from port {}: {}",
            attempts, base_port, last_error
        ),
    })
}

/// What the request loop needs to answer requests.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub base: PathBuf,
    /// Reload channel port to embed in served HTML, if injection is on.
    pub inject_port: Option<u16>,
}

/// Run the request loop on a dedicated thread until the server is unblocked.
pub fn spawn_request_loop(
    server: Arc<Server>,
    options: ServeOptions,
) -> std::result::Result<JoinHandle<()>, ServerStartError> {
    thread::Builder::new()
        .name("devflow-http".to_string())
        .spawn(move || {
            for request in server.incoming_requests() {
                if let Err(e) = handle_request(request, &options) {
                    warn!("request error: {e:#}");
                }
            }
            debug!("http request loop finished");
        })
        .map_err(|e| ServerStartError {
            what: "http",
            message: e.to_string(),
        })
}

fn handle_request(request: Request, options: &ServeOptions) -> Result<()> {
    debug!(method = %request.method(), url = %request.url(), "http request");

    if !matches!(request.method(), Method::Get | Method::Head) {
        return send(request, 405, "text/plain; charset=utf-8", b"405 Method Not Allowed".to_vec());
    }

    let Some(path) = resolve_path(request.url(), &options.base) else {
        return send(request, 404, "text/plain; charset=utf-8", b"404 Not Found".to_vec());
    };

    let content_type = mime_for(&path);
    let body = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let body = match options.inject_port {
        Some(port) if content_type.starts_with("text/html") => inject_reload_client(&body, port),
        _ => body,
    };
    send(request, 200, content_type, body)
}

fn send(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> Result<()> {
    let is_head = request.method() == &Method::Head;
    let mut response = Response::from_data(if is_head { Vec::new() } else { body })
        .with_status_code(StatusCode(status));
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response = response.with_header(header);
    }
    if let Ok(header) = Header::from_bytes("Cache-Control", "no-cache") {
        response = response.with_header(header);
    }
    request.respond(response)?;
    Ok(())
}

/// Resolve a request URL under `root`, using `index.html` for directories.
/// Path segments are percent-decoded.
///
/// Anything that would leave `root` (`..`, symlinks pointing outside) is
/// not found.
pub fn resolve_path(url: &str, root: &Path) -> Option<PathBuf> {
    let clean = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/');

    let mut rel = PathBuf::new();
    for seg in clean.split('/').filter(|seg| !seg.is_empty()) {
        let seg = percent_decode_str(seg).decode_utf8().ok()?;
        if seg == ".." || seg.contains(['/', '\\']) {
            return None;
        }
        rel.push(&*seg);
    }

    let canonical = root.join(rel).canonicalize().ok()?;
    let root_canonical = root.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }
    if canonical.is_dir() {
        let index = canonical.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }
    None
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// The script served pages use to follow reload broadcasts.
pub fn reload_client_script(port: u16) -> String {
    format!(
        "<script>(function(){{var ws=new WebSocket('ws://'+location.hostname+':{port}');\
ws.onmessage=function(e){{try{{if(JSON.parse(e.data).type==='reload')location.reload();}}catch(_){{}}}};}})();</script>"
    )
}

/// Insert the reload client before the last `</body>`, or append it.
pub fn inject_reload_client(content: &[u8], port: u16) -> Vec<u8> {
    const PATTERN: &[u8] = b"</body>";
    let script = reload_client_script(port);
    let script = script.as_bytes();

    let mut result = Vec::with_capacity(content.len() + script.len());
    match content
        .windows(PATTERN.len())
        .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
    {
        Some(pos) => {
            result.extend_from_slice(&content[..pos]);
            result.extend_from_slice(script);
            result.extend_from_slice(&content[pos..]);
        }
        None => {
            result.extend_from_slice(content);
            result.extend_from_slice(script);
        }
    }
    result
}
