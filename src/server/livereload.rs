// src/server/livereload.rs

//! WebSocket reload channel.
//!
//! Browsers connect, receive a `{"type":"connected"}` greeting, and later
//! `{"type":"reload"}` whenever a rebuild succeeded. Clients are only ever
//! written to; a client whose send fails is considered disconnected.

use std::fmt;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::errors::ServerStartError;

/// Maximum number of port binding attempts.
pub const MAX_PORT_RETRIES: u16 = 10;

/// How long a peer may take to complete the WebSocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on one blocking write to a client; a client that stops
/// reading is dropped once it is exceeded.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Message sent over the reload channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    Connected { version: String },
    Reload,
}

impl ReloadMessage {
    pub fn connected() -> Self {
        ReloadMessage::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Accepts WebSocket clients on a background thread and broadcasts to them.
#[derive(Clone)]
pub struct ReloadChannel {
    addr: SocketAddr,
    clients: Clients,
}

impl fmt::Debug for ReloadChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadChannel")
            .field("addr", &self.addr)
            .field("clients", &self.client_count())
            .finish()
    }
}

impl ReloadChannel {
    /// Bind `host:port` (retrying the next ports when busy) and start
    /// accepting clients.
    pub fn bind(host: IpAddr, port: u16) -> Result<Self, ServerStartError> {
        let listener = try_bind_port(host, port)?;
        let addr = listener.local_addr().map_err(|e| ServerStartError {
            what: "reload",
            message: e.to_string(),
        })?;

        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let accept_clients = Arc::clone(&clients);

        thread::Builder::new()
            .name("devflow-reload".to_string())
            .spawn(move || accept_loop(listener, accept_clients))
            .map_err(|e| ServerStartError {
                what: "reload",
                message: e.to_string(),
            })?;

        debug!(%addr, "reload channel listening");
        Ok(Self { addr, clients })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Send `msg` to every client, dropping those that fail. Returns how
    /// many clients received it.
    pub fn broadcast(&self, msg: &ReloadMessage) -> usize {
        let json = msg.to_json();
        let mut clients = lock(&self.clients);
        clients.retain_mut(|ws| match ws.send(Message::Text(json.clone().into())) {
            Ok(()) => true,
            Err(e) => {
                debug!("dropping reload client: {e}");
                false
            }
        });
        clients.len()
    }
}

fn lock(clients: &Clients) -> MutexGuard<'_, Vec<WebSocket<TcpStream>>> {
    clients.lock().unwrap_or_else(|e| e.into_inner())
}

fn accept_loop(listener: TcpListener, clients: Clients) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("reload channel accept error: {e}");
                continue;
            }
        };
        // Each handshake gets its own thread so a silent peer cannot hold
        // up the clients behind it.
        let clients = Arc::clone(&clients);
        let spawned = thread::Builder::new()
            .name("devflow-reload-client".to_string())
            .spawn(move || register_client(stream, &clients));
        if let Err(e) = spawned {
            warn!("cannot start reload handshake thread: {e}");
        }
    }
}

fn register_client(stream: TcpStream, clients: &Clients) {
    let timeouts = stream
        .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
        .and_then(|()| stream.set_write_timeout(Some(WRITE_TIMEOUT)));
    if let Err(e) = timeouts {
        debug!("cannot configure reload client socket: {e}");
        return;
    }

    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            debug!("reload handshake failed: {e}");
            return;
        }
    };

    // Greet under the lock: a greeted client never misses a broadcast.
    let mut guard = lock(clients);
    if let Err(e) = ws.send(Message::Text(ReloadMessage::connected().to_json().into())) {
        debug!("failed to greet reload client: {e}");
        return;
    }
    guard.push(ws);
    debug!(total = guard.len(), "reload client connected");
}

/// Bind `port`, or one of the next ports if it is in use. Port 0 asks the
/// OS for an ephemeral port and is tried once.
fn try_bind_port(host: IpAddr, base_port: u16) -> Result<TcpListener, ServerStartError> {
    let attempts = if base_port == 0 { 1 } else { MAX_PORT_RETRIES };
    let mut last_error = None;

    for offset in 0..attempts {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(host, port)) {
            Ok(listener) => {
                if offset > 0 {
                    warn!("reload port {} in use, using {} instead", base_port, port);
                }
                return Ok(listener);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(ServerStartError {
        what: "reload",
        message: format!(
            "failed to bind after {} attempt(s) from port {}: {}",
            attempts,
            base_port,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ),
    })
}
