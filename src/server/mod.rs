// src/server/mod.rs

//! Reload Coordinator: owns the local server lifecycle and tells connected
//! browsers to reload after a successful rebuild.

pub mod http;
pub mod livereload;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tiny_http::Server;
use tracing::{debug, info};

use crate::config::model::ServerSection;
use crate::errors::ServerStartError;

pub use livereload::{MAX_PORT_RETRIES, ReloadChannel, ReloadMessage};

/// Receiver of "the last triggered run succeeded" signals.
pub trait ReloadNotifier: Send + Sync {
    fn notify_reload(&self);
}

/// A started server: where it serves from and where it listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    pub base: PathBuf,
    pub http_addr: SocketAddr,
    pub reload_addr: SocketAddr,
}

struct Running {
    session: ServerSession,
    http: Arc<Server>,
    reload: ReloadChannel,
}

/// Starts the HTTP server and reload channel at most once per process and
/// broadcasts reloads to whoever is connected.
pub struct ReloadCoordinator {
    options: ServerSection,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("options", &self.options)
            .field("session", &self.session())
            .finish()
    }
}

impl ReloadCoordinator {
    pub fn new(options: ServerSection) -> Self {
        Self {
            options,
            running: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start serving `base`. Returns `Ok(true)` if this call started the
    /// server and `Ok(false)` if it was already running.
    pub fn start_server(&self, base: &Path) -> Result<bool, ServerStartError> {
        let mut running = self.lock();
        if let Some(existing) = running.as_ref() {
            debug!(base = ?existing.session.base, "server already started");
            return Ok(false);
        }

        let host = parse_host(&self.options.host)?;

        // The reload port must be known before HTML is served.
        let reload = ReloadChannel::bind(host, self.options.reload_port)?;
        let (server, http_addr) = http::bind_with_retry(host, self.options.port)?;
        let http = Arc::new(server);
        http::spawn_request_loop(
            Arc::clone(&http),
            http::ServeOptions {
                base: base.to_path_buf(),
                inject_port: self.options.inject_client.then(|| reload.port()),
            },
        )?;

        let session = ServerSession {
            base: base.to_path_buf(),
            http_addr,
            reload_addr: reload.addr(),
        };
        info!(
            "serving {:?} at http://{} (reload channel on port {})",
            session.base,
            session.http_addr,
            session.reload_addr.port()
        );

        *running = Some(Running {
            session,
            http,
            reload,
        });
        Ok(true)
    }

    pub fn is_started(&self) -> bool {
        self.lock().is_some()
    }

    pub fn session(&self) -> Option<ServerSession> {
        self.lock().as_ref().map(|r| r.session.clone())
    }

    pub fn connected_clients(&self) -> usize {
        self.lock()
            .as_ref()
            .map_or(0, |r| r.reload.client_count())
    }

    /// Send a reload to every connected client; returns how many got it.
    pub fn broadcast_reload(&self) -> usize {
        let reload = match self.lock().as_ref() {
            Some(r) => r.reload.clone(),
            None => {
                debug!("reload requested before the server started");
                return 0;
            }
        };
        let reached = reload.broadcast(&ReloadMessage::Reload);
        info!(clients = reached, "reload broadcast");
        reached
    }
}

impl ReloadNotifier for ReloadCoordinator {
    fn notify_reload(&self) {
        self.broadcast_reload();
    }
}

impl Drop for ReloadCoordinator {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            running.http.unblock();
        }
    }
}

fn parse_host(host: &str) -> Result<IpAddr, ServerStartError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    host.parse().map_err(|_| ServerStartError {
        what: "http",
        message: format!("invalid host address '{host}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral() -> ServerSection {
        ServerSection {
            port: 0,
            reload_port: 0,
            ..ServerSection::default()
        }
    }

    #[test]
    fn start_server_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ReloadCoordinator::new(ephemeral());
        assert!(!coordinator.is_started());
        assert_eq!(coordinator.broadcast_reload(), 0);

        assert!(coordinator.start_server(dir.path()).unwrap());
        let first = coordinator.session().unwrap();
        assert!(!coordinator.start_server(dir.path()).unwrap());
        assert_eq!(coordinator.session().unwrap(), first);
        assert_ne!(first.http_addr.port(), 0);
        assert_eq!(coordinator.connected_clients(), 0);
    }

    #[test]
    fn bad_host_fails_to_start() {
        let coordinator = ReloadCoordinator::new(ServerSection {
            host: "not an address".to_string(),
            ..ephemeral()
        });
        let err = coordinator.start_server(Path::new(".")).unwrap_err();
        assert_eq!(err.what, "http");
        assert!(!coordinator.is_started());
    }
}
