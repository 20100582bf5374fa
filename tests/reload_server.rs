// tests/reload_server.rs

mod common;
use crate::common::write_file;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tungstenite::Message;

use devflow::config::ServerSection;
use devflow::server::ReloadCoordinator;

fn ephemeral(inject_client: bool) -> ServerSection {
    ServerSection {
        port: 0,
        reload_port: 0,
        inject_client,
        ..ServerSection::default()
    }
}

fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

type Client = tungstenite::WebSocket<TcpStream>;

fn connect(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let (ws, _) = tungstenite::client(format!("ws://{addr}/"), stream).unwrap();
    ws
}

fn next_text(ws: &mut Client) -> String {
    loop {
        match ws.read().unwrap() {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    }
}

#[test]
fn serves_output_with_reload_client_injected() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "index.html", "<html><body><h1>home</h1></body></html>");
    write_file(dir.path(), "js/app.js", "run();");

    let coordinator = ReloadCoordinator::new(ephemeral(true));
    assert!(coordinator.start_server(dir.path()).unwrap());
    let session = coordinator.session().unwrap();

    let page = http_get(session.http_addr, "/");
    assert!(page.starts_with("HTTP/1.1 200"));
    assert!(page.contains("<h1>home</h1>"));
    assert!(page.contains("new WebSocket"));
    assert!(page.contains(&format!(":{}", session.reload_addr.port())));

    let script = http_get(session.http_addr, "/js/app.js");
    assert!(script.contains("text/javascript"));
    assert!(script.ends_with("run();"));

    assert!(http_get(session.http_addr, "/missing.css").starts_with("HTTP/1.1 404"));
    assert!(http_get(session.http_addr, "/../secret").starts_with("HTTP/1.1 404"));
}

#[test]
fn html_is_untouched_without_injection() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "index.html", "<html><body>plain</body></html>");

    let coordinator = ReloadCoordinator::new(ephemeral(false));
    coordinator.start_server(dir.path()).unwrap();
    let page = http_get(coordinator.session().unwrap().http_addr, "/index.html");
    assert!(page.ends_with("<html><body>plain</body></html>"));
}

#[test]
fn reload_reaches_every_connected_client() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ReloadCoordinator::new(ephemeral(true));
    coordinator.start_server(dir.path()).unwrap();
    let reload_addr = coordinator.session().unwrap().reload_addr;

    let mut first = connect(reload_addr);
    let mut second = connect(reload_addr);
    assert!(next_text(&mut first).contains(r#""type":"connected""#));
    assert!(next_text(&mut second).contains(r#""type":"connected""#));
    assert_eq!(coordinator.connected_clients(), 2);

    assert_eq!(coordinator.broadcast_reload(), 2);
    assert_eq!(next_text(&mut first), r#"{"type":"reload"}"#);
    assert_eq!(next_text(&mut second), r#"{"type":"reload"}"#);

    // A closed client is dropped by the broadcasts after it went away.
    drop(second);
    std::thread::sleep(Duration::from_millis(100));
    for _ in 0..3 {
        coordinator.broadcast_reload();
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(coordinator.connected_clients(), 1);
    assert_eq!(next_text(&mut first), r#"{"type":"reload"}"#);
}

#[test]
fn silent_peer_does_not_hold_up_other_clients() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ReloadCoordinator::new(ephemeral(true));
    coordinator.start_server(dir.path()).unwrap();
    let reload_addr = coordinator.session().unwrap().reload_addr;

    // Connects but never sends a handshake.
    let _silent = TcpStream::connect(reload_addr).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let mut browser = connect(reload_addr);
    assert!(next_text(&mut browser).contains(r#""type":"connected""#));
    assert_eq!(coordinator.connected_clients(), 1);

    assert_eq!(coordinator.broadcast_reload(), 1);
    assert_eq!(next_text(&mut browser), r#"{"type":"reload"}"#);
}
