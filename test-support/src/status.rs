//! Stand-ins for the daemon's status endpoint.
//!
//! Provides canned status bodies, `wiremock` servers answering
//! `GET /v1/status`, a port that refuses connections, and a TCP server that
//! replies with bytes that are not HTTP.

#![expect(clippy::expect_used, reason = "simplify test setup")]

use plugmy_lib::{DaemonStatus, STATUS_PATH};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a healthy status body.
pub fn status_body(version: &str, uptime_secs: u64, providers: &[&str]) -> Value {
    serde_json::to_value(DaemonStatus {
        status: "ok".into(),
        version: version.into(),
        uptime_secs,
        port: plugmy_lib::DEFAULT_DAEMON_PORT,
        providers: providers.iter().map(|p| (*p).to_owned()).collect(),
    })
    .expect("serialise status body")
}

/// Start a mock daemon answering 200 with a healthy status body.
pub async fn healthy_daemon() -> MockServer {
    let server = MockServer::start().await;
    mount_status(&server, ResponseTemplate::new(200).set_body_json(status_body("1.0.0", 5, &["claude"])))
        .await;
    server
}

/// Mount `template` as the response to `GET /v1/status` on `server`.
pub async fn mount_status(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Port of a mock server, for configurations keyed by port.
pub fn port_of(server: &MockServer) -> u16 {
    server.address().port()
}

/// Return a loopback port with nothing listening on it.
///
/// The port is bound and released immediately, so a connection attempt is
/// refused unless another process claims it in between.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Start a TCP server that answers every connection with non-HTTP bytes.
///
/// Returns the port and the accept task; abort or drop the task to stop it.
pub async fn garbage_server() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind garbage server");
    let port = listener.local_addr().expect("local addr").port();
    let task = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0_u8; 512];
                let _ = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
                let _ = stream.write_all(b"definitely not http\r\n\r\n").await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (port, task)
}
