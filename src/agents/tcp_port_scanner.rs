use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::Session;

const AGENT_ID: &str = "agent:tcp_port_scanner";

/// Ports probed on hosts that arrive without an explicit port.
pub const DEFAULT_PORTS: &[u16] = &[
    80, 81, 443, 591, 2082, 2087, 2095, 2096, 3000, 8000, 8001, 8008, 8080, 8083, 8443, 8834, 8888,
];

/// Turns `Host` events into `TcpPort` events. A `host:port` target is
/// trusted as-is; bare hosts get a TCP connect probe across the default
/// port list, one tracked task per port.
pub struct TcpPortScanner;

impl TcpPortScanner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TcpPortScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for TcpPortScanner {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let sess = session.clone();
        session.event_bus.subscribe_async(
            Topic::Host,
            move |event| {
                let session = sess.clone();
                async move {
                    let Event::Host(host) = event else { return };
                    on_host(session, host).await;
                }
            },
            false,
        );
        Ok(())
    }
}

async fn on_host(session: Arc<Session>, host: String) {
    debug!("[{AGENT_ID}] Received new host: {host}");

    if let Some((name, port)) = host.split_once(':') {
        let Ok(port) = port.parse::<u16>() else {
            debug!("[{AGENT_ID}] Ignoring unparseable port in {host}");
            return;
        };
        let name = name.to_string();
        session.wait_group.add();
        let sess = session.clone();
        tokio::spawn(async move {
            sess.ports.insert(port);
            sess.event_bus.publish(Event::TcpPort(port, name));
            sess.wait_group.done();
        });
        return;
    }

    for &port in DEFAULT_PORTS {
        session.wait_group.add();
        let sess = session.clone();
        let name = host.clone();
        tokio::spawn(async move {
            if scan_port(&name, port, sess.options.scan_timeout()).await {
                debug!("[{AGENT_ID}] Port {port} open on {name}");
                sess.ports.insert(port);
                sess.event_bus.publish(Event::TcpPort(port, name));
            }
            sess.wait_group.done();
        });
    }
}

/// A completed TCP connect within the dial timeout means "open"; every
/// failure mode is silent.
async fn scan_port(host: &str, port: u16, dial_timeout: Duration) -> bool {
    matches!(
        timeout(dial_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_scan_port_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(scan_port("127.0.0.1", port, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_scan_port_silent_on_closed_port() {
        // Bind-then-drop guarantees the port is closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!scan_port("127.0.0.1", port, Duration::from_millis(500)).await);
    }
}
