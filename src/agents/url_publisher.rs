use std::sync::Arc;

use tracing::debug;

use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::Session;

const AGENT_ID: &str = "agent:url_publisher";

/// Ports served over plain HTTP.
const HTTP_PORTS: &[u16] = &[80, 81, 591, 2082, 2095, 3000, 8000, 8001, 8008, 8080, 8083, 8888];

/// Ports served over TLS.
const TLS_PORTS: &[u16] = &[443, 2087, 2096, 8443, 8834];

/// Turns `TcpPort` events into `Url` events. Known ports pick their scheme;
/// unknown ports emit both variants. Every URL is published twice, once per
/// redirect-follow flag.
pub struct UrlPublisher;

impl UrlPublisher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for UrlPublisher {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let sess = session.clone();
        session.event_bus.subscribe_async(
            Topic::TcpPort,
            move |event| {
                let session = sess.clone();
                async move {
                    let Event::TcpPort(port, host) = event else {
                        return;
                    };
                    debug!("[{AGENT_ID}] Received open port {port} on {host}");
                    session.wait_group.add();
                    let sess = session.clone();
                    tokio::spawn(async move {
                        for url in urls_for(&host, port) {
                            sess.event_bus.publish(Event::Url(url.clone(), false));
                            sess.event_bus.publish(Event::Url(url, true));
                        }
                        sess.wait_group.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

fn urls_for(host: &str, port: u16) -> Vec<String> {
    if HTTP_PORTS.contains(&port) {
        vec![format_url("http", host, port)]
    } else if TLS_PORTS.contains(&port) {
        vec![format_url("https", host, port)]
    } else {
        vec![
            format_url("http", host, port),
            format_url("https", host, port),
        ]
    }
}

/// The port is spelled out unless it is the scheme default.
fn format_url(scheme: &str, host: &str, port: u16) -> String {
    let default = matches!((scheme, port), ("http", 80) | ("https", 443));
    if default {
        format!("{scheme}://{host}/")
    } else {
        format!("{scheme}://{host}:{port}/")
    }
}
