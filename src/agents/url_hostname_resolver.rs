use std::sync::Arc;

use tokio::net::lookup_host;
use tracing::debug;
use url::Url;

use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::Session;
use crate::utils;

const AGENT_ID: &str = "agent:url_hostname_resolver";

/// Resolves each URL's hostname with a standard name lookup and records the
/// hostname on the page record once one exists. Acts on the first-hop pass
/// only, so each URL is resolved once.
pub struct UrlHostnameResolver;

impl UrlHostnameResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlHostnameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for UrlHostnameResolver {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let sess = session.clone();
        session.event_bus.subscribe_async(
            Topic::Url,
            move |event| {
                let session = sess.clone();
                async move {
                    let Event::Url(url, false) = event else { return };
                    session.wait_group.add();
                    let sess = session.clone();
                    tokio::spawn(async move {
                        resolve(&sess, &url).await;
                        sess.wait_group.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

async fn resolve(session: &Arc<Session>, url: &str) {
    let Ok(parsed) = Url::parse(url) else { return };
    let Some(host) = parsed.host_str().map(|h| h.to_string()) else { return };
    let port: u16 = parsed
        .port()
        .unwrap_or_else(|| utils::default_port(parsed.scheme()).parse().unwrap_or(80));

    let lookup_result = lookup_host((host.as_str(), port)).await;
    match lookup_result {
        Ok(addresses) => {
            let addresses: Vec<_> = addresses.map(|addr| addr.ip()).collect();
            debug!("[{AGENT_ID}] {host} resolves to {addresses:?}");
            if let Some(page) = session.get_page(url) {
                page.lock().expect("page lock poisoned").hostname = host.to_string();
            }
        }
        Err(err) => {
            debug!("[{AGENT_ID}] {host}: lookup failed: {err}");
        }
    }
}
