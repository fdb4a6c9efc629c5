//! Technology fingerprinting agent. Fetches the URL itself and hands the
//! response to a [`Fingerprinter`], which turns headers and body into tags
//! on the page record.

use std::sync::Arc;

use reqwest::header::USER_AGENT;
use tracing::debug;

use crate::agents::url_requester::{build_http_client, random_user_agent};
use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::{Header, Session, Tag};

const AGENT_ID: &str = "agent:url_technology_fingerprinter";

pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, headers: &[Header], body: &str) -> Vec<Tag>;
}

/// Built-in fingerprinter working off the Server / X-Powered-By headers and
/// a small set of body signatures.
pub struct DefaultFingerprinter;

const BODY_SIGNATURES: &[(&str, &str)] = &[
    ("wp-content/", "WordPress"),
    ("/sites/default/files", "Drupal"),
    ("Joomla!", "Joomla"),
    ("__VIEWSTATE", "ASP.NET"),
    ("laravel_session", "Laravel"),
    ("data-reactroot", "React"),
    ("ng-version=", "Angular"),
    ("Powered by Shopify", "Shopify"),
];

impl Fingerprinter for DefaultFingerprinter {
    fn fingerprint(&self, headers: &[Header], body: &str) -> Vec<Tag> {
        let mut tags = Vec::new();

        for header in headers {
            if header.name.eq_ignore_ascii_case("server")
                || header.name.eq_ignore_ascii_case("x-powered-by")
            {
                if !header.value.is_empty() {
                    tags.push(Tag {
                        text: header.value.clone(),
                        kind: "info".to_string(),
                    });
                }
            }
        }

        for (needle, technology) in BODY_SIGNATURES {
            if body.contains(needle) {
                tags.push(Tag {
                    text: technology.to_string(),
                    kind: "info".to_string(),
                });
            }
        }

        tags
    }
}

pub struct UrlTechnologyFingerprinter {
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl UrlTechnologyFingerprinter {
    pub fn new(fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        Self { fingerprinter }
    }
}

impl Default for UrlTechnologyFingerprinter {
    fn default() -> Self {
        Self::new(Arc::new(DefaultFingerprinter))
    }
}

impl Agent for UrlTechnologyFingerprinter {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let client = build_http_client(&session.options, true)?;

        let sess = session.clone();
        let fingerprinter = self.fingerprinter.clone();
        session.event_bus.subscribe_async(
            Topic::Url,
            move |event| {
                let session = sess.clone();
                let client = client.clone();
                let fingerprinter = fingerprinter.clone();
                async move {
                    let Event::Url(url, true) = event else { return };
                    session.wait_group.add();
                    let sess = session.clone();
                    tokio::spawn(async move {
                        fingerprint_url(&sess, &client, fingerprinter.as_ref(), &url).await;
                        sess.wait_group.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

async fn fingerprint_url(
    session: &Arc<Session>,
    client: &reqwest::Client,
    fingerprinter: &dyn Fingerprinter,
    url: &str,
) {
    let response = match client
        .get(url)
        .header(USER_AGENT, random_user_agent())
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            debug!("[{AGENT_ID}] {url}: request failed: {err}");
            return;
        }
    };

    let headers: Vec<Header> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| Header {
                name: name.as_str().to_string(),
                value: v.to_string(),
            })
        })
        .collect();
    let body = response.text().await.unwrap_or_default();

    let tags = fingerprinter.fingerprint(&headers, &body);
    if tags.is_empty() {
        return;
    }
    debug!("[{AGENT_ID}] {url}: {} tags", tags.len());

    if let Some(page) = session.get_page(url) {
        let mut page = page.lock().expect("page lock poisoned");
        for tag in tags {
            if !page.tags.iter().any(|existing| existing.text == tag.text) {
                page.tags.push(tag);
            }
        }
    }
}
