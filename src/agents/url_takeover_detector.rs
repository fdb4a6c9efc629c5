//! Subdomain-takeover detection agent. Matches response bodies against the
//! error fingerprints that hosting services show for unclaimed names.

use std::sync::Arc;

use reqwest::header::USER_AGENT;
use tracing::{debug, warn};

use crate::agents::url_requester::{build_http_client, random_user_agent};
use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::Session;

const AGENT_ID: &str = "agent:url_takeover_detector";

/// (service, body fingerprint) pairs indicating a dangling host.
const TAKEOVER_SIGNATURES: &[(&str, &str)] = &[
    ("GitHub Pages", "There isn't a GitHub Pages site here."),
    ("Heroku", "No such app"),
    ("Amazon S3", "NoSuchBucket"),
    ("Amazon S3", "The specified bucket does not exist"),
    ("Fastly", "Fastly error: unknown domain"),
    ("Shopify", "Sorry, this shop is currently unavailable"),
    ("Tumblr", "Whatever you were looking for doesn't currently exist at this address"),
    ("Ghost", "The thing you were looking for is no longer here"),
    ("Surge", "project not found"),
    ("Pantheon", "The gods are wise, but do not know of the site which you seek"),
    ("Cargo", "If you're moving your domain away from Cargo you must make this configuration"),
    ("Help Scout", "No settings were found for this company"),
];

pub struct UrlTakeoverDetector;

impl UrlTakeoverDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlTakeoverDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for UrlTakeoverDetector {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let client = build_http_client(&session.options, true)?;

        let sess = session.clone();
        session.event_bus.subscribe_async(
            Topic::Url,
            move |event| {
                let session = sess.clone();
                let client = client.clone();
                async move {
                    let Event::Url(url, true) = event else { return };
                    session.wait_group.add();
                    let sess = session.clone();
                    tokio::spawn(async move {
                        detect(&sess, &client, &url).await;
                        sess.wait_group.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

async fn detect(session: &Arc<Session>, client: &reqwest::Client, url: &str) {
    let body = match client
        .get(url)
        .header(USER_AGENT, random_user_agent())
        .send()
        .await
    {
        Ok(response) => match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!("[{AGENT_ID}] {url}: body read failed: {err}");
                return;
            }
        },
        Err(err) => {
            debug!("[{AGENT_ID}] {url}: request failed: {err}");
            return;
        }
    };

    if let Some(service) = match_signature(&body) {
        warn!("{url}: possible {service} domain takeover");
        if let Some(page) = session.get_page(url) {
            let mut page = page.lock().expect("page lock poisoned");
            let text = format!("Possible takeover: {service}");
            if !page.tags.iter().any(|tag| tag.text == text) {
                page.add_tag(&text, "danger");
            }
        }
    }
}

fn match_signature(body: &str) -> Option<&'static str> {
    TAKEOVER_SIGNATURES
        .iter()
        .find(|(_, fingerprint)| body.contains(fingerprint))
        .map(|(service, _)| *service)
}
