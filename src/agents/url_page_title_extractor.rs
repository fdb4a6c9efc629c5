use std::sync::Arc;

use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use tracing::debug;

use crate::agents::url_requester::{build_http_client, random_user_agent};
use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::Session;

const AGENT_ID: &str = "agent:url_page_title_extractor";

/// Fetches each responsive-candidate URL on the redirect-following pass and
/// stores the document `<title>` on the page record.
pub struct UrlPageTitleExtractor;

impl UrlPageTitleExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlPageTitleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for UrlPageTitleExtractor {
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
                        extract(&sess, &client, &url).await;
                        sess.wait_group.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

async fn extract(session: &Arc<Session>, client: &reqwest::Client, url: &str) {
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

    let Some(title) = extract_title(&body) else {
        return;
    };
    debug!("[{AGENT_ID}] {url}: title {title:?}");

    // Pages are created by the requester; only annotate one that exists.
    if let Some(page) = session.get_page(url) {
        page.lock().expect("page lock poisoned").title = title;
    }
}

fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title: String = document.select(&selector).next()?.text().collect();
    let title = title.trim().to_string();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>  Admin Panel </title></head><body></body></html>";
        assert_eq!(extract_title(html), Some("Admin Panel".to_string()));
    }

    #[test]
    fn test_extract_title_missing_or_empty() {
        assert_eq!(extract_title("<html><body><p>no title</p></body></html>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
    }

    #[test]
    fn test_extract_title_survives_malformed_html() {
        assert_eq!(
            extract_title("<title>ok</title><div><<<"),
            Some("ok".to_string())
        );
    }
}
