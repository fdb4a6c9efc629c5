//! HTTP probing agent. Fetches every published URL twice (first-hop and
//! redirect-following), feeds the statistics counters, creates and
//! populates the page record, and persists the response artifacts.

use std::sync::{Arc, Mutex};

use rand::Rng;
use reqwest::header::USER_AGENT;
use reqwest::redirect::Policy;
use tracing::{debug, error, info};

use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::config::Config;
use crate::error::ScanError;
use crate::session::{Header, Page, Session};
use crate::utils;

const AGENT_ID: &str = "agent:url_requester";

/// Redirects followed by the redirect-tracing client.
const MAX_REDIRECTS: usize = 10;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Fedora; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
];

pub(crate) fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())]
}

/// Build a probing client per the session options. Certificate validation
/// is off: scan targets routinely present self-signed or mismatched TLS.
pub(crate) fn build_http_client(
    options: &Config,
    follow_redirects: bool,
) -> Result<reqwest::Client, ScanError> {
    let policy = if follow_redirects {
        Policy::limited(MAX_REDIRECTS)
    } else {
        Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(options.http_timeout())
        .redirect(policy);

    if let Some(proxy) = &options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

/// Restore the conventional Title-Case spelling of a header name that the
/// HTTP library lowercased.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub struct UrlRequester;

impl UrlRequester {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlRequester {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for UrlRequester {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let first_hop = build_http_client(&session.options, false)?;
        let following = build_http_client(&session.options, true)?;

        let sess = session.clone();
        session.event_bus.subscribe_async(
            Topic::Url,
            move |event| {
                let session = sess.clone();
                let first_hop = first_hop.clone();
                let following = following.clone();
                async move {
                    let Event::Url(url, follow) = event else { return };
                    debug!("[{AGENT_ID}] Received new URL {url} (follow: {follow})");

                    session.wait_group.add();
                    let sess = session.clone();
                    tokio::spawn(async move {
                        let client = if follow { following } else { first_hop };
                        request_url(&sess, &client, &url, follow).await;
                        sess.wait_group.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

async fn request_url(session: &Arc<Session>, client: &reqwest::Client, url: &str, follow: bool) {
    let response = match client
        .get(url)
        .header(USER_AGENT, random_user_agent())
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            session.stats.increment_request_failed();
            if err.is_timeout() {
                error!("{url}: request timeout");
            } else {
                debug!("[{AGENT_ID}] {url}: failed: {err}");
            }
            return;
        }
    };

    let code = response.status().as_u16();
    session.stats.increment_request_successful();
    session.stats.increment_response_code(code);

    let status_line = format!(
        "{} {}",
        code,
        response.status().canonical_reason().unwrap_or("")
    );
    info!("{url}: {status_line}");

    let page_handle = match session.add_page(url) {
        Ok(handle) => handle,
        Err(err) => {
            debug!("[{AGENT_ID}] Error: {err}");
            error!("Failed to create page for URL: {url}");
            return;
        }
    };

    // Header order is the arrival order of the parsed response; multiple
    // values of one name collapse into a single space-joined value.
    let mut headers: Vec<Header> = Vec::new();
    for name in response.headers().keys() {
        let value = response
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(" ");
        headers.push(Header {
            name: canonical_header_name(name.as_str()),
            value,
        });
    }

    let content_length = response
        .content_length()
        .map(|len| len.to_string())
        .unwrap_or_else(|| "-1".to_string());

    {
        let mut page = page_handle.lock().expect("page lock poisoned");
        page.status = status_line.clone();
        page.code = code.to_string();
        page.length = content_length;
        page.headers.clear();
        for header in &headers {
            page.add_header(&header.name, &header.value);
            if header.name.eq_ignore_ascii_case("server") {
                page.server = header.value.clone();
            } else if header.name.eq_ignore_ascii_case("location") {
                page.location = header.value.clone();
            }
        }
    }

    if !session.options.out_dir_disabled() {
        write_headers(session, url, &status_line, &headers, &page_handle).await;
    }

    if session.options.save_body {
        match response.bytes().await {
            Ok(body) => {
                {
                    let mut page = page_handle.lock().expect("page lock poisoned");
                    page.length = body.len().to_string();
                }
                if !session.options.out_dir_disabled() {
                    write_body(session, url, &body, &page_handle).await;
                }
            }
            Err(err) => {
                debug!("[{AGENT_ID}] Error: {err}");
                error!("Failed to read response body for {url}");
            }
        }
    }

    if follow {
        session.event_bus.publish(Event::UrlResponsive(url.to_string()));
    }
}

async fn write_headers(
    session: &Arc<Session>,
    url: &str,
    status_line: &str,
    headers: &[Header],
    page_handle: &Arc<Mutex<Page>>,
) {
    let Some(slug) = utils::base_filename(url) else {
        return;
    };
    let relative = format!("headers/{slug}.txt");

    let mut content = format!("{status_line}\n");
    for header in headers {
        content.push_str(&format!("{}: {}\n", header.name, header.value));
    }

    let path = session.get_file_path(&relative);
    if let Err(err) = tokio::fs::write(&path, content).await {
        debug!("[{AGENT_ID}] Error: {err}");
        error!(
            "Failed to write HTTP response headers for {url} to {}",
            path.display()
        );
    }
    page_handle.lock().expect("page lock poisoned").headers_path = relative;
}

async fn write_body(
    session: &Arc<Session>,
    url: &str,
    body: &[u8],
    page_handle: &Arc<Mutex<Page>>,
) {
    let Some(slug) = utils::base_filename(url) else {
        return;
    };
    let relative = format!("html/{slug}.html");

    let path = session.get_file_path(&relative);
    if let Err(err) = tokio::fs::write(&path, body).await {
        debug!("[{AGENT_ID}] Error: {err}");
        error!(
            "Failed to write HTTP response body for {url} to {}",
            path.display()
        );
    }
    page_handle.lock().expect("page lock poisoned").body_path = relative;
}
