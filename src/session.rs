//! Shared session state for one reconnaissance run.
//!
//! The session is the hub every agent hangs off: configuration, statistics
//! counters, the URL-keyed page registry, the observed port set, the event
//! bus and the wait-group pair. It is shared as an `Arc` and mutated
//! concurrently from many handlers; counters are atomic, the page registry
//! is a concurrent map with a separate insertion-order list, and individual
//! pages are locked independently.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::bus::EventBus;
use crate::config::Config;
use crate::error::ScanError;
use crate::utils;
use crate::waitgroup::WaitGroup;

/// A single response header. Multi-valued headers are space-joined into one
/// value at insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A technology or finding tag attached to a page by the fingerprinter or
/// takeover detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub text: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

/// The record accumulated for a single URL across all agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page {
    #[serde(rename = "URL")]
    pub url: String,
    pub hostname: String,
    pub protocol: String,
    pub port: String,
    pub status: String,
    pub code: String,
    pub length: String,
    pub title: String,
    pub server: String,
    pub location: String,
    pub headers: Vec<Header>,
    pub headers_path: String,
    pub body_path: String,
    pub screenshot_path: String,
    pub tags: Vec<Tag>,
    pub page_structure: Vec<String>,
}

impl Page {
    fn new(url: &str, parsed: &Url) -> Self {
        Self {
            url: url.to_string(),
            hostname: parsed.host_str().unwrap_or_default().to_string(),
            protocol: parsed.scheme().to_string(),
            port: parsed
                .port()
                .map(|p| p.to_string())
                .unwrap_or_else(|| utils::default_port(parsed.scheme()).to_string()),
            ..Default::default()
        }
    }

    /// Deterministic URL-derived stem for this page's artifact files.
    pub fn base_filename(&self) -> String {
        utils::base_filename(&self.url)
            .unwrap_or_else(|| format!("{}__{}__{}", self.protocol, self.hostname, self.port))
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push(Header {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn add_tag(&mut self, text: &str, kind: &str) {
        self.tags.push(Tag {
            text: text.to_string(),
            kind: kind.to_string(),
        });
    }
}

/// Monotonic statistics counters, safe for concurrent increment.
#[derive(Debug)]
pub struct Stats {
    pub started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    request_successful: AtomicU64,
    request_failed: AtomicU64,
    response_code_2xx: AtomicU64,
    response_code_3xx: AtomicU64,
    response_code_4xx: AtomicU64,
    response_code_5xx: AtomicU64,
    screenshot_successful: AtomicU64,
    screenshot_failed: AtomicU64,
}

impl Stats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
            request_successful: AtomicU64::new(0),
            request_failed: AtomicU64::new(0),
            response_code_2xx: AtomicU64::new(0),
            response_code_3xx: AtomicU64::new(0),
            response_code_4xx: AtomicU64::new(0),
            response_code_5xx: AtomicU64::new(0),
            screenshot_successful: AtomicU64::new(0),
            screenshot_failed: AtomicU64::new(0),
        }
    }

    pub fn increment_request_successful(&self) {
        self.request_successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_request_failed(&self) {
        self.request_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Bucket a response by its status-code hundreds digit.
    pub fn increment_response_code(&self, code: u16) {
        let bucket = match code {
            500.. => &self.response_code_5xx,
            400.. => &self.response_code_4xx,
            300.. => &self.response_code_3xx,
            _ => &self.response_code_2xx,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_screenshot_successful(&self) {
        self.screenshot_successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_screenshot_failed(&self) {
        self.screenshot_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        *self.finished_at.lock().expect("stats lock poisoned") = Some(Utc::now());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let finished_at = self
            .finished_at
            .lock()
            .expect("stats lock poisoned")
            .unwrap_or(self.started_at);
        StatsSnapshot {
            started_at: self.started_at,
            finished_at,
            request_successful: self.request_successful.load(Ordering::Relaxed),
            request_failed: self.request_failed.load(Ordering::Relaxed),
            response_code_2xx: self.response_code_2xx.load(Ordering::Relaxed),
            response_code_3xx: self.response_code_3xx.load(Ordering::Relaxed),
            response_code_4xx: self.response_code_4xx.load(Ordering::Relaxed),
            response_code_5xx: self.response_code_5xx.load(Ordering::Relaxed),
            screenshot_successful: self.screenshot_successful.load(Ordering::Relaxed),
            screenshot_failed: self.screenshot_failed.load(Ordering::Relaxed),
        }
    }
}

/// Plain point-in-time view of [`Stats`], used for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub request_successful: u64,
    pub request_failed: u64,
    pub response_code_2xx: u64,
    pub response_code_3xx: u64,
    pub response_code_4xx: u64,
    pub response_code_5xx: u64,
    pub screenshot_successful: u64,
    pub screenshot_failed: u64,
}

impl StatsSnapshot {
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Mapping from opaque cluster identifier to its member URLs, preserving
/// cluster creation order. Serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimilarityClusters(pub Vec<(String, Vec<String>)>);

impl SimilarityClusters {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<String>)> {
        self.0.iter()
    }

    pub fn total_urls(&self) -> usize {
        self.0.iter().map(|(_, urls)| urls.len()).sum()
    }
}

impl Serialize for SimilarityClusters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, urls) in &self.0 {
            map.serialize_entry(id, urls)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SimilarityClusters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ClusterVisitor;

        impl<'de> Visitor<'de> for ClusterVisitor {
            type Value = SimilarityClusters;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of cluster id to URL list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, Vec<String>>()? {
                    entries.push(entry);
                }
                Ok(SimilarityClusters(entries))
            }
        }

        deserializer.deserialize_map(ClusterVisitor)
    }
}

/// Serializable snapshot of a finished (or interrupted) session. This is
/// the exact shape of `aquatone_session.json`, and what report-only mode
/// loads back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionFile {
    pub version: String,
    pub options: Config,
    pub stats: StatsSnapshot,
    pub pages: Vec<Page>,
    pub ports: Vec<u16>,
    pub page_similarity_clusters: SimilarityClusters,
}

impl SessionFile {
    pub fn load(path: &std::path::Path) -> Result<Self, ScanError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| ScanError::SessionParse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Process-wide shared state for one run.
pub struct Session {
    pub version: String,
    pub options: Config,
    pub stats: Stats,
    pub event_bus: EventBus,
    pub wait_group: WaitGroup,
    pub wait_group2: WaitGroup,
    pub ports: DashSet<u16>,
    pages: DashMap<String, Arc<Mutex<Page>>>,
    page_order: Mutex<Vec<String>>,
    clusters: Mutex<SimilarityClusters>,
}

impl Session {
    /// Create a fresh session, verifying the output destination and laying
    /// out the artifact directories under it.
    pub fn new(options: Config) -> Result<Arc<Self>, ScanError> {
        if !options.out_dir_disabled() {
            let meta = std::fs::metadata(&options.out_dir).map_err(|_| {
                ScanError::MissingOutputDir(options.out_dir.display().to_string())
            })?;
            if !meta.is_dir() {
                return Err(ScanError::OutputNotDirectory);
            }
            for sub in ["headers", "html", "screenshots"] {
                std::fs::create_dir_all(options.out_dir.join(sub))?;
            }
        }

        Ok(Arc::new(Self {
            version: crate::VERSION.to_string(),
            options,
            stats: Stats::new(),
            event_bus: EventBus::new(),
            wait_group: WaitGroup::new(),
            wait_group2: WaitGroup::new(),
            ports: DashSet::new(),
            pages: DashMap::new(),
            page_order: Mutex::new(Vec::new()),
            clusters: Mutex::new(SimilarityClusters::default()),
        }))
    }

    pub fn get_file_path(&self, relative: &str) -> PathBuf {
        self.options.out_dir.join(relative)
    }

    /// Atomic get-or-insert of the page for `url`. Concurrent callers
    /// always receive the same handle; insertion order is recorded once.
    pub fn add_page(&self, url: &str) -> Result<Arc<Mutex<Page>>, ScanError> {
        let parsed = Url::parse(url).map_err(|_| ScanError::InvalidUrl(url.to_string()))?;
        let handle = self
            .pages
            .entry(url.to_string())
            .or_insert_with(|| {
                self.page_order
                    .lock()
                    .expect("page order lock poisoned")
                    .push(url.to_string());
                Arc::new(Mutex::new(Page::new(url, &parsed)))
            })
            .value()
            .clone();
        Ok(handle)
    }

    pub fn get_page(&self, url: &str) -> Option<Arc<Mutex<Page>>> {
        self.pages.get(url).map(|entry| entry.value().clone())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page handles in insertion order.
    pub fn pages_in_order(&self) -> Vec<Arc<Mutex<Page>>> {
        // Snapshot the order before touching the page map; holding the
        // order lock across map lookups would invert the locking order
        // used by add_page.
        let order: Vec<String> = self
            .page_order
            .lock()
            .expect("page order lock poisoned")
            .clone();
        order.iter().filter_map(|url| self.get_page(url)).collect()
    }

    pub fn set_clusters(&self, clusters: SimilarityClusters) {
        *self.clusters.lock().expect("cluster lock poisoned") = clusters;
    }

    pub fn clusters(&self) -> SimilarityClusters {
        self.clusters.lock().expect("cluster lock poisoned").clone()
    }

    pub fn end(&self) {
        self.stats.finish();
    }

    /// Snapshot the live session into its serializable form.
    pub fn to_file(&self) -> SessionFile {
        let pages = self
            .pages_in_order()
            .iter()
            .map(|page| page.lock().expect("page lock poisoned").clone())
            .collect();
        let mut ports: Vec<u16> = self.ports.iter().map(|p| *p).collect();
        ports.sort_unstable();

        SessionFile {
            version: self.version.clone(),
            options: self.options.clone(),
            stats: self.stats.snapshot(),
            pages,
            ports,
            page_similarity_clusters: self.clusters(),
        }
    }

    /// Serialize the session to `relative` under the output directory.
    pub fn save(&self, relative: &str) -> Result<PathBuf, ScanError> {
        let path = self.get_file_path(relative);
        let json = serde_json::to_string_pretty(&self.to_file())?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
