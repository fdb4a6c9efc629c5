//! # Aquatone
//!
//! An HTTP-based attack surface reconnaissance pipeline. Targets stream in
//! as hosts or URLs, get probed over HTTP(S), and come out the other side
//! as an HTML report plus a serialized session: per-URL page records with
//! headers, bodies, screenshots and technology tags, grouped into clusters
//! of structurally similar pages.
//!
//! The engine is a topic-routed event bus with asynchronous agents:
//!
//! ```text
//! input line ─┬─ Host ──▶ TcpPortScanner ──▶ TcpPort ──▶ UrlPublisher ─┐
//!             │                                                        ▼
//!             └─ URL ────────────────────────────────────────────────▶ Url
//!                  Url ──▶ { requester, resolver, titles, screenshots,
//!                            fingerprinter, takeover } ──▶ UrlResponsive
//! ```
//!
//! Work fans out across tracked tasks; shutdown is a two-phase drain that
//! first settles every request cascade, then publishes `SessionEnd` and
//! settles the finalizers. Only after full quiescence does the driver
//! compute page structures, cluster, render the report and persist the
//! session JSON.
//!
//! ## CLI usage
//!
//! ```bash
//! # Probe everything in targets.txt, write artifacts into ./scan
//! aquatone --input targets.txt --out-dir scan
//!
//! # Regenerate the report from an earlier run
//! aquatone --session scan/aquatone_session.json --out-dir scan
//! ```

/// Command-line interface and logging setup
pub mod cli;

/// Run configuration and validation
pub mod config;

/// Error types
pub mod error;

/// Topic-routed asynchronous publish/subscribe
pub mod bus;

/// Work-tracking counters for the two-phase drain
pub mod waitgroup;

/// Shared session state, page registry and serialization
pub mod session;

/// Pipeline agents
pub mod agents;

/// Page-structure extraction and similarity clustering
pub mod similarity;

/// HTML report rendering
pub mod report;

/// The driver: mode selection, priming, drain and finalization
pub mod runner;

/// URL classification and formatting helpers
pub mod utils;


pub const NAME: &str = "aquatone";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Responsive URL list written during finalization.
pub const URLS_FILENAME: &str = "aquatone_urls.txt";
/// Serialized session snapshot.
pub const SESSION_FILENAME: &str = "aquatone_session.json";
/// Rendered HTML report.
pub const REPORT_FILENAME: &str = "aquatone_report.html";

pub use agents::{
    Agent, CommandCapturer, DefaultFingerprinter, Fingerprinter, ScreenshotCapturer,
    TcpPortScanner, UrlHostnameResolver, UrlPageTitleExtractor, UrlPublisher, UrlRequester,
    UrlScreenshotter, UrlTakeoverDetector, UrlTechnologyFingerprinter,
};
pub use bus::{Event, EventBus, Topic};
pub use cli::{setup_logging, Cli};
pub use config::{ClusteringPredicate, Config};
pub use error::ScanError;
pub use report::Report;
pub use session::{Header, Page, Session, SessionFile, SimilarityClusters, Stats, Tag};
pub use similarity::{cluster_pages, get_page_structure, get_similarity};
pub use waitgroup::WaitGroup;
