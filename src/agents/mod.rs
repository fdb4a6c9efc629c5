//! Pipeline agents. Each agent subscribes to one topic on the session's
//! event bus, performs its work on spawned tasks tracked by the session
//! wait groups, and may publish to downstream topics.

use std::sync::Arc;

use crate::error::ScanError;
use crate::session::Session;

pub mod tcp_port_scanner;
pub mod url_hostname_resolver;
pub mod url_page_title_extractor;
pub mod url_publisher;
pub mod url_requester;
pub mod url_screenshotter;
pub mod url_takeover_detector;
pub mod url_technology_fingerprinter;

pub use tcp_port_scanner::TcpPortScanner;
pub use url_hostname_resolver::UrlHostnameResolver;
pub use url_page_title_extractor::UrlPageTitleExtractor;
pub use url_publisher::UrlPublisher;
pub use url_requester::UrlRequester;
pub use url_screenshotter::{CommandCapturer, ScreenshotCapturer, UrlScreenshotter};
pub use url_takeover_detector::UrlTakeoverDetector;
pub use url_technology_fingerprinter::{
    DefaultFingerprinter, Fingerprinter, UrlTechnologyFingerprinter,
};

pub trait Agent {
    fn id(&self) -> &'static str;

    /// Wire this agent's topic subscription onto the session bus.
    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError>;
}
