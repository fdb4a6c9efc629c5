//! Run configuration with serde serialization/deserialization.
//!
//! The configuration is assembled from CLI arguments, carried on the session
//! for the lifetime of a run, and serialized into the session file so a
//! report can be regenerated from the same options later.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScanError;

/// Sentinel output directory value that disables screenshots, technology
/// fingerprinting and report rendering.
pub const OUT_DIR_NONE: &str = "none";

/// Main configuration for a reconnaissance run.
///
/// # Examples
///
/// ```rust
/// use aquatone::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     scan_timeout: 500,
///     save_body: false,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Path to a newline-separated target list. Required for a live run.
    pub input: Option<PathBuf>,

    /// Directory receiving all run artifacts. The value `"none"` disables
    /// screenshots, fingerprinting and report rendering.
    pub out_dir: PathBuf,

    /// When set, the run only regenerates the HTML report from this
    /// previously-written session file.
    pub session_path: Option<PathBuf>,

    /// Optional HTML template overriding the embedded report template.
    pub template_path: Option<PathBuf>,

    /// TCP connect timeout in milliseconds for port probes (default: 100)
    pub scan_timeout: u64,

    /// HTTP request timeout in milliseconds (default: 15000)
    pub http_timeout: u64,

    /// Outbound HTTP proxy URL, e.g. `http://127.0.0.1:8080`
    pub proxy: Option<String>,

    /// Persist response bodies under `html/` (default: true)
    ///
    /// Bodies are also the input for page-structure extraction, so
    /// disabling this leaves every page in its own similarity cluster.
    pub save_body: bool,

    /// Worker-thread count for the dispatcher (default: logical CPUs)
    pub threads: usize,

    /// Polarity of the page-similarity cluster membership test.
    pub clustering_predicate: ClusteringPredicate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            out_dir: PathBuf::from("."),
            session_path: None,
            template_path: None,
            scan_timeout: 100,
            http_timeout: 15_000,
            proxy: None,
            save_body: true,
            threads: num_cpus::get(),
            clustering_predicate: ClusteringPredicate::Literal,
        }
    }
}

impl Config {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    pub fn report_only(&self) -> bool {
        self.session_path.is_some()
    }

    /// True when artifacts beyond the URL list and session file are disabled.
    pub fn out_dir_disabled(&self) -> bool {
        self.out_dir.as_os_str() == OUT_DIR_NONE
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if !self.report_only() && self.input.is_none() {
            return Err(ScanError::ConfigurationError(
                "an input file is required for a live run".to_string(),
            ));
        }
        if self.scan_timeout == 0 {
            return Err(ScanError::ConfigurationError(
                "scan timeout must be greater than 0".to_string(),
            ));
        }
        if self.http_timeout == 0 {
            return Err(ScanError::ConfigurationError(
                "HTTP timeout must be greater than 0".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(ScanError::ConfigurationError(
                "thread count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Membership test used when grouping pages by structural similarity.
///
/// `Literal` reproduces the historical behavior: a page joins the first
/// cluster in which every existing member scores *below* 0.80 against it.
/// `Fixed` inverts the comparison to the conventional "every member is at
/// least 0.80 similar".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringPredicate {
    Literal,
    Fixed,
}
