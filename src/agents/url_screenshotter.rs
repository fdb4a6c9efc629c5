//! Screenshot agent. The actual capture is behind the
//! [`ScreenshotCapturer`] seam; the agent owns the pipeline bookkeeping:
//! the `wait_group2` tracking, the stats counters and the page record path.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info};

use crate::agents::Agent;
use crate::bus::{Event, Topic};
use crate::error::ScanError;
use crate::session::Session;
use crate::utils;

const AGENT_ID: &str = "agent:url_screenshotter";

#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    /// Render `url` and write the image to `destination`.
    async fn capture(&self, url: &str, destination: &Path) -> Result<(), ScanError>;
}

/// Default capturer: shells out to a headless Chromium-compatible binary.
pub struct CommandCapturer {
    binary: String,
    capture_timeout: Duration,
}

impl CommandCapturer {
    pub fn new(binary: impl Into<String>, capture_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            capture_timeout,
        }
    }
}

impl Default for CommandCapturer {
    fn default() -> Self {
        Self::new("chromium", Duration::from_secs(30))
    }
}

#[async_trait]
impl ScreenshotCapturer for CommandCapturer {
    async fn capture(&self, url: &str, destination: &Path) -> Result<(), ScanError> {
        let output = timeout(
            self.capture_timeout,
            Command::new(&self.binary)
                .arg("--headless")
                .arg("--disable-gpu")
                .arg("--no-sandbox")
                .arg("--ignore-certificate-errors")
                .arg("--window-size=1440,900")
                .arg(format!("--screenshot={}", destination.display()))
                .arg(url)
                .output(),
        )
        .await
        .map_err(|_| ScanError::CaptureFailed(format!("{url}: renderer timed out")))?
        .map_err(|err| ScanError::CaptureFailed(format!("{}: {err}", self.binary)))?;

        if !output.status.success() {
            return Err(ScanError::CaptureFailed(format!(
                "{url}: renderer exited with {}",
                output.status
            )));
        }
        if !destination.exists() {
            return Err(ScanError::CaptureFailed(format!(
                "{url}: renderer wrote no image"
            )));
        }
        Ok(())
    }
}

pub struct UrlScreenshotter {
    capturer: Arc<dyn ScreenshotCapturer>,
}

impl UrlScreenshotter {
    pub fn new(capturer: Arc<dyn ScreenshotCapturer>) -> Self {
        Self { capturer }
    }
}

impl Agent for UrlScreenshotter {
    fn id(&self) -> &'static str {
        AGENT_ID
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), ScanError> {
        let sess = session.clone();
        let capturer = self.capturer.clone();
        session.event_bus.subscribe_async(
            Topic::Url,
            move |event| {
                let session = sess.clone();
                let capturer = capturer.clone();
                async move {
                    let Event::Url(url, true) = event else { return };
                    // Screenshots drain on the secondary wait group so the
                    // driver can flush request cascades first.
                    session.wait_group2.add();
                    let sess = session.clone();
                    tokio::spawn(async move {
                        screenshot(&sess, capturer.as_ref(), &url).await;
                        sess.wait_group2.done();
                    });
                }
            },
            false,
        );
        Ok(())
    }
}

async fn screenshot(session: &Arc<Session>, capturer: &dyn ScreenshotCapturer, url: &str) {
    let Some(slug) = utils::base_filename(url) else {
        return;
    };
    let relative = format!("screenshots/{slug}.png");
    let destination = session.get_file_path(&relative);

    match capturer.capture(url, &destination).await {
        Ok(()) => {
            session.stats.increment_screenshot_successful();
            info!("{url}: screenshot successful");
            if let Some(page) = session.get_page(url) {
                page.lock().expect("page lock poisoned").screenshot_path = relative;
            }
        }
        Err(err) => {
            session.stats.increment_screenshot_failed();
            error!("{url}: screenshot failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCapturer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ScreenshotCapturer for FakeCapturer {
        async fn capture(&self, _url: &str, destination: &Path) -> Result<(), ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ScanError::CaptureFailed("boom".to_string()));
            }
            tokio::fs::write(destination, b"png").await?;
            Ok(())
        }
    }

    fn test_session() -> Arc<Session> {
        let dir = tempfile::tempdir().expect("tempdir");
        Session::new(Config {
            input: Some(PathBuf::from("targets.txt")),
            out_dir: dir.keep(),
            ..Default::default()
        })
        .expect("session")
    }

    #[tokio::test]
    async fn test_screenshot_success_updates_stats_and_page() {
        let session = test_session();
        let page = session.add_page("https://example.com/").unwrap();
        let capturer = FakeCapturer {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        screenshot(&session, &capturer, "https://example.com/").await;

        assert_eq!(capturer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.stats.snapshot().screenshot_successful, 1);
        assert_eq!(
            page.lock().unwrap().screenshot_path,
            "screenshots/https__example_com__443.png"
        );
        assert!(session
            .get_file_path("screenshots/https__example_com__443.png")
            .exists());
    }

    #[tokio::test]
    async fn test_screenshot_failure_only_counts() {
        let session = test_session();
        session.add_page("https://example.com/").unwrap();
        let capturer = FakeCapturer {
            calls: AtomicUsize::new(0),
            fail: true,
        };

        screenshot(&session, &capturer, "https://example.com/").await;

        let stats = session.stats.snapshot();
        assert_eq!(stats.screenshot_successful, 0);
        assert_eq!(stats.screenshot_failed, 1);
        assert!(session
            .get_page("https://example.com/")
            .unwrap()
            .lock()
            .unwrap()
            .screenshot_path
            .is_empty());
    }
}
