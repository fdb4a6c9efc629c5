use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counter for outstanding pipeline work, in the style of Go's
/// `sync.WaitGroup`. The session owns two: one for primary fan-out
/// (port probes, URL requests) and one for long-running secondary work
/// (screenshots), so shutdown can drain them in phases.
#[derive(Debug, Default)]
pub struct WaitGroup {
    count: AtomicUsize,
    notify: Notify,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn done(&self) {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "WaitGroup done() without matching add()");
        if previous == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until the counter reaches zero. Work added while waiting is
    /// also waited for.
    pub async fn wait(&self) {
        loop {
            // Register interest before the check so a done() racing with us
            // cannot be missed.
            let notified = self.notify.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let wg = WaitGroup::new();
        wg.wait().await;
    }

    #[tokio::test]
    async fn test_wait_blocks_until_done() {
        let wg = Arc::new(WaitGroup::new());

        for _ in 0..8 {
            wg.add();
            let wg = wg.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                wg.done();
            });
        }

        wg.wait().await;
        assert_eq!(wg.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_covers_work_added_during_wait() {
        let wg = Arc::new(WaitGroup::new());
        wg.add();

        {
            let wg = wg.clone();
            tokio::spawn(async move {
                // Cascade: finish the first unit but add another before
                // releasing it.
                wg.add();
                let wg2 = wg.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    wg2.done();
                });
                wg.done();
            });
        }

        wg.wait().await;
        assert_eq!(wg.count(), 0);
    }
}
