//! Topic-routed asynchronous publish/subscribe.
//!
//! Every publication fans out to the topic's subscribers, each invocation
//! running on its own tokio task. `wait_async` acts as a drain barrier: it
//! returns only once every invocation enqueued before or during the wait has
//! finished, which the driver relies on for two-phase shutdown.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{Mutex, Notify};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SessionStart,
    Host,
    TcpPort,
    Url,
    UrlResponsive,
    SessionEnd,
}

/// A publication with its payload. The payload shape is fixed per topic.
#[derive(Debug, Clone)]
pub enum Event {
    SessionStart,
    Host(String),
    TcpPort(u16, String),
    Url(String, bool),
    UrlResponsive(String),
    SessionEnd,
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::SessionStart => Topic::SessionStart,
            Event::Host(_) => Topic::Host,
            Event::TcpPort(_, _) => Topic::TcpPort,
            Event::Url(_, _) => Topic::Url,
            Event::UrlResponsive(_) => Topic::UrlResponsive,
            Event::SessionEnd => Topic::SessionEnd,
        }
    }
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

struct Subscriber {
    handler: Handler,
    // Present for transactional handlers: at most one invocation in flight.
    serial: Option<Arc<Mutex<()>>>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    fn enqueued(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn finished(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Topic, Vec<Subscriber>>>,
    in_flight: Arc<InFlight>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler invoked asynchronously on every publication of
    /// `topic`. With `transactional` set, invocations of this handler are
    /// serialized; otherwise they may run fully concurrently.
    pub fn subscribe_async<F, Fut>(&self, topic: Topic, handler: F, transactional: bool)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| handler(event).boxed());
        let subscriber = Subscriber {
            handler,
            serial: transactional.then(|| Arc::new(Mutex::new(()))),
        };
        self.subscribers
            .write()
            .expect("subscriber table poisoned")
            .entry(topic)
            .or_default()
            .push(subscriber);
    }

    /// Enqueue one invocation per subscriber and return immediately.
    /// A panicking handler is contained and logged; it never takes other
    /// subscribers or the bus down with it.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        let subscribers = self.subscribers.read().expect("subscriber table poisoned");
        let Some(list) = subscribers.get(&topic) else {
            return;
        };

        for subscriber in list {
            self.in_flight.enqueued();
            let handler = subscriber.handler.clone();
            let serial = subscriber.serial.clone();
            let in_flight = self.in_flight.clone();
            let event = event.clone();

            tokio::spawn(async move {
                let _guard = match serial {
                    Some(lock) => Some(lock.lock_owned().await),
                    None => None,
                };
                let invocation = AssertUnwindSafe(async move { handler(event).await });
                if invocation.catch_unwind().await.is_err() {
                    error!("Handler for {:?} panicked", topic);
                }
                in_flight.finished();
            });
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Block until every invocation enqueued up to now has returned.
    /// Publications enqueued while waiting are drained too.
    pub async fn wait_async(&self) {
        loop {
            let notified = self.in_flight.notify.notified();
            if self.in_flight.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
