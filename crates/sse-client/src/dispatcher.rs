//! Subscriber registry and fan-out
//!
//! Each callback list is copy-on-write: delivery iterates a snapshot, so
//! `register` may be called from any thread at any time, including from
//! inside a callback that is currently being delivered.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::error::SseError;
use crate::event::ServerEvent;

/// Callback invoked for every dispatched event
pub type EventCallback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;
/// Callback invoked when the connection or a read fails
pub type ExceptionCallback = Arc<dyn Fn(&SseError) + Send + Sync>;
/// Callback invoked when a response body ends normally
pub type CompleteCallback = Arc<dyn Fn() + Send + Sync>;

/// A set of callbacks registered together
///
/// # Example
///
/// ```
/// use sse_client::Subscriber;
///
/// let subscriber = Subscriber::new(|event| println!("{}", event.data()))
///     .on_exception(|err| eprintln!("stream failed: {}", err))
///     .on_complete(|| println!("body ended"));
/// ```
#[derive(Clone)]
pub struct Subscriber {
    on_event: EventCallback,
    on_exception: Option<ExceptionCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Subscriber {
    pub fn new<F>(on_event: F) -> Self
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        Self {
            on_event: Arc::new(on_event),
            on_exception: None,
            on_complete: None,
        }
    }

    #[must_use]
    pub fn on_exception<F>(mut self, on_exception: F) -> Self
    where
        F: Fn(&SseError) + Send + Sync + 'static,
    {
        self.on_exception = Some(Arc::new(on_exception));
        self
    }

    #[must_use]
    pub fn on_complete<F>(mut self, on_complete: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(on_complete));
        self
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("on_exception", &self.on_exception.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Append-only callback list with snapshot reads
struct CallbackList<T> {
    inner: RwLock<Arc<Vec<T>>>,
}

impl<T: Clone> CallbackList<T> {
    fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn push(&self, item: T) {
        let mut guard = self.inner.write();
        let mut items = Vec::with_capacity(guard.len() + 1);
        items.extend(guard.iter().cloned());
        items.push(item);
        *guard = Arc::new(items);
    }

    fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.inner.read())
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }
}

/// Holds the three subscriber collections and delivers notifications
pub struct Dispatcher {
    events: CallbackList<EventCallback>,
    exceptions: CallbackList<ExceptionCallback>,
    completions: CallbackList<CompleteCallback>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            events: CallbackList::new(),
            exceptions: CallbackList::new(),
            completions: CallbackList::new(),
        }
    }

    /// Append a subscriber's callbacks to their collections
    ///
    /// Past events are not replayed.
    pub fn register(&self, subscriber: Subscriber) {
        self.events.push(subscriber.on_event);
        if let Some(on_exception) = subscriber.on_exception {
            self.exceptions.push(on_exception);
        }
        if let Some(on_complete) = subscriber.on_complete {
            self.completions.push(on_complete);
        }
    }

    /// Number of registered event callbacks
    pub fn subscriber_count(&self) -> usize {
        self.events.len()
    }

    /// Deliver `event` to every event callback in registration order
    pub fn on_event(&self, event: &ServerEvent) {
        for (index, callback) in self.events.snapshot().iter().enumerate() {
            guarded("event", index, || callback(event));
        }
    }

    /// Deliver `error` to every exception callback in registration order
    pub fn on_exception(&self, err: &SseError) {
        for (index, callback) in self.exceptions.snapshot().iter().enumerate() {
            guarded("exception", index, || callback(err));
        }
    }

    /// Notify every completion callback in registration order
    pub fn on_complete(&self) {
        for (index, callback) in self.completions.snapshot().iter().enumerate() {
            guarded("complete", index, || callback());
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.events.len())
            .field("exceptions", &self.exceptions.len())
            .field("completions", &self.completions.len())
            .finish()
    }
}

/// Run one callback, keeping a panic from reaching the other subscribers
fn guarded(kind: &'static str, index: usize, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(kind, subscriber = index, "SSE subscriber callback panicked");
    }
}
