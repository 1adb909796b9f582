//! In-page event bus: publish/subscribe by topic name, same-tab only.
//!
//! Mutating components broadcast here; every observer registers explicitly
//! and receives a disposer, so teardown is deterministic. Two subscription
//! flavors exist: synchronous callbacks and bounded streams. Stream
//! subscribers that lag behind drop intermediate payloads instead of ever
//! blocking the publisher.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures_channel::mpsc;
use futures_util::stream::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;

/// Buffer size for `stream()` subscribers. Enough for bursts of cart
/// mutations between two event-loop turns; beyond that the subscriber is
/// lagging and newer payloads are dropped.
const STREAM_SUBSCRIBER_CAPACITY: usize = 32;

// --- SubscriberId ---

/// Identity of one registered subscriber within its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

// --- TopicSender ---

/// Bounded sender feeding one stream subscriber.
///
/// Publishes are fire-and-forget: a full buffer drops the payload (and logs
/// it with the `debug-bus` feature) rather than blocking the mutator.
struct TopicSender {
    inner: mpsc::Sender<Value>,
    topic: Rc<str>,
    capacity: usize,
}

impl Clone for TopicSender {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            topic: Rc::clone(&self.topic),
            capacity: self.capacity,
        }
    }
}

impl TopicSender {
    fn send_or_drop(&mut self, value: Value) {
        if self.inner.try_send(value).is_err() {
            #[cfg(feature = "debug-bus")]
            eprintln!(
                "[BUS DROP] '{}' subscriber lagging (capacity: {})",
                self.topic, self.capacity
            );
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

// --- Sink ---

enum Sink {
    Callback(Rc<RefCell<dyn FnMut(&Value)>>),
    Channel(TopicSender),
}

impl Clone for Sink {
    fn clone(&self) -> Self {
        match self {
            Sink::Callback(callback) => Sink::Callback(Rc::clone(callback)),
            Sink::Channel(sender) => Sink::Channel(sender.clone()),
        }
    }
}

// --- EventBus ---

struct BusInner {
    topics: HashMap<String, SmallVec<[(SubscriberId, Sink); 4]>>,
    next_id: u64,
}

/// Publish/subscribe hub shared by everything mounted in one tab.
///
/// Cheap to clone: clones share the subscriber table.
///
/// # Usage
/// ```ignore
/// let bus = EventBus::new();
/// let _subscription = bus.subscribe("cartUpdated", |snapshot| { ... });
/// bus.publish("cartUpdated", &payload);
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                topics: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a synchronous observer for `topic`.
    ///
    /// The callback runs inside `publish`, in registration order. Dropping
    /// the returned [`Subscription`] removes the observer.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        callback: impl FnMut(&Value) + 'static,
    ) -> Subscription {
        self.register(topic.into(), Sink::Callback(Rc::new(RefCell::new(callback))))
    }

    /// Register a stream observer for `topic` with the default buffer.
    pub fn stream(&self, topic: impl Into<String>) -> EventStream {
        self.stream_with_capacity(topic, STREAM_SUBSCRIBER_CAPACITY)
    }

    /// Register a stream observer with an explicit buffer capacity.
    ///
    /// When the buffer is full, newer payloads for this subscriber are
    /// dropped; the publisher never blocks.
    pub fn stream_with_capacity(&self, topic: impl Into<String>, capacity: usize) -> EventStream {
        let topic = topic.into();
        let (sender, receiver) = mpsc::channel(capacity);
        let subscription = self.register(
            topic.clone(),
            Sink::Channel(TopicSender {
                inner: sender,
                topic: Rc::from(topic),
                capacity,
            }),
        );
        EventStream {
            receiver,
            _subscription: subscription,
        }
    }

    /// Broadcast `payload` to every subscriber of `topic`.
    ///
    /// Safe to call from inside a callback: the subscriber table is
    /// snapshotted before delivery, so subscribing or publishing reentrantly
    /// never deadlocks. A subscriber disposed by another callback during the
    /// same broadcast may still observe this broadcast once.
    pub fn publish(&self, topic: &str, payload: &Value) {
        let sinks: SmallVec<[(SubscriberId, Sink); 4]> = match self.inner.borrow().topics.get(topic)
        {
            Some(subscribers) => subscribers.clone(),
            None => return,
        };

        for (_id, sink) in sinks {
            match sink {
                Sink::Callback(callback) => (callback.borrow_mut())(payload),
                Sink::Channel(mut sender) => {
                    // A subscriber disposed earlier in this same broadcast
                    // leaves a closed clone behind; skip it silently.
                    if !sender.is_closed() {
                        sender.send_or_drop(payload.clone());
                    }
                }
            }
        }
    }

    /// Number of live subscribers for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .borrow()
            .topics
            .get(topic)
            .map_or(0, SmallVec::len)
    }

    fn register(&self, topic: String, sink: Sink) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.topics.entry(topic.clone()).or_default().push((id, sink));
        Subscription {
            bus: Rc::downgrade(&self.inner),
            topic,
            id,
        }
    }
}

// --- Subscription ---

/// Disposer for one bus subscription.
///
/// Dropping it removes the subscriber; dropping after the bus itself is gone
/// is a no-op.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    bus: Weak<RefCell<BusInner>>,
    topic: String,
    id: SubscriberId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        if let Some(subscribers) = inner.topics.get_mut(&self.topic) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                inner.topics.remove(&self.topic);
            }
        }
    }
}

// --- EventStream ---

/// Stream of raw payloads for one topic.
///
/// Dropping the stream disposes the subscription.
#[pin_project::pin_project]
pub struct EventStream {
    #[pin]
    receiver: mpsc::Receiver<Value>,
    _subscription: Subscription,
}

impl Stream for EventStream {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().receiver.poll_next(cx)
    }
}

// --- Decoded ---

/// Typed view over an [`EventStream`].
///
/// Payloads that fail to decode as `T` are skipped, so one malformed
/// broadcast cannot wedge a typed observer.
#[pin_project::pin_project]
pub struct Decoded<T> {
    #[pin]
    inner: EventStream,
    _marker: PhantomData<T>,
}

impl<T> Decoded<T> {
    pub fn new(inner: EventStream) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Stream for Decoded<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(payload)) => match serde_json::from_value(payload) {
                    Ok(decoded) => return Poll::Ready(Some(decoded)),
                    Err(_error) => {
                        #[cfg(feature = "debug-bus")]
                        eprintln!("[BUS] skipping payload that failed to decode: {_error}");
                    }
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
