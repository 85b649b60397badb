use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Identity of the window that posted a message (`event.source`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

static NEXT_SOURCE: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    pub fn fresh() -> Self {
        SourceId(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
    }
}

/// One delivered post.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub source: SourceId,
    pub data: Value,
}

/// A page window's post-message channel.
///
/// Every live [`Subscription`] receives every post, in order. Cloning the bus
/// shares the same window.
#[derive(Clone, Debug)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    origin: SourceId,
    next_listener: AtomicU64,
    next_request: AtomicU64,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<PostedMessage>>>,
    // page script readiness flag, set once per window
    client_ready: AtomicBool,
    // single correlation slot for tokenless relays
    relay_in_flight: AtomicBool,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                origin: SourceId::fresh(),
                next_listener: AtomicU64::new(0),
                next_request: AtomicU64::new(1),
                listeners: Mutex::new(HashMap::new()),
                client_ready: AtomicBool::new(false),
                relay_in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// The window's own identity. Messages from any other source are foreign.
    pub fn origin(&self) -> SourceId {
        self.inner.origin
    }

    /// `window.postMessage(data)` from this window.
    pub fn post(&self, data: Value) {
        self.post_from(self.inner.origin, data);
    }

    /// Post as another frame/window would.
    pub fn post_from(&self, source: SourceId, data: Value) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|_, tx| {
            tx.send(PostedMessage {
                source,
                data: data.clone(),
            })
            .is_ok()
        });
    }

    /// Fresh correlation id for one relayed request.
    pub fn next_request_id(&self) -> u64 {
        self.inner.next_request.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        Subscription {
            id,
            bus: self.inner.clone(),
            rx,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Init-once flag for the page script. Returns `true` for exactly one
    /// caller per window.
    pub fn mark_client_ready(&self) -> bool {
        self.inner
            .client_ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_client_ready(&self) -> bool {
        self.inner.client_ready.load(Ordering::Acquire)
    }

    /// Claims the relay correlation slot. `None` while another relay owns it.
    pub(crate) fn claim_relay_slot(&self) -> Option<RelaySlot> {
        self.inner
            .relay_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RelaySlot {
                bus: self.inner.clone(),
            })
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered listener. Deregisters itself when dropped.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Arc<BusInner>,
    rx: mpsc::UnboundedReceiver<PostedMessage>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<PostedMessage> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Held for the duration of one relay round-trip.
#[derive(Debug)]
pub(crate) struct RelaySlot {
    bus: Arc<BusInner>,
}

impl Drop for RelaySlot {
    fn drop(&mut self) {
        self.bus.relay_in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_every_subscriber_sees_every_post() {
        let bus = MessageBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.post(json!({"n": 1}));
        bus.post(json!({"n": 2}));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().data["n"], 1);
            let second = sub.recv().await.unwrap();
            assert_eq!(second.data["n"], 2);
            assert_eq!(second.source, bus.origin());
        }
    }

    #[tokio::test]
    async fn test_drop_deregisters() {
        let bus = MessageBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.listener_count(), 1);
        drop(sub);
        assert_eq!(bus.listener_count(), 0);

        // posting to nobody is fine
        bus.post(json!({}));
    }

    #[test]
    fn test_foreign_source_is_distinct() {
        let bus = MessageBus::new();
        let other = SourceId::fresh();
        assert_ne!(bus.origin(), other);
        assert_eq!(bus.clone().origin(), bus.origin());
    }

    #[test]
    fn test_client_ready_only_once() {
        let bus = MessageBus::new();
        assert!(!bus.is_client_ready());
        assert!(bus.mark_client_ready());
        assert!(!bus.mark_client_ready());
        assert!(bus.is_client_ready());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let bus = MessageBus::new();
        let a = bus.next_request_id();
        let b = bus.clone().next_request_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_relay_slot_is_exclusive() {
        let bus = MessageBus::new();
        let slot = bus.claim_relay_slot();
        assert!(slot.is_some());
        assert!(bus.claim_relay_slot().is_none());
        drop(slot);
        assert!(bus.claim_relay_slot().is_some());
    }
}
