//! Observer registry fanning coordinator events out to connected clients.
//!
//! The bus knows nothing about transports: each observer is a bounded channel and the
//! connection handler owning the [`EventStream`] pumps it into whatever socket it has. An
//! observer whose queue is full is dropped rather than buffered without limit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use swarmboard_core::metrics::{CONNECTED_OBSERVERS, EVENTS_BROADCAST};
use swarmboard_core::DashboardEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

/// Identifier handed out by [`EventBus::subscribe`].
pub type ObserverId = u64;

/// Events queued per observer before it counts as lagging.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// In-memory registry of observers.
pub struct EventBus {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            capacity: DEFAULT_OBSERVER_CAPACITY,
        }
    }
}

/// Receiving side of one observer registration.
///
/// Dropping the stream unregisters the observer.
pub struct EventStream {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<str>>,
    bus: Weak<EventBus>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bus whose observers may queue at most `capacity` undelivered events.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            ..Self::default()
        })
    }

    /// Registers a new observer.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        let count = {
            let mut observers = self.observers.lock();
            observers.insert(id, tx);
            observers.len()
        };
        CONNECTED_OBSERVERS.set(count as i64);
        debug!(observer_id = id, observers = count, "observer subscribed");

        EventStream {
            id,
            rx,
            bus: Arc::downgrade(self),
        }
    }

    /// Removes an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let (removed, count) = {
            let mut observers = self.observers.lock();
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            CONNECTED_OBSERVERS.set(count as i64);
            debug!(observer_id = id, observers = count, "observer unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every registered observer and returns how many received it.
    ///
    /// Observers whose receiving side is gone, or whose queue is full, are dropped from the
    /// registry; a dropped observer's stream ends after its queued events. Delivery is
    /// serialized under the registry lock, so each observer sees events in emission order.
    pub fn broadcast(&self, event: &DashboardEvent) -> usize {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(event = event.kind(), "Failed to serialize event: {}", e);
                return 0;
            }
        };

        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|id, tx| match tx.try_send(Arc::clone(&payload)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(observer_id = *id, "observer lagging, disconnecting");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        let delivered = observers.len();
        if delivered != before {
            CONNECTED_OBSERVERS.set(delivered as i64);
            debug!(dropped = before - delivered, "removed closed observers");
        }
        drop(observers);

        EVENTS_BROADCAST.with_label_values(&[event.kind()]).inc();
        delivered
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl EventStream {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next JSON-encoded event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Next already-queued event, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmboard_core::RunId;

    fn started(id: i64) -> DashboardEvent {
        DashboardEvent::RunStarted {
            test_id: RunId::new(id),
            name: format!("run-{id}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_observer_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.broadcast(&started(1)), 2);
        assert_eq!(bus.broadcast(&started(2)), 2);

        for stream in [&mut a, &mut b] {
            let first: serde_json::Value =
                serde_json::from_str(&stream.recv().await.unwrap()).unwrap();
            let second: serde_json::Value =
                serde_json::from_str(&stream.recv().await.unwrap()).unwrap();
            assert_eq!(first["testId"], 1);
            assert_eq!(second["testId"], 2);
        }
    }

    #[tokio::test]
    async fn dropped_stream_is_unregistered() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.observer_count(), 2);

        drop(a);
        assert_eq!(bus.observer_count(), 1);

        assert_eq!(bus.broadcast(&started(1)), 1);
        assert!(b.recv().await.is_some());
    }

    #[test]
    fn closed_receiver_is_skipped_without_aborting_delivery() {
        let bus = EventBus::new();
        let mut healthy = bus.subscribe();

        // Register a target whose receiver is already gone.
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        bus.observers.lock().insert(u64::MAX, tx);
        assert_eq!(bus.observer_count(), 2);

        assert_eq!(bus.broadcast(&started(3)), 1);
        assert_eq!(bus.observer_count(), 1);
        assert!(healthy.try_recv().is_some());
    }

    #[tokio::test]
    async fn lagging_observer_is_dropped_after_its_queue_fills() {
        let bus = EventBus::with_capacity(2);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        assert_eq!(bus.broadcast(&started(1)), 2);
        assert!(fast.recv().await.is_some());
        assert_eq!(bus.broadcast(&started(2)), 2);
        assert!(fast.recv().await.is_some());

        // `slow` has two events queued and cannot take a third.
        assert_eq!(bus.broadcast(&started(3)), 1);
        assert_eq!(bus.observer_count(), 1);

        let third: serde_json::Value =
            serde_json::from_str(&fast.recv().await.unwrap()).unwrap();
        assert_eq!(third["testId"], 3);

        // The dropped observer drains what it had, then its stream ends.
        assert!(slow.recv().await.is_some());
        assert!(slow.recv().await.is_some());
        assert!(slow.recv().await.is_none());
    }

    #[test]
    fn unsubscribe_unknown_observer() {
        let bus = EventBus::new();
        assert!(!bus.unsubscribe(42));
    }
}
