//! Change notifier.
//!
//! Fans a commit watermark out to every connected observer. Events carry no
//! payload: observers re-query the store for anything newer than the
//! watermark. Delivery is best-effort; there is no replay buffer, and an
//! observer that falls behind skips the events it missed.

use board_core::Timestamp;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per observer before it starts skipping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Identifier of one registered observer.
pub type SubscriberId = u64;

/// Publish/subscribe registry for commit watermarks.
pub struct ChangeNotifier {
    sender: broadcast::Sender<Timestamp>,

    /// Observers currently registered.
    registry: Arc<RwLock<HashSet<SubscriberId>>>,

    next_id: AtomicU64,

    /// Total notifications published.
    events_published: AtomicU64,

    capacity: usize,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            registry: Arc::new(RwLock::new(HashSet::new())),
            next_id: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Registers an observer. Dropping the returned handle unregisters it.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let receiver = self.sender.subscribe();

        if let Ok(mut registry) = self.registry.write() {
            registry.insert(id);
        }
        debug!(subscriber = id, "Observer subscribed");

        Subscription {
            id,
            receiver,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Broadcasts `watermark` to every registered observer, returning how
    /// many received it. With nobody listening the event is dropped.
    pub fn notify(&self, watermark: Timestamp) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(watermark) {
            Ok(receivers) => {
                debug!(watermark, receivers, "Change notified");
                receivers
            }
            Err(_) => {
                debug!(watermark, "Change dropped (no observers)");
                0
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Ids of the registered observers, ascending.
    #[must_use]
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<SubscriberId> = self
            .registry
            .read()
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered observer.
///
/// When dropped, the observer is removed from the registry.
pub struct Subscription {
    id: SubscriberId,
    receiver: broadcast::Receiver<Timestamp>,
    registry: Arc<RwLock<HashSet<SubscriberId>>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next watermark, or `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<Timestamp> {
        loop {
            match self.receiver.recv().await {
                Ok(watermark) => return Some(watermark),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(subscriber = self.id, skipped, "Observer lagged, events skipped");
                }
            }
        }
    }

    /// Next watermark if one is already queued.
    pub fn try_recv(&mut self) -> Option<Timestamp> {
        loop {
            match self.receiver.try_recv() {
                Ok(watermark) => return Some(watermark),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.write() {
            registry.remove(&self.id);
        }
        debug!(subscriber = self.id, "Observer unsubscribed");
    }
}
