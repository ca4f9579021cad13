use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::shared::emotion::EmotionReading;
use crate::state::emotion_state_store::EmotionStateStore;

pub type SubscriberId = u64;

/// Fans readings out to every registered subscriber.
///
/// Readings go through one bounded ring shared by all subscribers. A
/// subscriber that falls more than `queue_capacity` readings behind skips to
/// the oldest one still held, so `publish` never blocks on a slow consumer.
/// The ring size is rounded up to the next power of two.
pub struct Broadcaster {
    store: Arc<EmotionStateStore>,
    sender: broadcast::Sender<EmotionReading>,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, Arc<AtomicBool>>>,
}

/// Receiving end of one subscription. Dropping it ends the subscription; the
/// broadcaster forgets it on its next publish.
///
/// `recv` is async and suits socket tasks; `blocking_recv` is for plain
/// threads and must not be called from inside a runtime.
pub struct SubscriberHandle {
    id: SubscriberId,
    snapshot: Option<EmotionReading>,
    rx: broadcast::Receiver<EmotionReading>,
    alive: Arc<AtomicBool>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next reading. `None` once unsubscribed or once the
    /// broadcaster is gone.
    pub async fn recv(&mut self) -> Option<EmotionReading> {
        if let Some(snapshot) = self.take_snapshot() {
            return Some(snapshot);
        }
        while self.is_alive() {
            match self.rx.recv().await {
                Ok(reading) => return self.is_alive().then_some(reading),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
        None
    }

    pub fn try_recv(&mut self) -> Option<EmotionReading> {
        if let Some(snapshot) = self.take_snapshot() {
            return Some(snapshot);
        }
        while self.is_alive() {
            match self.rx.try_recv() {
                Ok(reading) => return Some(reading),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
        None
    }

    /// Thread-blocking variant of [`recv`](Self::recv).
    pub fn blocking_recv(&mut self) -> Option<EmotionReading> {
        if let Some(snapshot) = self.take_snapshot() {
            return Some(snapshot);
        }
        while self.is_alive() {
            match self.rx.blocking_recv() {
                Ok(reading) => return self.is_alive().then_some(reading),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
        None
    }

    fn take_snapshot(&mut self) -> Option<EmotionReading> {
        if !self.is_alive() {
            return None;
        }
        self.snapshot.take()
    }

    fn lagged(&self, skipped: u64) {
        log::debug!("Subscriber {} skipped {skipped} stale readings", self.id);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Broadcaster {
    pub fn new(store: Arc<EmotionStateStore>, queue_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(queue_capacity.max(1));
        Self {
            store,
            sender,
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a subscriber whose first reading is the current snapshot.
    ///
    /// The snapshot is read and the receiver attached while the subscriber
    /// set is locked, so a concurrent publish lands either before it (and is
    /// the snapshot) or after it (and is delivered behind it).
    pub fn subscribe(&self) -> SubscriberHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(AtomicBool::new(true));

        let mut subscribers = self.lock();
        let snapshot = self.store.get();
        let rx = self.sender.subscribe();
        subscribers.insert(id, alive.clone());
        drop(subscribers);

        log::debug!("Subscriber {id} joined");
        SubscriberHandle {
            id,
            snapshot: Some(snapshot),
            rx,
            alive,
        }
    }

    /// Removes a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Some(alive) = self.lock().remove(&id) {
            alive.store(false, Ordering::Release);
            log::debug!("Subscriber {id} left");
        }
    }

    /// Delivers `reading` to every live subscriber and returns how many there
    /// are.
    pub fn publish(&self, reading: EmotionReading) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|_, alive| alive.load(Ordering::Acquire));
        // Fails only when no receiver exists; nothing to deliver then.
        let _ = self.sender.send(reading);
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|alive| alive.load(Ordering::Acquire))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, Arc<AtomicBool>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
