use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::message::LifecycleMessage;

/// Default length of each observer's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A broadcast payload, shared between all observer queues.
pub type Payload = Arc<[u8]>;

/// Identifier handed out on attach.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving side of one attached observer.
///
/// Dropping it closes the queue; the hub prunes closed queues on the next
/// broadcast, so an explicit `detach` is optional.
pub struct Observer {
    id: ObserverId,
    rx: mpsc::Receiver<Payload>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next payload. `None` once the hub has detached us.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Take a queued payload without waiting.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of one broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers whose queue accepted the payload.
    pub delivered: usize,
    /// Observers whose queue was full; the payload was dropped for them.
    pub dropped: usize,
}

/// Fan-out hub for live observers.
///
/// The observer registry sits behind a single lock. Broadcast only takes the
/// read side and pushes into bounded per-observer queues with `try_send`, so
/// it never waits on a slow or dead consumer: a full queue loses that one
/// message for that one observer. Broadcasting with nobody attached is a no-op.
pub struct Hub {
    observers: RwLock<HashMap<ObserverId, mpsc::Sender<Payload>>>,
    queue_capacity: usize,
}

impl Hub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new observer.
    pub fn attach(&self) -> Observer {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = ObserverId::new();
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!(observer = %id, "Observer attached");
        Observer { id, rx }
    }

    /// Unregister an observer. Returns false if it was not attached.
    pub fn detach(&self, id: ObserverId) -> bool {
        let removed = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(observer = %id, "Observer detached");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Push a payload to every currently attached observer.
    pub fn broadcast(&self, payload: impl Into<Payload>) -> BroadcastReport {
        let payload = payload.into();
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();

        {
            let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
            for (id, tx) in observers.iter() {
                match tx.try_send(payload.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(observer = %id, "Observer queue full, dropping message");
                        report.dropped += 1;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
            for id in closed {
                observers.remove(&id);
                debug!(observer = %id, "Pruned closed observer");
            }
        }

        report
    }

    /// Encode a lifecycle message and broadcast it.
    pub fn publish(&self, message: &LifecycleMessage) -> Result<BroadcastReport> {
        let bytes = message.encode()?;
        Ok(self.broadcast(bytes))
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
