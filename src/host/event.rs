//! Host lifecycle notifications
//!
//! An explicit subscription object replaces process-wide callbacks: each
//! store holds its own `Subscription`, and dropping it unsubscribes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{UnitHandle, UnitId};

/// A lifecycle notification from the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The environment finished loading (fires once)
    Ready,

    /// A unit was loaded or created
    UnitAppeared(UnitHandle),

    /// A unit was destroyed or unloaded
    UnitVanished(UnitId),
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<HostEvent>>,
}

/// Fan-out of host events to subscribers, in publish order
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&self, event: HostEvent) {
        let mut inner = self.inner.lock();
        // Receivers dropped without going through Drop (e.g. leaked) are pruned here
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// A store's handle on the event stream
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<HostEvent>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Wait for the next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<HostEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<HostEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().subscribers.remove(&self.id);
        }
    }
}
