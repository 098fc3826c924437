//! Lifecycle event bus
//!
//! The queue and the execution engine publish lifecycle events here without
//! knowing who listens. Any number of subscribers (a websocket layer, a
//! persistence writer, tests) can attach and each receives every event.
//! Publishing never blocks and never fails; a subscriber that falls more than
//! `capacity` events behind skips the oldest ones.

use crate::execution::ExecutionEvent;
use crate::queue::QueueEvent;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Any event emitted by the core
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Queue(QueueEvent),
    Execution(ExecutionEvent),
}

impl From<QueueEvent> for LifecycleEvent {
    fn from(event: QueueEvent) -> Self {
        LifecycleEvent::Queue(event)
    }
}

impl From<ExecutionEvent> for LifecycleEvent {
    fn from(event: ExecutionEvent) -> Self {
        LifecycleEvent::Execution(event)
    }
}

/// Fire-and-forget broadcast of [`LifecycleEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: impl Into<LifecycleEvent>) {
        // No subscribers is not an error
        let _ = self.tx.send(event.into());
    }

    /// Attach a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
