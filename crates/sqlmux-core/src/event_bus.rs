//! Event Bus - fan-out of connection lifecycle events
//!
//! The connection manager emits every [`DomainEvent`] through a single
//! broadcast channel. Presentation code (editors, dashboards, the object
//! explorer) subscribes and picks the events it cares about.
//!
//! A single sender feeds the channel, so events for one URI are received in
//! the order they were emitted.
//!
//! # Usage
//!
//! ```ignore
//! let bus = EventBus::new();
//! let sender = bus.sender();
//! let mut editor_events = bus.subscribe();
//!
//! sender.emit(DomainEvent::ConnectStarted { uri: uri.clone() });
//!
//! while let Some(event) = editor_events.recv_for_uri(&uri).await { ... }
//! ```

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::DomainEvent;

/// Default channel capacity for the event bus
const DEFAULT_CAPACITY: usize = 256;

/// Event Bus - central hub for connection events
///
/// Each subscriber gets its own copy of every event emitted after it
/// subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a sender for emitting events
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event Sender - cheaply cloneable handle used by the manager
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventSender {
    /// Emit a domain event
    ///
    /// Returns the number of receivers; 0 when nobody is listening.
    pub fn emit(&self, event: DomainEvent) -> usize {
        let type_name = event.type_name();
        let uri = event.uri().map(str::to_string);
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    uri = ?uri,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                debug!(
                    event_type = type_name,
                    uri = ?uri,
                    "[EventBus] No receivers for event"
                );
                0
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event Receiver - one subscriber's view of the bus
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event
    ///
    /// Returns `None` once the channel is closed. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    /// Receive the next event scoped to `uri`, skipping everything else
    pub async fn recv_for_uri(&mut self, uri: &str) -> Option<DomainEvent> {
        loop {
            let event = self.recv().await?;
            if event.uri() == Some(uri) {
                return Some(event);
            }
        }
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped_events = skipped, "[EventBus] Receiver lagged on try_recv");
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<DomainEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
