//! In-process event bus
//!
//! Single typed publish/subscribe channel over `tokio::sync::broadcast`.
//! Every message is a `BusEvent` behind an `Arc`, so subscribers share one
//! immutable payload. Subscribers either take everything or filter by
//! `EventKind`.

use crate::correlation::VoteKickAttribution;
use crate::dispatch::EventSink;
use crate::models::{ConnectionState, DomainEvent, EventKind, PlayerKilled, PlayerRecord};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Default per-subscriber buffer
pub const DEFAULT_BUS_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BusEvent {
    /// Classified log line
    Log(DomainEvent),
    VoteKickAttributed(VoteKickAttribution),
    /// Derived from a friendly-fire player kill
    FriendlyFire(PlayerKilled),
    /// Full roster after an RCON snapshot was applied
    RosterUpdated(Vec<PlayerRecord>),
    ConnectionState(ConnectionState),
    /// Unsolicited RCON server message
    RconMessage(String),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::Log(event) => event.kind(),
            BusEvent::VoteKickAttributed(_) => EventKind::VoteKickAttributed,
            BusEvent::FriendlyFire(_) => EventKind::FriendlyFire,
            BusEvent::RosterUpdated(_) => EventKind::RosterUpdated,
            BusEvent::ConnectionState(_) => EventKind::ConnectionState,
            BusEvent::RconMessage(_) => EventKind::RconMessage,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<BusEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers. Returns how many will receive it.
    pub fn publish(&self, event: BusEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.sender.subscribe(),
            filter: None,
        }
    }

    /// Subscribe to a subset of event kinds
    pub fn subscribe_kinds(&self, kinds: &[EventKind]) -> EventSubscriber {
        EventSubscriber {
            rx: self.sender.subscribe(),
            filter: Some(kinds.iter().copied().collect()),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DomainEvent) {
        EventBus::publish(self, BusEvent::Log(event));
    }
}

pub struct EventSubscriber {
    rx: broadcast::Receiver<Arc<BusEvent>>,
    filter: Option<HashSet<EventKind>>,
}

impl EventSubscriber {
    fn wants(&self, event: &BusEvent) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind()))
    }

    /// Next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<BusEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<BusEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
