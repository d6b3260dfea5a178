// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Capsule Events
//
// In-memory fan-out of lifecycle events using tokio broadcast channels.
// Publishing never blocks and never fails; events with no subscriber are dropped.

use crate::domain::capsule::CapsuleId;
use crate::domain::events::CapsuleEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to capsule events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CapsuleEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a capsule event to all subscribers
    pub fn publish_capsule_event(&self, event: CapsuleEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all capsule events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single capsule
    pub fn subscribe_capsule(&self, capsule_id: CapsuleId) -> CapsuleEventReceiver {
        CapsuleEventReceiver {
            receiver: self.sender.subscribe(),
            capsule_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all capsule events
pub struct EventReceiver {
    receiver: broadcast::Receiver<CapsuleEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<CapsuleEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<CapsuleEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one capsule id
pub struct CapsuleEventReceiver {
    receiver: broadcast::Receiver<CapsuleEvent>,
    capsule_id: CapsuleId,
}

impl CapsuleEventReceiver {
    pub async fn recv(&mut self) -> Result<CapsuleEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.capsule_id() == &self.capsule_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capsule::InstanceIdentity;
    use crate::domain::provisioning::StrategyKind;
    use chrono::Utc;

    fn provisioned(id: &str) -> CapsuleEvent {
        CapsuleEvent::CapsuleProvisioned {
            capsule_id: CapsuleId::from_raw(id),
            identity: InstanceIdentity::new("i1", "c1"),
            capsule_path: format!("/data/capsules/c1/{}", id),
            strategy: StrategyKind::Link,
            provisioned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_capsule_event(provisioned("abc"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.capsule_id().as_str(), "abc");
        assert!(matches!(received, CapsuleEvent::CapsuleProvisioned { .. }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let event_bus = EventBus::with_default_capacity();
        assert_eq!(event_bus.subscriber_count(), 0);
        event_bus.publish_capsule_event(provisioned("abc"));
    }

    #[tokio::test]
    async fn test_capsule_filter() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_capsule(CapsuleId::from_raw("wanted"));

        event_bus.publish_capsule_event(provisioned("other"));
        event_bus.publish_capsule_event(provisioned("wanted"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.capsule_id().as_str(), "wanted");
    }

    #[test]
    fn test_try_recv_empty() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
