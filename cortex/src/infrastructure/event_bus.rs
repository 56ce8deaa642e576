// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Cortex Events
//
// In-memory streaming over a tokio broadcast channel. Events are lost on
// restart and dropped when nobody is subscribed.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{CortexEvent, Result};

/// Event bus trait for publishing domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CortexEvent) -> Result<()>;
}

/// Publish and log instead of failing the caller.
pub(crate) async fn publish_or_warn(bus: &dyn EventBus, event: CortexEvent) {
    let event_type = event.event_type();
    if let Err(e) = bus.publish(event).await {
        warn!(event_type, "Failed to publish cortex event: {}", e);
    }
}

/// Event bus backed by a broadcast channel
#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: Arc<broadcast::Sender<CortexEvent>>,
}

impl BroadcastEventBus {
    /// Capacity is how many events a slow subscriber may lag behind
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CortexEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: CortexEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "Publishing event");

        // send() only fails when there are no receivers
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

#[async_trait]
impl EventBus for NoopEventBus {
    async fn publish(&self, _event: CortexEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = BroadcastEventBus::new(16);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(CortexEvent::DocumentIndexed {
            document_id: "note-1".to_string(),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "document_indexed");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = BroadcastEventBus::default();
        let result = bus
            .publish(CortexEvent::LinksStrengthened {
                count: 0,
                timestamp: Utc::now(),
            })
            .await;
        assert!(result.is_ok());
    }
}
