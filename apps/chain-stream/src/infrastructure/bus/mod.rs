//! Event Bus
//!
//! Fan-out of published blocks to every stream subscriber over a tokio
//! broadcast channel. Every subscriber sees every message in publish order.
//! Publishing never waits: a subscriber that falls more than the channel
//! capacity behind observes a lag on its next receive and is expected to
//! disconnect.
//!
//! The bus can be started and stopped. Stopping drops the sender, which
//! closes every subscription.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::buffer::ResponseBuffer;
use crate::infrastructure::metrics;

/// Default per-subscriber buffer depth.
pub const DEFAULT_BUS_CAPACITY: usize = 100;

// =============================================================================
// Messages
// =============================================================================

/// Message carried by the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A completed block, read-only from here on.
    Block(Arc<ResponseBuffer>),
    /// A pipeline error every subscriber must surface.
    Error(String),
}

/// Bus errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// `start` on a running bus.
    #[error("event bus already started")]
    AlreadyStarted,

    /// Operation on a stopped bus.
    #[error("event bus is not running")]
    NotRunning,

    /// A client ID is subscribed twice.
    #[error("client {client_id} already subscribed")]
    AlreadySubscribed {
        /// Client ID.
        client_id: String,
    },
}

/// Outcome of a receive on a [`BusSubscription`].
#[derive(Debug)]
pub enum BusEvent {
    /// Next message.
    Message(BusMessage),
    /// The subscriber fell behind and `skipped` messages were lost.
    Lagged {
        /// Number of messages dropped.
        skipped: u64,
    },
    /// The bus stopped.
    Closed,
}

// =============================================================================
// Bus
// =============================================================================

/// Broadcast bus shared by the publisher and every stream.
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    sender: RwLock<Option<broadcast::Sender<BusMessage>>>,
    clients: Mutex<HashSet<String>>,
}

/// Shared event bus reference.
pub type SharedEventBus = Arc<EventBus>;

impl EventBus {
    /// Create a stopped bus whose subscribers buffer up to `capacity`
    /// messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sender: RwLock::new(None),
            clients: Mutex::new(HashSet::new()),
        }
    }

    /// Create a stopped bus with [`DEFAULT_BUS_CAPACITY`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }

    /// Per-subscriber capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start accepting subscribers and messages.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyStarted`] if running.
    pub fn start(&self) -> Result<(), BusError> {
        let mut sender = self.sender.write();
        if sender.is_some() {
            return Err(BusError::AlreadyStarted);
        }
        *sender = Some(broadcast::channel(self.capacity).0);
        tracing::info!(capacity = self.capacity, "Event bus started");
        Ok(())
    }

    /// Stop the bus and close every subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotRunning`] if already stopped.
    pub fn stop(&self) -> Result<(), BusError> {
        if self.sender.write().take().is_none() {
            return Err(BusError::NotRunning);
        }
        tracing::info!("Event bus stopped");
        Ok(())
    }

    /// Whether the bus is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    /// Subscribe `client_id` to every message.
    ///
    /// The returned subscription unsubscribes when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotRunning`] on a stopped bus and
    /// [`BusError::AlreadySubscribed`] for a duplicate client ID.
    pub fn subscribe(self: &Arc<Self>, client_id: &str) -> Result<BusSubscription, BusError> {
        let receiver = self
            .sender
            .read()
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(BusError::NotRunning)?;

        let count = {
            let mut clients = self.clients.lock();
            if !clients.insert(client_id.to_string()) {
                return Err(BusError::AlreadySubscribed {
                    client_id: client_id.to_string(),
                });
            }
            clients.len()
        };
        metrics::set_bus_subscribers(count);
        tracing::debug!(client_id, "Subscribed to event bus");

        Ok(BusSubscription {
            client_id: client_id.to_string(),
            receiver,
            bus: Arc::clone(self),
        })
    }

    /// Remove `client_id` from the subscriber registry.
    ///
    /// Returns whether the client was subscribed.
    pub fn unsubscribe(&self, client_id: &str) -> bool {
        let (removed, count) = {
            let mut clients = self.clients.lock();
            (clients.remove(client_id), clients.len())
        };
        if removed {
            metrics::set_bus_subscribers(count);
            tracing::debug!(client_id, "Unsubscribed from event bus");
        }
        removed
    }

    /// Publish to every subscriber.
    ///
    /// Returns the number of receivers the message was queued for.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotRunning`] on a stopped bus.
    pub fn publish(&self, message: BusMessage) -> Result<usize, BusError> {
        let sender = self.sender.read();
        let sender = sender.as_ref().ok_or(BusError::NotRunning)?;
        // No receivers is not an error.
        Ok(sender.send(message).unwrap_or(0))
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.clients.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A live bus subscription; unsubscribes on drop.
#[derive(Debug)]
pub struct BusSubscription {
    client_id: String,
    receiver: broadcast::Receiver<BusMessage>,
    bus: Arc<EventBus>,
}

impl BusSubscription {
    /// Client ID this subscription was registered under.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> BusEvent {
        match self.receiver.recv().await {
            Ok(message) => BusEvent::Message(message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => BusEvent::Lagged { skipped },
            Err(broadcast::error::RecvError::Closed) => BusEvent::Closed,
        }
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.client_id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn running(capacity: usize) -> Arc<EventBus> {
        let bus = Arc::new(EventBus::new(capacity));
        bus.start().unwrap();
        bus
    }

    #[test]
    fn start_stop_lifecycle() {
        let bus = EventBus::with_defaults();
        assert!(!bus.is_running());
        bus.start().unwrap();
        assert_eq!(bus.start(), Err(BusError::AlreadyStarted));
        bus.stop().unwrap();
        assert_eq!(bus.stop(), Err(BusError::NotRunning));
    }

    #[test]
    fn publish_requires_running_bus() {
        let bus = EventBus::with_defaults();
        assert_eq!(
            bus.publish(BusMessage::Error("x".into())),
            Err(BusError::NotRunning)
        );
    }

    #[test]
    fn duplicate_client_is_rejected() {
        let bus = running(4);
        let _first = bus.subscribe("a").unwrap();
        assert!(matches!(
            bus.subscribe("a"),
            Err(BusError::AlreadySubscribed { .. })
        ));
    }

    #[test]
    fn drop_unsubscribes() {
        let bus = running(4);
        let sub = bus.subscribe("a").unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe("a"));
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_message_in_order() {
        let bus = running(8);
        let mut a = bus.subscribe("a").unwrap();
        let mut b = bus.subscribe("b").unwrap();

        assert_eq!(bus.publish(BusMessage::Error("one".into())).unwrap(), 2);
        bus.publish(BusMessage::Error("two".into())).unwrap();

        for sub in [&mut a, &mut b] {
            for expected in ["one", "two"] {
                match sub.recv().await {
                    BusEvent::Message(BusMessage::Error(text)) => assert_eq!(text, expected),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking_publisher() {
        let bus = running(2);
        let mut slow = bus.subscribe("slow").unwrap();

        for i in 0..5 {
            bus.publish(BusMessage::Error(i.to_string())).unwrap();
        }

        assert!(matches!(slow.recv().await, BusEvent::Lagged { skipped: 3 }));
    }

    #[tokio::test]
    async fn stop_closes_subscriptions() {
        let bus = running(2);
        let mut sub = bus.subscribe("a").unwrap();

        bus.stop().unwrap();

        assert!(matches!(sub.recv().await, BusEvent::Closed));
        assert!(matches!(bus.subscribe("b"), Err(BusError::NotRunning)));
    }
}
