//! # Control Bus
//!
//! An in-process publish/subscribe bus keyed by [`Topic`]. One bus instance
//! is created by the host and passed explicitly to every component that
//! publishes or subscribes.
//!
//! ## Delivery Rules
//! ```text
//! publish(topic, msg)
//!     │
//!     ├── no subscriber ever registered on topic ──► dropped (returns 0)
//!     │
//!     └── broadcast::Sender ──► every live Subscription on that topic
//!                               FIFO per (topic, subscription)
//!                               queue full ──► oldest message overwritten,
//!                                              subscriber warned on recv
//! ```
//!
//! Publishing never blocks and never fails. A slow subscriber only hurts
//! itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, warn};

use crate::error::{ControlError, ControlResult};
use crate::message::{message_from_string, CommandMessage};
use crate::topic::Topic;

/// Default per-subscription queue depth.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Bus tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Messages retained per topic for a subscriber that has not caught up.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if self.capacity == 0 {
            return Err(ControlError::InvalidConfig(
                "capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Bus
// =============================================================================

struct Inner {
    topics: RwLock<HashMap<Topic, broadcast::Sender<CommandMessage>>>,
    capacity: usize,
}

/// Cloneable handle to one bus. Clones share topics and subscribers.
#[derive(Clone)]
pub struct ControlBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ControlBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBus")
            .field("capacity", &self.inner.capacity)
            .field("topics", &self.inner.topics.read().len())
            .finish()
    }
}

impl Default for ControlBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }
}

impl ControlBus {
    /// Creates a bus from validated configuration.
    pub fn new(config: BusConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self::with_capacity(config.capacity))
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: RwLock::new(HashMap::new()),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Delivers `message` to every current subscriber of `topic`.
    ///
    /// Returns the number of subscriptions that will see it. Zero means the
    /// message was dropped.
    pub fn publish(&self, topic: &Topic, message: CommandMessage) -> usize {
        let topics = self.inner.topics.read();
        let Some(sender) = topics.get(topic) else {
            debug!(topic = %topic, message = %message, "No subscriber, message dropped");
            return 0;
        };
        match sender.send(message) {
            Ok(receivers) => {
                debug!(topic = %topic, message = %message, receivers, "Published");
                receivers
            }
            Err(_) => {
                debug!(topic = %topic, message = %message, "All subscribers gone, message dropped");
                0
            }
        }
    }

    /// Parses a command word and publishes it.
    pub fn publish_str(&self, topic: &Topic, text: &str) -> ControlResult<usize> {
        let message = message_from_string(text)?;
        Ok(self.publish(topic, message))
    }

    /// Registers interest in `topics`. Messages published after this call
    /// are delivered; earlier ones are not.
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        let mut streams = StreamMap::new();
        let mut registry = self.inner.topics.write();
        for topic in topics {
            let sender = registry
                .entry(topic.clone())
                .or_insert_with(|| broadcast::channel(self.inner.capacity).0);
            streams.insert(topic.clone(), BroadcastStream::new(sender.subscribe()));
        }
        Subscription {
            streams,
            dropped: 0,
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// One received message and the topic it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
    pub message: CommandMessage,
}

/// A consumer's view of the bus.
pub struct Subscription {
    streams: StreamMap<Topic, BroadcastStream<CommandMessage>>,
    dropped: u64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topics", &self.topics())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl Subscription {
    /// Waits for the next message on any subscribed topic.
    ///
    /// Returns `None` once every topic's bus has been dropped.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let (topic, item) = self.streams.next().await?;
            match item {
                Ok(message) => return Some(Delivery { topic, message }),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    warn!(topic = %topic, skipped, "Control subscriber lagged, oldest messages dropped");
                }
            }
        }
    }

    /// Total messages this subscription lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.streams.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn next(sub: &mut Subscription) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_millis(200), sub.recv())
            .await
            .ok()
            .flatten()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ControlBus::new(BusConfig { capacity: 0 }).unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));
        assert_eq!(ControlBus::default().capacity(), DEFAULT_BUS_CAPACITY);
    }

    #[test]
    fn test_publish_without_subscriber_is_dropped() {
        let bus = ControlBus::default();
        assert_eq!(bus.publish(&Topic::Global, CommandMessage::Halt), 0);
    }

    #[tokio::test]
    async fn test_publish_after_subscriber_dropped() {
        let bus = ControlBus::default();
        let sub = bus.subscribe(&[Topic::Global]);
        drop(sub);
        assert_eq!(bus.publish(&Topic::Global, CommandMessage::Pause), 0);
    }

    #[tokio::test]
    async fn test_fifo_per_topic() {
        let bus = ControlBus::default();
        let mut sub = bus.subscribe(&[Topic::sync("docs")]);
        let topic = Topic::sync("docs");
        for message in [
            CommandMessage::Pause,
            CommandMessage::Resume,
            CommandMessage::Resync,
        ] {
            assert_eq!(bus.publish(&topic, message), 1);
        }
        let received: Vec<_> = [
            next(&mut sub).await,
            next(&mut sub).await,
            next(&mut sub).await,
        ]
        .into_iter()
        .map(|d| d.unwrap().message)
        .collect();
        assert_eq!(
            received,
            vec![
                CommandMessage::Pause,
                CommandMessage::Resume,
                CommandMessage::Resync
            ]
        );
    }

    #[tokio::test]
    async fn test_multi_topic_subscription() {
        let bus = ControlBus::default();
        let mut sub = bus.subscribe(&[Topic::Global, Topic::sync("a")]);
        let mut other = bus.subscribe(&[Topic::sync("b")]);

        bus.publish(&Topic::sync("a"), CommandMessage::Disable);
        bus.publish(&Topic::Global, CommandMessage::Halt);

        let mut got = vec![next(&mut sub).await.unwrap(), next(&mut sub).await.unwrap()];
        got.sort_by(|a, b| a.topic.cmp(&b.topic));
        assert_eq!(
            got,
            vec![
                Delivery {
                    topic: Topic::Global,
                    message: CommandMessage::Halt
                },
                Delivery {
                    topic: Topic::sync("a"),
                    message: CommandMessage::Disable
                },
            ]
        );
        assert!(next(&mut other).await.is_none());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = ControlBus::default();
        let mut first = bus.subscribe(&[Topic::SyncAll]);
        let mut second = bus.clone().subscribe(&[Topic::SyncAll]);
        assert_eq!(bus.publish(&Topic::SyncAll, CommandMessage::SyncLoop), 2);
        assert_eq!(next(&mut first).await.unwrap().message, CommandMessage::SyncLoop);
        assert_eq!(next(&mut second).await.unwrap().message, CommandMessage::SyncLoop);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let bus = ControlBus::new(BusConfig { capacity: 2 }).unwrap();
        let mut sub = bus.subscribe(&[Topic::Global]);
        for message in [
            CommandMessage::Pause,
            CommandMessage::Resume,
            CommandMessage::Enable,
            CommandMessage::Disable,
        ] {
            bus.publish(&Topic::Global, message);
        }

        assert_eq!(next(&mut sub).await.unwrap().message, CommandMessage::Enable);
        assert_eq!(sub.dropped(), 2);
        assert_eq!(next(&mut sub).await.unwrap().message, CommandMessage::Disable);
        assert!(next(&mut sub).await.is_none());
    }

    #[tokio::test]
    async fn test_publish_str() {
        let bus = ControlBus::default();
        let mut sub = bus.subscribe(&[Topic::Global]);
        assert_eq!(bus.publish_str(&Topic::Global, "quit").unwrap(), 1);
        assert_eq!(next(&mut sub).await.unwrap().message, CommandMessage::Halt);
        assert!(bus.publish_str(&Topic::Global, "bogus").is_err());
        assert_eq!(sub.topics(), vec![Topic::Global]);
    }
}
