//! The pub/sub bus boundary: the interface both the producer and the
//! forwarder talk to, plus an in-memory double used by tests and local
//! demos. A production transport (NSQ, Kafka, NATS, ...) is explicitly out
//! of scope here — this module only fixes the contract a real adapter
//! would have to satisfy.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The client has not established (or has lost) its connection to the
    /// bus and a caller should retry after reconnecting.
    #[error("not connected to bus")]
    NotConnected,
    /// The client has been stopped and will not accept further calls.
    #[error("bus client stopped")]
    Stopped,
    /// The bus rejected the publish outright (bad topic, oversized message, ...).
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// The producer side of the bus boundary: publish pre-encoded bytes to a
/// named topic, with explicit connect/stop lifecycle methods so a lazy,
/// retrying caller (see `fluxbridge-producer::Logger`) can distinguish "not
/// yet connected" from "connected but the publish itself failed".
#[async_trait]
pub trait BusProducer: Send + Sync {
    async fn connect(&self) -> Result<(), BusError>;
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;
    async fn stop(&self);
}

/// The consumer side of the bus boundary: subscribe to a topic/channel pair
/// and receive a stream of message payloads.
#[async_trait]
pub trait BusConsumer: Send + Sync {
    async fn subscribe(&self, topic: &str, channel: &str) -> Result<(), BusError>;
    /// Blocks until a message arrives, the subscription is stopped, or the
    /// underlying transport is lost.
    async fn recv(&self) -> Result<Vec<u8>, BusError>;
    async fn stop(&self);
}

/// Mints `BusConsumer` handles for a given topic/channel pair. Kept separate
/// from `BusConsumer` itself because the forwarder server (C6) registers
/// bindings one at a time as they come in, each needing its own subscription
/// carved out of a single shared bus handle.
#[async_trait]
pub trait BusConsumerFactory: Send + Sync {
    async fn consumer(&self, topic: &str, channel: &str) -> Result<Arc<dyn BusConsumer>, BusError>;
}

#[async_trait]
impl BusConsumerFactory for LocalBus {
    async fn consumer(&self, topic: &str, _channel: &str) -> Result<Arc<dyn BusConsumer>, BusError> {
        Ok(Arc::new(self.subscription(topic).await))
    }
}

/// An in-memory `BusProducer`/`BusConsumer` pair for tests and local demos.
/// Every subscriber on a topic receives every message published to it
/// (broadcast semantics) — this is not how a real queue with per-channel
/// cursors behaves, but it is enough to exercise the producer and forwarder
/// against each other without a real transport.
pub struct LocalBus {
    topics: Mutex<std::collections::HashMap<String, broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new() -> Self {
        LocalBus {
            topics: Mutex::new(std::collections::HashMap::new()),
            capacity: 256,
        }
    }

    async fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusProducer for LocalBus {
    async fn connect(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let sender = self.sender_for(topic).await;
        // No subscribers yet is not an error: a producer shouldn't fail
        // just because nothing is listening.
        let _ = sender.send(payload.to_vec());
        Ok(())
    }

    async fn stop(&self) {}
}

/// A single topic subscription handle returned by [`LocalBus::subscription`].
pub struct LocalSubscription {
    receiver: Mutex<broadcast::Receiver<Vec<u8>>>,
}

#[async_trait]
impl BusConsumer for LocalSubscription {
    async fn subscribe(&self, _topic: &str, _channel: &str) -> Result<(), BusError> {
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, BusError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Stopped),
            }
        }
    }

    async fn stop(&self) {}
}

impl LocalBus {
    /// Creates a subscription handle for `topic`. Messages published before
    /// this call are not replayed, matching real pub/sub semantics.
    pub async fn subscription(&self, topic: &str) -> LocalSubscription {
        let sender = self.sender_for(topic).await;
        LocalSubscription {
            receiver: Mutex::new(sender.subscribe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_subscribe_round_trip() {
        let bus = LocalBus::new();
        let sub = bus.subscription("metrics").await;
        bus.publish("metrics", b"hello").await.unwrap();
        let got = sub.recv().await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = LocalBus::new();
        bus.publish("metrics", b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn subscription_after_stop_receives_stopped_error() {
        let bus = LocalBus::new();
        let sub = bus.subscription("metrics").await;
        drop(bus);
        assert_eq!(sub.recv().await.unwrap_err(), BusError::Stopped);
    }

    #[tokio::test]
    async fn consumer_factory_mints_a_working_subscription() {
        let bus = LocalBus::new();
        let factory: &dyn BusConsumerFactory = &bus;
        let consumer = factory.consumer("metrics", "forwarder").await.unwrap();
        bus.publish("metrics", b"hello").await.unwrap();
        assert_eq!(consumer.recv().await.unwrap(), b"hello");
    }
}
