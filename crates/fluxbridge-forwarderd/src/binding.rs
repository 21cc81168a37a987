//! Binding and BatchBinding: the unit of configuration a [`crate::Server`]
//! runs — a `(topic, channel)` pair wired to a database endpoint.

use std::sync::Arc;
use std::time::Duration;

use fluxbridge_core::schema::Schema;
use fluxbridge_services::{BatchEndpoint, Endpoint};

/// A single-message binding: every delivered record is translated and
/// POSTed on its own.
pub struct Binding {
    pub(crate) topic: String,
    pub(crate) channel: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) endpoint: Arc<dyn Endpoint>,
    pub(crate) workers: usize,
}

impl Binding {
    pub fn new(
        topic: impl Into<String>,
        channel: impl Into<String>,
        schema: Schema,
        endpoint: Arc<dyn Endpoint>,
        workers: usize,
    ) -> Self {
        Self {
            topic: topic.into(),
            channel: channel.into(),
            schema: Arc::new(schema),
            endpoint,
            workers: workers.max(1),
        }
    }
}

/// A batch binding: delivered records are accumulated and flushed as one
/// request, either once `max_batch_messages` have arrived or once
/// `max_batch_time` has elapsed since the last flush, whichever comes first.
pub struct BatchBinding {
    pub(crate) topic: String,
    pub(crate) channel: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) endpoint: Arc<dyn BatchEndpoint>,
    pub(crate) workers: usize,
    pub(crate) max_batch_messages: usize,
    pub(crate) max_batch_time: Duration,
}

impl BatchBinding {
    pub fn new(
        topic: impl Into<String>,
        channel: impl Into<String>,
        schema: Schema,
        endpoint: Arc<dyn BatchEndpoint>,
        workers: usize,
    ) -> Self {
        Self {
            topic: topic.into(),
            channel: channel.into(),
            schema: Arc::new(schema),
            endpoint,
            workers: workers.max(1),
            max_batch_messages: 50,
            max_batch_time: Duration::from_millis(250),
        }
    }

    pub fn with_max_batch_messages(mut self, n: usize) -> Self {
        self.max_batch_messages = n;
        self
    }

    pub fn with_max_batch_time(mut self, d: Duration) -> Self {
        self.max_batch_time = d;
        self
    }
}
