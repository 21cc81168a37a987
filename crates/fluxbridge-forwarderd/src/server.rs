//! The forwarder server: owns a set of bindings and batch bindings and
//! drives them from a shared pub/sub bus to their downstream databases.
//!
//! Mirrors the teacher daemon's split between a long-lived registry
//! (bindings registered before `run`) and per-binding worker tasks spawned
//! at `run` time, coordinated by a single `broadcast::Sender<()>` shutdown
//! signal every task selects on.

use std::sync::Arc;

use fluxbridge_core::bus::BusConsumerFactory;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::binding::{BatchBinding, Binding};
use crate::error::ForwarderError;
use crate::{accumulator, batch, single};

pub struct Server {
    bus: Arc<dyn BusConsumerFactory>,
    bindings: Vec<Binding>,
    batch_bindings: Vec<BatchBinding>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(bus: Arc<dyn BusConsumerFactory>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Server {
            bus,
            bindings: Vec::new(),
            batch_bindings: Vec::new(),
            shutdown_tx,
        }
    }

    /// Registers a single-message binding. Must be called before `run`.
    pub fn register(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// Registers a batch binding. Must be called before `run`.
    pub fn register_batch(&mut self, binding: BatchBinding) {
        self.batch_bindings.push(binding);
    }

    /// Signals every running binding to stop accepting new deliveries.
    /// Non-blocking; `run` is what actually waits for quiescence.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A cloneable handle that can trigger `stop` after `run` has taken
    /// ownership of the server (e.g. from a ctrl-c task running alongside it).
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Initializes every endpoint, subscribes every binding to the bus, and
    /// blocks until `stop` has been called and every spawned task has
    /// wound down. Fails immediately if no bindings were registered or if
    /// any endpoint's `init`/subscribe fails.
    pub async fn run(self) -> Result<(), ForwarderError> {
        if self.bindings.is_empty() && self.batch_bindings.is_empty() {
            return Err(ForwarderError::NoBindings);
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        for binding in &self.bindings {
            binding.endpoint.init().map_err(|source| ForwarderError::InitFailed {
                topic: binding.topic.clone(),
                channel: binding.channel.clone(),
                source,
            })?;

            let consumer = self
                .bus
                .consumer(&binding.topic, &binding.channel)
                .await
                .map_err(|source| ForwarderError::SubscribeFailed {
                    topic: binding.topic.clone(),
                    channel: binding.channel.clone(),
                    source,
                })?;

            let client = reqwest::Client::new();
            tracing::info!(topic = %binding.topic, channel = %binding.channel, workers = binding.workers, "binding registered");

            for _ in 0..binding.workers {
                tasks.push(tokio::spawn(single::run(
                    consumer.clone(),
                    binding.schema.clone(),
                    binding.endpoint.clone(),
                    client.clone(),
                    self.shutdown_tx.subscribe(),
                    binding.topic.clone(),
                    binding.channel.clone(),
                )));
            }
        }

        for binding in &self.batch_bindings {
            binding.endpoint.init().map_err(|source| ForwarderError::InitFailed {
                topic: binding.topic.clone(),
                channel: binding.channel.clone(),
                source,
            })?;

            let consumer = self
                .bus
                .consumer(&binding.topic, &binding.channel)
                .await
                .map_err(|source| ForwarderError::SubscribeFailed {
                    topic: binding.topic.clone(),
                    channel: binding.channel.clone(),
                    source,
                })?;

            let client = reqwest::Client::new();
            let (tx, rx) = tokio::sync::mpsc::channel(256);
            tracing::info!(
                topic = %binding.topic,
                channel = %binding.channel,
                workers = binding.workers,
                max_batch_messages = binding.max_batch_messages,
                max_batch_time_ms = binding.max_batch_time.as_millis() as u64,
                "batch binding registered"
            );

            tasks.push(tokio::spawn(accumulator::run(
                rx,
                binding.endpoint.clone(),
                client.clone(),
                binding.max_batch_messages,
                binding.max_batch_time,
                self.shutdown_tx.subscribe(),
                binding.topic.clone(),
            )));

            for _ in 0..binding.workers {
                tasks.push(tokio::spawn(batch::run(
                    consumer.clone(),
                    binding.schema.clone(),
                    binding.endpoint.clone(),
                    tx.clone(),
                    self.shutdown_tx.subscribe(),
                    binding.topic.clone(),
                    binding.channel.clone(),
                )));
            }
        }

        for task in tasks {
            let _ = task.await;
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct ServerHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl ServerHandle {
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
