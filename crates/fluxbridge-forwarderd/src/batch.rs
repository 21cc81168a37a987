//! Per-consumer task feeding a batch binding: decode each delivered record
//! against the binding's schema, translate it with the endpoint, and hand
//! the translated bytes to the accumulator drain worker over a channel.

use std::sync::Arc;

use fluxbridge_core::bus::{BusConsumer, BusError};
use fluxbridge_core::schema::Schema;
use fluxbridge_services::BatchEndpoint;
use tokio::sync::{broadcast, mpsc};

pub async fn run(
    consumer: Arc<dyn BusConsumer>,
    schema: Arc<Schema>,
    endpoint: Arc<dyn BatchEndpoint>,
    tx: mpsc::Sender<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
    topic: String,
    channel: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(topic = %topic, channel = %channel, "batch handler shutting down");
                consumer.stop().await;
                return;
            }
            msg = consumer.recv() => {
                match msg {
                    Ok(payload) => handle_one(&schema, endpoint.as_ref(), &tx, &payload, &topic).await,
                    Err(BusError::Stopped) => {
                        tracing::info!(topic = %topic, channel = %channel, "bus consumer stopped");
                        return;
                    }
                    Err(error) => {
                        tracing::warn!(topic = %topic, channel = %channel, %error, "bus recv failed");
                    }
                }
            }
        }
    }
}

async fn handle_one(schema: &Schema, endpoint: &dyn BatchEndpoint, tx: &mpsc::Sender<Vec<u8>>, payload: &[u8], topic: &str) {
    let values = match schema.decode_to_slice(payload) {
        Ok(values) => values,
        Err(error) => {
            tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: schema decode failed");
            return;
        }
    };

    let entry = match endpoint.translate(&values) {
        Ok(entry) => entry,
        Err(error) => {
            tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: translate failed");
            return;
        }
    };

    if tx.send(entry).await.is_err() {
        tracing::warn!(topic, endpoint = endpoint.name(), "dropping record: accumulator channel closed");
    }
}
