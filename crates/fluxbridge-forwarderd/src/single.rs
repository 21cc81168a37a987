//! Single-message handler: the per-binding task that drains one bus
//! consumer and, for every delivered record, runs translate → build request
//! → send → validate synchronously before asking for the next message.

use std::sync::Arc;

use fluxbridge_core::bus::{BusConsumer, BusError};
use fluxbridge_core::schema::Schema;
use fluxbridge_services::Endpoint;
use tokio::sync::broadcast;

pub async fn run(
    consumer: Arc<dyn BusConsumer>,
    schema: Arc<Schema>,
    endpoint: Arc<dyn Endpoint>,
    client: reqwest::Client,
    mut shutdown: broadcast::Receiver<()>,
    topic: String,
    channel: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(topic = %topic, channel = %channel, "single-message handler shutting down");
                consumer.stop().await;
                return;
            }
            msg = consumer.recv() => {
                match msg {
                    Ok(payload) => handle_one(&schema, endpoint.as_ref(), &client, &payload, &topic).await,
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

async fn handle_one(schema: &Schema, endpoint: &dyn Endpoint, client: &reqwest::Client, payload: &[u8], topic: &str) {
    let values = match schema.decode_to_slice(payload) {
        Ok(values) => values,
        Err(error) => {
            tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: schema decode failed");
            return;
        }
    };

    let body = match endpoint.translate(&values) {
        Ok(body) => body,
        Err(error) => {
            tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: translate failed");
            return;
        }
    };

    let request = match endpoint.build_request(client, body) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: build_request failed");
            return;
        }
    };

    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: HTTP request failed");
            return;
        }
    };

    if let Err(error) = endpoint.validate_response(response).await {
        tracing::warn!(topic, endpoint = endpoint.name(), %error, "dropping record: response validation failed");
    }
}
