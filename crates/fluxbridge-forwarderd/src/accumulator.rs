//! Accumulator drain worker: owns a batch binding's output buffer and
//! flushes it on a size trigger (`max_batch_messages`) or a time trigger
//! (`max_batch_time`), whichever comes first. The buffer is touched by this
//! task alone — translated entries arrive over `rx` rather than through
//! shared state.

use std::sync::Arc;
use std::time::Duration;

use fluxbridge_services::{BatchEndpoint, BufferPool};
use tokio::sync::{broadcast, mpsc};

pub async fn run(
    mut rx: mpsc::Receiver<Vec<u8>>,
    endpoint: Arc<dyn BatchEndpoint>,
    client: reqwest::Client,
    max_batch_messages: usize,
    max_batch_time: Duration,
    mut shutdown: broadcast::Receiver<()>,
    topic: String,
) {
    let pool = BufferPool::new();
    let mut buffer = pool.get();
    buffer.extend_from_slice(endpoint.batch_prefix());
    let mut count = 0usize;
    let mut ticker = tokio::time::interval(max_batch_time);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                if count > 0 {
                    flush(&mut buffer, &mut count, &pool, endpoint.as_ref(), &client, &topic).await;
                }
                tracing::info!(topic = %topic, "accumulator drain worker shutting down");
                return;
            }

            _ = ticker.tick() => {
                if count > 0 {
                    flush(&mut buffer, &mut count, &pool, endpoint.as_ref(), &client, &topic).await;
                }
            }

            entry = rx.recv() => {
                let Some(entry) = entry else {
                    if count > 0 {
                        flush(&mut buffer, &mut count, &pool, endpoint.as_ref(), &client, &topic).await;
                    }
                    tracing::info!(topic = %topic, "translated-entry channel closed, accumulator exiting");
                    return;
                };

                if count > 0 {
                    buffer.extend_from_slice(endpoint.separator());
                }
                buffer.extend_from_slice(endpoint.entry_prefix());
                buffer.extend_from_slice(&entry);
                buffer.extend_from_slice(endpoint.entry_suffix());
                count += 1;

                if count >= max_batch_messages {
                    flush(&mut buffer, &mut count, &pool, endpoint.as_ref(), &client, &topic).await;
                }
            }
        }
    }
}

/// Sends the accumulated buffer and resets it, regardless of outcome — a
/// failed batch's data is not retried (spec'd behavior, not an oversight).
/// The outgoing buffer is drawn from and returned to `pool` so a steady
/// stream of flushes doesn't allocate a fresh `Vec` per batch.
async fn flush(buffer: &mut Vec<u8>, count: &mut usize, pool: &BufferPool, endpoint: &dyn BatchEndpoint, client: &reqwest::Client, topic: &str) {
    let mut body = std::mem::replace(buffer, pool.get());
    body.extend_from_slice(endpoint.batch_suffix());
    *count = 0;
    buffer.extend_from_slice(endpoint.batch_prefix());

    match endpoint.build_request(client, body.clone()) {
        Ok(request) => match client.execute(request).await {
            Ok(response) => {
                if let Err(error) = endpoint.validate_response(response).await {
                    tracing::warn!(
                        topic,
                        endpoint = endpoint.name(),
                        %error,
                        body = %String::from_utf8_lossy(&body),
                        "batch flush failed validation"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(
                    topic,
                    endpoint = endpoint.name(),
                    %error,
                    body = %String::from_utf8_lossy(&body),
                    "batch flush HTTP request failed"
                );
            }
        },
        Err(error) => {
            tracing::warn!(
                topic,
                endpoint = endpoint.name(),
                %error,
                body = %String::from_utf8_lossy(&body),
                "batch flush build_request failed"
            );
        }
    }
    pool.put(body);
}
