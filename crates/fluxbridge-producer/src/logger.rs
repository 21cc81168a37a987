//! `Logger`: the producer-side bridge between application code and the bus.
//!
//! Sends never block the caller for long: the first send spins up a single
//! worker and waits (bounded) for it to accept the message; later sends try
//! a non-blocking enqueue first and only grow the worker pool when the
//! queue is actually full. Workers that run dry idle out on their own
//! schedule, so a quiet logger settles back down to zero running workers
//! without anyone having to ask it to.
//!
//! The queue carries [`Encoder`] trait objects, not raw bytes: each
//! publisher worker owns a single pre-grown buffer it clears and re-fills
//! once per message, so the wire encoding happens at drain time rather than
//! before the message is handed to the logger (see `fluxbridge_core::encoder`
//! and `original_source/log/init.go`'s `publoop`).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use fluxbridge_core::bus::{BusError, BusProducer};
use fluxbridge_core::encoder::{BytesEncoder, Encoder, SchemaEncoder};
use fluxbridge_core::schema::{Schema, SchemaError};
use fluxbridge_core::wire::Value;

use crate::waitgroup::WaitGroup;

/// Idle timeout per worker slot, in order of the slot that is spawned at
/// that position (slot 0 — the first, always-present worker — gets the
/// longest leash; each additional worker idles out faster than the last).
const IDLE_SCHEDULE: [Duration; 8] = [
    Duration::from_secs(60 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(4 * 60),
    Duration::from_secs(60),
    Duration::from_secs(15),
    Duration::from_secs(4),
    Duration::from_secs(1),
    Duration::from_millis(250),
];

const MAX_WORKERS: usize = 8;
const QUEUE_CAPACITY: usize = 64;
const RECONNECT_RETRIES: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_millis(20);
const FIRST_SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// Initial capacity for each publisher worker's reused encode buffer.
const WORKER_BUF_CAPACITY: usize = 128;

type Queued = Box<dyn Encoder>;

struct Inner {
    status: AtomicBool,
    npubs: AtomicUsize,
    topic: String,
    bus: Arc<dyn BusProducer>,
    sender_slot: Mutex<Option<mpsc::Sender<Queued>>>,
    receiver: Mutex<mpsc::Receiver<Queued>>,
    workers_wg: WaitGroup,
    sends_wg: WaitGroup,
}

/// A non-blocking producer-side publisher with a dynamically sized worker pool.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    pub fn new(topic: impl Into<String>, bus: Arc<dyn BusProducer>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let inner = Arc::new(Inner {
            status: AtomicBool::new(true),
            npubs: AtomicUsize::new(0),
            topic: topic.into(),
            bus,
            sender_slot: Mutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
            workers_wg: WaitGroup::new(),
            sends_wg: WaitGroup::new(),
        });
        Logger { inner }
    }

    /// Whether `close` has already been called. A closed logger silently
    /// drops any further sends.
    pub fn is_closed(&self) -> bool {
        !self.inner.status.load(Ordering::SeqCst)
    }

    /// The number of publisher workers currently running (0-8).
    pub fn workers(&self) -> usize {
        self.inner.npubs.load(Ordering::SeqCst)
    }

    /// Validates `values` against `schema` and enqueues a [`SchemaEncoder`]
    /// that performs the actual wire encoding inside a publisher worker.
    /// Returns an error only if the record doesn't match the schema; once
    /// accepted, delivery is best-effort and never surfaces back to the
    /// caller (see module docs).
    pub async fn send_record(&self, schema: &Arc<Schema>, values: &[Value]) -> Result<(), SchemaError> {
        schema.validate(values)?;
        let encoder: Queued = Box::new(SchemaEncoder {
            schema: Arc::clone(schema),
            values: values.to_vec(),
        });
        self.send(encoder).await;
        Ok(())
    }

    /// Enqueues an already-encoded payload, wrapped so a publisher worker
    /// just copies it into its buffer rather than re-deriving it from a
    /// schema. Convenience for callers that already have wire bytes.
    pub async fn send_bytes(&self, payload: Vec<u8>) {
        self.send(Box::new(BytesEncoder(payload))).await;
    }

    /// Enqueues an [`Encoder`] for publishing. Never blocks for long: the
    /// worst case is the bounded wait the very first send takes while its
    /// worker spins up.
    pub async fn send(&self, encoder: Queued) {
        Self::do_send(&self.inner, encoder).await;
    }

    /// Spawns a task that forwards every encoder from `records` into this
    /// logger, stopping once the logger is closed or `records` is closed.
    pub fn listen(&self, mut records: mpsc::Receiver<Queued>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(encoder) = records.recv().await {
                if !inner.status.load(Ordering::SeqCst) {
                    break;
                }
                Self::do_send(&inner, encoder).await;
            }
        });
    }

    /// Permanently closes the logger: waits for in-flight sends to finish,
    /// closes the queue so workers drain whatever is left and exit, then
    /// stops the bus connection. Idempotent — calling this more than once
    /// after the first call is a no-op.
    pub async fn close(&self) {
        if !self.inner.status.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.sends_wg.wait().await;
        {
            let mut slot = self.inner.sender_slot.lock().await;
            *slot = None;
        }
        self.inner.workers_wg.wait().await;
        self.inner.bus.stop().await;
    }

    async fn do_send(inner: &Arc<Inner>, encoder: Queued) {
        if !inner.status.load(Ordering::SeqCst) {
            return;
        }
        let sender = {
            let slot = inner.sender_slot.lock().await;
            match slot.as_ref() {
                Some(s) => s.clone(),
                None => return,
            }
        };

        if inner.npubs.load(Ordering::SeqCst) == 0 {
            // No worker is draining the queue yet: start one, then block
            // (briefly) on the send so we don't spin up a second worker
            // for the same backlog before the first has a chance to run.
            Self::add_worker(inner);
            inner.sends_wg.add(1);
            tokio::select! {
                res = sender.send(encoder) => {
                    if res.is_err() {
                        tracing::warn!("fluxbridge-producer: queue closed mid-send");
                    }
                }
                _ = tokio::time::sleep(FIRST_SEND_TIMEOUT) => {
                    tracing::error!("fluxbridge-producer: timed out enqueueing message");
                }
            }
            inner.sends_wg.done();
            return;
        }

        inner.sends_wg.add(1);
        match sender.try_send(encoder) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(encoder)) => {
                Self::add_worker(inner);
                if sender.send(encoder).await.is_err() {
                    tracing::warn!("fluxbridge-producer: queue closed mid-send");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
        inner.sends_wg.done();
    }

    fn add_worker(inner: &Arc<Inner>) {
        if !inner.status.load(Ordering::SeqCst) {
            return;
        }
        if inner.npubs.load(Ordering::SeqCst) >= MAX_WORKERS {
            return;
        }
        inner.workers_wg.add(1);
        let np = inner.npubs.fetch_add(1, Ordering::SeqCst) + 1;
        if np > MAX_WORKERS {
            // Lost a race against another add_worker call; back out.
            inner.npubs.fetch_sub(1, Ordering::SeqCst);
            inner.workers_wg.done();
            return;
        }
        let dur = IDLE_SCHEDULE[np - 1];
        tracing::info!(slot = np - 1, idle_timeout = ?dur, "fluxbridge-producer: starting publish worker");
        let inner = Arc::clone(inner);
        tokio::spawn(async move { publish_loop(inner, dur).await });
    }
}

/// What a publish attempt tells the worker loop to do next.
enum Outcome {
    Continue,
    Shutdown,
}

async fn publish_loop(inner: Arc<Inner>, idle_timeout: Duration) {
    // Pre-grown once per worker and reused (cleared, not reallocated) for
    // every message it encodes, mirroring the original's `bytes.Buffer`
    // that `publoop` grows once and resets on every iteration.
    let mut buf = Vec::with_capacity(WORKER_BUF_CAPACITY);
    loop {
        let next = {
            let mut receiver = inner.receiver.lock().await;
            tokio::select! {
                _ = tokio::time::sleep(idle_timeout) => None,
                item = receiver.recv() => Some(item),
            }
        };
        let encoder = match next {
            None => break,       // idled out
            Some(None) => break, // queue closed and drained
            Some(Some(encoder)) => encoder,
        };

        buf.clear();
        if let Err(error) = encoder.encode(&mut buf) {
            tracing::warn!(%error, "fluxbridge-producer: message encode error");
        }
        if let Outcome::Shutdown = publish_with_retry(&inner, &buf).await {
            break;
        }
    }
    inner.npubs.fetch_sub(1, Ordering::SeqCst);
    inner.workers_wg.done();
}

async fn publish_with_retry(inner: &Arc<Inner>, payload: &[u8]) -> Outcome {
    let mut retries = 0u32;
    loop {
        match inner.bus.publish(&inner.topic, payload).await {
            Ok(()) => return Outcome::Continue,
            Err(BusError::Stopped) => {
                tracing::warn!("fluxbridge-producer: bus stopped, worker exiting");
                return Outcome::Shutdown;
            }
            Err(BusError::NotConnected) => {
                retries += 1;
                if retries > RECONNECT_RETRIES {
                    tracing::error!(retries, "fluxbridge-producer: giving up after repeated reconnect failures, worker exiting");
                    return Outcome::Shutdown;
                }
                tracing::info!("fluxbridge-producer: bus not connected, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            Err(BusError::Rejected(reason)) => {
                tracing::error!(%reason, "fluxbridge-producer: bus rejected message");
                return Outcome::Continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxbridge_core::bus::{BusConsumer, LocalBus};

    #[tokio::test]
    async fn single_send_is_delivered() {
        let bus = Arc::new(LocalBus::new());
        let sub = bus.subscription("metrics").await;
        let logger = Logger::new("metrics", bus);

        logger.send_bytes(b"hello".to_vec()).await;
        let got = sub.recv().await.unwrap();
        assert_eq!(got, b"hello");
        logger.close().await;
    }

    #[tokio::test]
    async fn worker_count_grows_and_then_idles_back_down() {
        let bus = Arc::new(LocalBus::new());
        let _sub = bus.subscription("metrics").await;
        let logger = Logger::new("metrics", bus);

        logger.send_bytes(b"a".to_vec()).await;
        assert_eq!(logger.workers(), 1);
        logger.close().await;
        assert_eq!(logger.workers(), 0);
    }

    #[tokio::test]
    async fn send_record_encodes_through_schema() {
        use fluxbridge_core::schema::Schema;
        use fluxbridge_core::wire::Type;

        let bus = Arc::new(LocalBus::new());
        let sub = bus.subscription("metrics").await;
        let logger = Logger::new("metrics", bus);
        let schema = Arc::new(Schema::from_pairs([("host", Type::String)]).unwrap());

        logger.send_record(&schema, &[Value::String("web-01".into())]).await.unwrap();
        let got = sub.recv().await.unwrap();
        let decoded = schema.decode_to_slice(&got).unwrap();
        assert_eq!(decoded, vec![Value::String("web-01".into())]);
        logger.close().await;
    }

    #[tokio::test]
    async fn send_record_rejects_mismatched_values_before_enqueueing() {
        use fluxbridge_core::schema::Schema;
        use fluxbridge_core::wire::Type;

        let bus = Arc::new(LocalBus::new());
        let logger = Logger::new("metrics", bus);
        let schema = Arc::new(Schema::from_pairs([("host", Type::String)]).unwrap());

        let err = logger.send_record(&schema, &[Value::Int(1)]).await.unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
        assert_eq!(logger.workers(), 0, "a rejected record must not spin up a worker");
        logger.close().await;
    }

    #[tokio::test]
    async fn closed_logger_drops_sends_silently() {
        let bus = Arc::new(LocalBus::new());
        let logger = Logger::new("metrics", bus);
        logger.close().await;
        assert!(logger.is_closed());
        logger.send_bytes(b"too late".to_vec()).await; // must not panic or hang
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let bus = Arc::new(LocalBus::new());
        let logger = Logger::new("metrics", bus);
        logger.close().await;
        logger.close().await;
    }
}
