//! The `Encoder` trait: anything that knows how to serialize itself onto
//! the wire into a caller-supplied buffer.
//!
//! `fluxbridge-producer::Logger` queues trait objects of this rather than
//! raw bytes, so the actual serialization happens inside a publisher
//! worker's own pre-grown buffer at drain time, not before the message is
//! handed to the logger (mirrors `original_source/msg/schema.go`'s
//! `Encoder` interface and `original_source/log/init.go`'s `publoop`, which
//! calls `msg.Encode(buf)` against a buffer it owns and resets between
//! messages).

use std::sync::Arc;

use crate::schema::{Schema, SchemaError};
use crate::wire::Value;

pub trait Encoder: Send + Sync {
    /// Appends this record's wire bytes to `buf`. `buf` is owned by the
    /// caller (typically a publisher worker's reused buffer) and is not
    /// cleared here — clear it before calling if a fresh buffer is needed.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), SchemaError>;
}

/// Encodes one record against a schema at drain time. The schema and
/// values are validated eagerly by whoever constructs this (see
/// `Logger::send_record`), so `encode` failing here would mean the schema
/// or values changed out from under a shared `Arc` — it still can't panic,
/// it just surfaces the mismatch the same way any other encode error does.
pub struct SchemaEncoder {
    pub schema: Arc<Schema>,
    pub values: Vec<Value>,
}

impl Encoder for SchemaEncoder {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), SchemaError> {
        self.schema.encode_tuple_into(buf, &self.values)
    }
}

/// Wraps an already-encoded payload. `encode` is just a copy into the
/// worker's buffer, so callers that already hold wire bytes (e.g.
/// forwarding a payload received from elsewhere) can still go through
/// `Logger::send` instead of needing a schema at the call site.
pub struct BytesEncoder(pub Vec<u8>);

impl Encoder for BytesEncoder {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), SchemaError> {
        buf.extend_from_slice(&self.0);
        Ok(())
    }
}
