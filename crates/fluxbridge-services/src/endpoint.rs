//! The `Endpoint` trait: the seam between a decoded record and a concrete
//! database's wire format, matching `fluxbridge-core`'s polymorphism
//! pattern for pluggable drivers (one impl per database).
//!
//! A plain [`Endpoint`] forwards one record per HTTP request. An endpoint
//! that can batch multiple records into a single request additionally
//! implements [`BatchEndpoint`], which supplies the framing bytes the
//! forwarder's accumulator needs to join several translated bodies together.

use async_trait::async_trait;

use fluxbridge_core::schema::SchemaError;
use fluxbridge_core::wire::Value;

#[derive(thiserror::Error, Debug)]
pub enum EndpointError {
    #[error("failed to translate record to JSON: {0}")]
    Translate(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to build HTTP request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response from {endpoint}: HTTP {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },
    #[error("invalid address for {endpoint} endpoint: {addr}")]
    InvalidAddress { endpoint: String, addr: String },
    /// InfluxDB's series-name convention requires the schema's first field
    /// to be a `String`; configuring one otherwise is a setup error, not a
    /// per-record one, so it's reported from `init`, not `translate`.
    #[error("influxdb endpoint requires the schema's first field to be String (series name), got {0}")]
    SeriesNameNotString(fluxbridge_core::wire::Type),
    #[error("influxdb endpoint does not support Ext-typed fields")]
    ExtNotSupported,
}

/// A single-message delivery target: translate a decoded record into a
/// request body, build the HTTP request, and validate the response.
///
/// An endpoint is constructed with its schema already known (the driver
/// owns it), so `translate` only ever sees the positional values for a
/// single record, in schema order.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// A short name used in logs and error messages.
    fn name(&self) -> &str;

    /// One-time setup performed before the first `translate`/`build_request`
    /// call (e.g. resolving a fully-qualified URL, validating the schema
    /// shape this driver requires). Called exactly once by the forwarder
    /// server before a binding starts consuming.
    fn init(&self) -> Result<(), EndpointError> {
        Ok(())
    }

    /// Translates one decoded record (values in schema order) into the
    /// body bytes this endpoint's database expects.
    fn translate(&self, values: &[Value]) -> Result<Vec<u8>, EndpointError>;

    /// Builds the outbound HTTP request for a translated body.
    fn build_request(&self, client: &reqwest::Client, body: Vec<u8>) -> Result<reqwest::Request, EndpointError>;

    /// Validates the HTTP response, turning a non-success status into an error.
    async fn validate_response(&self, response: reqwest::Response) -> Result<(), EndpointError>;
}

/// A batch-capable delivery target. The forwarder's accumulator calls
/// `concat` once per flush instead of sending each translated entry in its
/// own request.
pub trait BatchEndpoint: Endpoint {
    fn entry_prefix(&self) -> &[u8] {
        b""
    }
    fn entry_suffix(&self) -> &[u8] {
        b""
    }
    fn batch_prefix(&self) -> &[u8] {
        b""
    }
    fn batch_suffix(&self) -> &[u8] {
        b""
    }

    /// Bytes placed between consecutive entries. The forwarder's streaming
    /// accumulator writes this directly between entries as they arrive,
    /// rather than building the whole batch and calling `concat`.
    fn separator(&self) -> &[u8] {
        b","
    }

    /// Joins translated entries into one request body: `batch_prefix`,
    /// then each entry wrapped in `entry_prefix`/`entry_suffix` and
    /// joined by `separator`, then `batch_suffix`.
    fn concat(&self, entries: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.batch_prefix());
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(self.separator());
            }
            out.extend_from_slice(self.entry_prefix());
            out.extend_from_slice(entry);
            out.extend_from_slice(self.entry_suffix());
        }
        out.extend_from_slice(self.batch_suffix());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBatch;
    impl BatchEndpoint for FakeBatch {
        fn batch_prefix(&self) -> &[u8] {
            b"["
        }
        fn batch_suffix(&self) -> &[u8] {
            b"]"
        }
    }
    #[async_trait]
    impl Endpoint for FakeBatch {
        fn name(&self) -> &str {
            "fake"
        }
        fn translate(&self, values: &[Value]) -> Result<Vec<u8>, EndpointError> {
            Ok(serde_json::to_vec(&values.iter().map(fluxbridge_core::render_value_json).collect::<Vec<_>>())?)
        }
        fn build_request(&self, _client: &reqwest::Client, _body: Vec<u8>) -> Result<reqwest::Request, EndpointError> {
            unreachable!("not exercised in this test")
        }
        async fn validate_response(&self, _response: reqwest::Response) -> Result<(), EndpointError> {
            Ok(())
        }
    }

    #[test]
    fn concat_joins_entries_as_json_array() {
        let endpoint = FakeBatch;
        let entries = vec![b"{\"a\":1}".to_vec(), b"{\"a\":2}".to_vec()];
        let body = endpoint.concat(&entries);
        assert_eq!(body, b"[{\"a\":1},{\"a\":2}]".to_vec());
    }

    #[test]
    fn concat_of_empty_batch_is_just_the_wrapper() {
        let endpoint = FakeBatch;
        let body = endpoint.concat(&[]);
        assert_eq!(body, b"[]".to_vec());
    }
}
