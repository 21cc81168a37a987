//! InfluxDB endpoint driver: records are translated into series entries and
//! can be accumulated into a single `[...]`-wrapped batch request against
//! `{addr}/db/{database}/series?u=root&p=root`.
//!
//! Unlike Elasticsearch, this driver does not use the schema's generic
//! per-field JSON object — InfluxDB's `series` API wants
//! `{"name": S, "columns": [...], "points": [[...]]}`, where `S` is taken
//! from the schema's first field (a repo-wide convention: the first field
//! names the series, the rest are its columns). That convention is
//! enforced once, in `new`, rather than auto-detected per record.

use std::sync::OnceLock;

use async_trait::async_trait;

use fluxbridge_core::render_value_json;
use fluxbridge_core::schema::Schema;
use fluxbridge_core::wire::{Type, Value};

use crate::endpoint::{BatchEndpoint, Endpoint, EndpointError};

pub struct InfluxDbEndpoint {
    schema: Schema,
    addr: String,
    database: String,
    fq_addr: OnceLock<String>,
}

impl InfluxDbEndpoint {
    /// Fails if the schema's first field is not `String` — InfluxDB's
    /// series name must come from a string field, and this driver never
    /// guesses which one (see module docs).
    pub fn new(schema: Schema, addr: impl Into<String>, database: impl Into<String>) -> Result<Self, EndpointError> {
        let first_ty = schema.fields().first().map(|f| f.ty);
        match first_ty {
            Some(Type::String) => {}
            Some(other) => return Err(EndpointError::SeriesNameNotString(other)),
            None => return Err(EndpointError::SeriesNameNotString(Type::String)),
        }
        Ok(InfluxDbEndpoint {
            schema,
            addr: addr.into(),
            database: database.into(),
            fq_addr: OnceLock::new(),
        })
    }

    /// The fully-qualified series endpoint URL, resolved once and cached.
    /// Credentials are the fixed `root`/`root` pair the original InfluxDB
    /// driver always used; this endpoint has no notion of per-instance auth.
    fn address(&self) -> &str {
        self.fq_addr.get_or_init(|| format!("{}/db/{}/series?u=root&p=root", self.addr, self.database))
    }
}

#[async_trait]
impl Endpoint for InfluxDbEndpoint {
    fn name(&self) -> &str {
        "influxdb"
    }

    fn init(&self) -> Result<(), EndpointError> {
        self.address();
        Ok(())
    }

    fn translate(&self, values: &[Value]) -> Result<Vec<u8>, EndpointError> {
        let name = match values.first() {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(EndpointError::SeriesNameNotString(Type::String)),
        };

        let mut columns = Vec::with_capacity(self.schema.len().saturating_sub(1));
        let mut points = Vec::with_capacity(columns.capacity());
        for (field, value) in self.schema.fields().iter().zip(values).skip(1) {
            if matches!(value, Value::Ext(_)) {
                return Err(EndpointError::ExtNotSupported);
            }
            columns.push(field.name.clone());
            points.push(render_value_json(value));
        }

        let body = serde_json::json!({
            "name": name,
            "columns": columns,
            "points": [points],
        });
        Ok(serde_json::to_vec(&body)?)
    }

    fn build_request(&self, client: &reqwest::Client, body: Vec<u8>) -> Result<reqwest::Request, EndpointError> {
        Ok(client.post(self.address()).header("content-type", "application/json").body(body).build()?)
    }

    async fn validate_response(&self, response: reqwest::Response) -> Result<(), EndpointError> {
        let status = response.status();
        if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::CREATED {
            Ok(())
        } else {
            Err(EndpointError::UnexpectedStatus {
                endpoint: format!("influxdb ({})", self.address()),
                status: status.as_u16(),
            })
        }
    }
}

impl BatchEndpoint for InfluxDbEndpoint {
    fn batch_prefix(&self) -> &[u8] {
        b"["
    }

    fn batch_suffix(&self) -> &[u8] {
        b"]"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::from_pairs([
            ("name", Type::String),
            ("age", Type::Int),
            ("id", Type::Uint),
            ("weight", Type::Float),
            ("data", Type::Bin),
            ("is_true", Type::Bool),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_schema_whose_first_field_is_not_string() {
        let schema = Schema::from_pairs([("age", Type::Int), ("name", Type::String)]).unwrap();
        let err = InfluxDbEndpoint::new(schema, "http://localhost:8086", "metrics").unwrap_err();
        assert!(matches!(err, EndpointError::SeriesNameNotString(Type::Int)));
    }

    #[test]
    fn translate_builds_name_columns_points() {
        let endpoint = InfluxDbEndpoint::new(sample_schema(), "http://localhost:8086", "testdb").unwrap();
        let values = vec![
            Value::String("bob".into()),
            Value::Int(32),
            Value::Uint(10923145),
            Value::Float(150.0),
            Value::Bin(vec![0x23, 0x47, 0x7f, 0x3c]),
            Value::Bool(true),
        ];
        let body = endpoint.translate(&values).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["name"], serde_json::Value::from("bob"));
        assert_eq!(parsed["columns"], serde_json::json!(["age", "id", "weight", "data", "is_true"]));
        assert_eq!(parsed["points"], serde_json::json!([[32, 10923145, 150.0, "I0d/PA==", true]]));
    }

    #[test]
    fn translate_rejects_ext_fields() {
        let schema = Schema::from_pairs([("name", Type::String), ("tag", Type::Ext)]).unwrap();
        let endpoint = InfluxDbEndpoint::new(schema, "http://localhost:8086", "testdb").unwrap();
        let values = vec![
            Value::String("bob".into()),
            Value::Ext(fluxbridge_core::wire::PackExt {
                extension_type: 1,
                data: vec![1, 2],
            }),
        ];
        assert!(matches!(endpoint.translate(&values), Err(EndpointError::ExtNotSupported)));
    }

    #[tokio::test]
    async fn build_request_uses_fixed_root_credentials() {
        let endpoint = InfluxDbEndpoint::new(sample_schema(), "http://localhost:8086", "metrics").unwrap();
        let client = reqwest::Client::new();
        let req = endpoint.build_request(&client, b"[]".to_vec()).unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().path(), "/db/metrics/series");
        let pairs: std::collections::HashMap<_, _> = req.url().query_pairs().collect();
        assert_eq!(pairs.get("u").map(|s| s.as_ref()), Some("root"));
        assert_eq!(pairs.get("p").map(|s| s.as_ref()), Some("root"));
    }

    #[test]
    fn batch_framing_wraps_entries_in_brackets() {
        let endpoint = InfluxDbEndpoint::new(sample_schema(), "http://localhost:8086", "metrics").unwrap();
        let entries = vec![b"{\"a\":1}".to_vec(), b"{\"a\":2}".to_vec(), b"{\"a\":3}".to_vec()];
        let body = endpoint.concat(&entries);
        assert_eq!(body, b"[{\"a\":1},{\"a\":2},{\"a\":3}]".to_vec());
    }
}
