//! Elasticsearch endpoint driver: one HTTP request per record against
//! `{addr}/{index}/{doc_type}`.

use std::sync::OnceLock;

use async_trait::async_trait;

use fluxbridge_core::schema::Schema;
use fluxbridge_core::wire::Value;

use crate::endpoint::{Endpoint, EndpointError};

/// Configured with a schema, a base URL, an index, and a document type.
/// `Init` precomputes `{base_url}/{index}/{doc_type}`; `Translate` runs the
/// schema's generic JSON rendering (§4.2) to produce the request body.
pub struct ElasticsearchEndpoint {
    schema: Schema,
    addr: String,
    index: String,
    doc_type: String,
    fq_addr: OnceLock<String>,
}

impl ElasticsearchEndpoint {
    pub fn new(schema: Schema, addr: impl Into<String>, index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        ElasticsearchEndpoint {
            schema,
            addr: addr.into(),
            index: index.into(),
            doc_type: doc_type.into(),
            fq_addr: OnceLock::new(),
        }
    }

    /// The fully-qualified document endpoint URL, resolved once and cached.
    fn address(&self) -> &str {
        self.fq_addr.get_or_init(|| format!("{}/{}/{}", self.addr, self.index, self.doc_type))
    }
}

#[async_trait]
impl Endpoint for ElasticsearchEndpoint {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn init(&self) -> Result<(), EndpointError> {
        self.address();
        Ok(())
    }

    fn translate(&self, values: &[Value]) -> Result<Vec<u8>, EndpointError> {
        let json = self.schema.render_json(values)?;
        Ok(serde_json::to_vec(&json)?)
    }

    fn build_request(&self, client: &reqwest::Client, body: Vec<u8>) -> Result<reqwest::Request, EndpointError> {
        Ok(client
            .post(self.address())
            .header("content-type", "application/json")
            .body(body)
            .build()?)
    }

    async fn validate_response(&self, response: reqwest::Response) -> Result<(), EndpointError> {
        let status = response.status();
        if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::CREATED {
            Ok(())
        } else {
            Err(EndpointError::UnexpectedStatus {
                endpoint: format!("elasticsearch ({})", self.address()),
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxbridge_core::wire::Type;

    fn sample_schema() -> Schema {
        Schema::from_pairs([("host", Type::String), ("cpu_pct", Type::Float)]).unwrap()
    }

    #[test]
    fn address_is_resolved_once_and_cached() {
        let endpoint = ElasticsearchEndpoint::new(sample_schema(), "http://localhost:9200", "metrics", "record");
        let first = endpoint.address().to_string();
        let second = endpoint.address().to_string();
        assert_eq!(first, "http://localhost:9200/metrics/record");
        assert_eq!(first, second);
    }

    #[test]
    fn translate_renders_record_via_schema() {
        let endpoint = ElasticsearchEndpoint::new(sample_schema(), "http://localhost:9200", "metrics", "record");
        let values = vec![Value::String("web-01".into()), Value::Float(42.5)];
        let body = endpoint.translate(&values).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["host"], serde_json::Value::from("web-01"));
        assert_eq!(parsed["cpu_pct"], serde_json::Value::from(42.5));
    }

    #[tokio::test]
    async fn build_request_posts_to_resolved_address() {
        let endpoint = ElasticsearchEndpoint::new(sample_schema(), "http://localhost:9200", "metrics", "record");
        let client = reqwest::Client::new();
        let req = endpoint.build_request(&client, b"{}".to_vec()).unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().as_str(), "http://localhost:9200/metrics/record");
    }
}
