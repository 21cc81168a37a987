//! fluxbridge-services — the `Endpoint` trait and concrete database drivers
//! (Elasticsearch, InfluxDB) used by the forwarder daemon, plus the shared
//! buffer pool decoding runs through.

pub mod elasticsearch;
pub mod endpoint;
pub mod influxdb;
pub mod pool;

pub use elasticsearch::ElasticsearchEndpoint;
pub use endpoint::{BatchEndpoint, Endpoint, EndpointError};
pub use influxdb::InfluxDbEndpoint;
pub use pool::BufferPool;
