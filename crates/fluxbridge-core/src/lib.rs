//! fluxbridge-core — wire codec, schema, bus boundary, and configuration
//! shared by the producer and the forwarder daemon.

pub mod bus;
pub mod config;
pub mod encoder;
pub mod schema;
pub mod wire;

pub use bus::{BusConsumer, BusConsumerFactory, BusError, BusProducer, LocalBus};
pub use config::FluxConfig;
pub use encoder::{BytesEncoder, Encoder, SchemaEncoder};
pub use schema::{render_value_json, Schema, SchemaError};
pub use wire::{CodecError, PackExt, Type, Value};
