//! End-to-end scenarios run entirely in-process, against `LocalBus` and the
//! concrete endpoint drivers' `translate`/`build_request` pair — there is no
//! production bus or live database here (both are explicitly out of scope),
//! so these assert on the bytes and requests a real adapter would ship.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use fluxbridge_core::bus::LocalBus;
use fluxbridge_core::schema::Schema;
use fluxbridge_core::wire::{PackExt, Type, Value};
use fluxbridge_producer::Logger;
use fluxbridge_services::{BatchEndpoint, ElasticsearchEndpoint, Endpoint, InfluxDbEndpoint};

fn telemetry_schema() -> Schema {
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

fn telemetry_values() -> Vec<Value> {
    vec![
        Value::String("bob".into()),
        Value::Int(32),
        Value::Uint(10923145),
        Value::Float(150.0),
        Value::Bin(vec![0x23, 0x47, 0x7f, 0x3c]),
        Value::Bool(true),
    ]
}

#[test]
fn elasticsearch_single_record() -> Result<()> {
    let schema = telemetry_schema();
    let endpoint = ElasticsearchEndpoint::new(schema, "http://localhost:9200", "testdb", "test_type");
    endpoint.init()?;

    let body = endpoint.translate(&telemetry_values())?;
    let parsed: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(
        parsed,
        serde_json::json!({
            "name": "bob",
            "age": 32,
            "id": 10923145,
            "weight": 150,
            "data": "I0d/PA==",
            "is_true": true,
        })
    );

    let client = reqwest::Client::new();
    let request = endpoint.build_request(&client, body)?;
    assert_eq!(request.method(), reqwest::Method::POST);
    assert_eq!(request.url().path(), "/testdb/test_type");
    Ok(())
}

#[test]
fn influxdb_single_record() -> Result<()> {
    let endpoint = InfluxDbEndpoint::new(telemetry_schema(), "http://localhost:8086", "testdb")?;
    endpoint.init()?;

    let body = endpoint.translate(&telemetry_values())?;
    let parsed: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(
        parsed,
        serde_json::json!({
            "name": "bob",
            "columns": ["age", "id", "weight", "data", "is_true"],
            "points": [[32, 10923145, 150.0, "I0d/PA==", true]],
        })
    );
    Ok(())
}

#[test]
fn influxdb_batch_of_ten() -> Result<()> {
    let endpoint = InfluxDbEndpoint::new(telemetry_schema(), "http://localhost:8086", "testdb")?;
    let entry = endpoint.translate(&telemetry_values())?;
    let entries: Vec<Vec<u8>> = std::iter::repeat(entry).take(10).collect();

    let body = endpoint.concat(&entries);
    let text = String::from_utf8(body.clone())?;
    assert!(text.starts_with('['));
    assert!(text.ends_with(']'));

    let parsed: serde_json::Value = serde_json::from_slice(&body)?;
    let array = parsed.as_array().expect("batch body must be a JSON array");
    assert_eq!(array.len(), 10);
    Ok(())
}

#[tokio::test]
async fn producer_to_bus_round_trip_through_schema() -> Result<()> {
    let bus = Arc::new(LocalBus::new());
    let sub = bus.subscription("telemetry").await;
    let logger = Logger::new("telemetry", bus);
    let schema = Arc::new(telemetry_schema());

    logger.send_record(&schema, &telemetry_values()).await?;
    let payload = sub.recv().await.unwrap();
    let decoded = schema.decode_to_slice(&payload)?;
    assert_eq!(decoded, telemetry_values());

    logger.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producer_worker_pool_grows_under_burst_and_settles() -> Result<()> {
    let bus = Arc::new(LocalBus::new());
    let _sub = bus.subscription("telemetry").await;
    let logger = Logger::new("telemetry", bus);

    // Fire all 200 sends concurrently rather than one at a time: that's what
    // actually floods the bounded queue and forces `add_worker` to spin up
    // more than the one persistent worker. A sequential, awaited-one-by-one
    // loop lets the first worker keep draining as fast as it's fed and never
    // exercises growth at all.
    let senders: Vec<_> = (0..200u32)
        .map(|i| {
            let logger = logger.clone();
            tokio::spawn(async move { logger.send_bytes(i.to_be_bytes().to_vec()).await })
        })
        .collect();

    let sampler = {
        let logger = logger.clone();
        tokio::spawn(async move {
            let mut peak = 0usize;
            for _ in 0..500 {
                peak = peak.max(logger.workers());
                tokio::time::sleep(Duration::from_micros(200)).await;
            }
            peak
        })
    };

    for sender in senders {
        sender.await?;
    }
    let peak_workers = sampler.await?;

    assert!(
        (2..=8).contains(&peak_workers),
        "pool never grew past the first worker: peak {peak_workers}"
    );

    logger.close().await;
    assert_eq!(logger.workers(), 0);
    Ok(())
}

#[tokio::test]
async fn logger_close_under_backpressure_does_not_hang() -> Result<()> {
    let bus = Arc::new(LocalBus::new());
    // No subscriber: every publish still succeeds (LocalBus treats
    // zero-subscriber publish as a no-op success), so this exercises the
    // queue-filling/close path without relying on a consumer keeping up.
    let logger = Logger::new("telemetry", bus);

    for i in 0..300u32 {
        logger.send_bytes(i.to_be_bytes().to_vec()).await;
    }

    let closed = tokio::time::timeout(Duration::from_secs(5), logger.close()).await;
    assert!(closed.is_ok(), "close() did not return within the expected bound");
    assert!(logger.is_closed());

    logger.send_bytes(b"dropped".to_vec()).await; // must not panic or block
    Ok(())
}

#[test]
fn ext_field_round_trips_through_schema_and_json() -> Result<()> {
    let schema = Schema::from_pairs([("tag", Type::Ext)]).unwrap();
    let values = vec![Value::Ext(PackExt {
        extension_type: 7,
        data: vec![0xde, 0xad],
    })];

    let encoded = schema.encode_tuple(&values)?;
    let decoded = schema.decode_to_slice(&encoded)?;
    assert_eq!(decoded, values);

    let json = schema.render_json(&values)?;
    assert_eq!(json["tag"]["extension_type"], serde_json::Value::from(7));
    assert_eq!(json["tag"]["data"], serde_json::Value::from("3q0="));
    Ok(())
}
