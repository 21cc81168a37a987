//! fluxbridge-forwarderd — consumer-side forwarder daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use fluxbridge_core::bus::{BusConsumerFactory, LocalBus};
use fluxbridge_core::config::{BindingConfig, EndpointKind, FluxConfig};
use fluxbridge_core::schema::Schema;
use fluxbridge_forwarderd::{BatchBinding, Binding, Server};
use fluxbridge_services::{BatchEndpoint, ElasticsearchEndpoint, Endpoint, InfluxDbEndpoint};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=debug cargo run -p fluxbridge-forwarderd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = FluxConfig::load().context("loading fluxbridge config")?;
    if config.forwarder.bindings.is_empty() {
        bail!("no bindings configured; add at least one [[forwarder.bindings]] entry");
    }

    // No production bus adapter ships with this crate (see fluxbridge-core::bus);
    // LocalBus stands in so the daemon can run standalone.
    let bus: Arc<dyn BusConsumerFactory> = Arc::new(LocalBus::new());
    let mut server = Server::new(bus);

    for binding_config in &config.forwarder.bindings {
        register_binding(&mut server, binding_config)?;
    }

    let handle = server.handle();
    let run = tokio::spawn(server.run());

    tokio::select! {
        result = run => {
            result.context("forwarder task panicked")?.context("forwarder server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, stopping forwarder");
            handle.stop();
        }
    }

    Ok(())
}

fn schema_from_config(binding_config: &BindingConfig) -> Result<Schema> {
    Schema::from_pairs(binding_config.schema.iter().map(|field| (field.name.clone(), field.ty)))
        .with_context(|| format!("building schema for binding {}/{}", binding_config.topic, binding_config.channel))
}

fn register_binding(server: &mut Server, binding_config: &BindingConfig) -> Result<()> {
    let schema = schema_from_config(binding_config)?;

    match &binding_config.batch {
        None => {
            let endpoint = build_endpoint(binding_config, schema.clone())?;
            server.register(Binding::new(
                binding_config.topic.clone(),
                binding_config.channel.clone(),
                schema,
                endpoint,
                binding_config.workers,
            ));
        }
        Some(batch_config) => {
            let endpoint = build_batch_endpoint(binding_config, schema.clone())?;
            let batch_binding = BatchBinding::new(
                binding_config.topic.clone(),
                binding_config.channel.clone(),
                schema,
                endpoint,
                binding_config.workers,
            )
            .with_max_batch_messages(batch_config.max_records)
            .with_max_batch_time(Duration::from_millis(batch_config.max_interval_ms));
            server.register_batch(batch_binding);
        }
    }

    Ok(())
}

fn build_endpoint(binding_config: &BindingConfig, schema: Schema) -> Result<Arc<dyn Endpoint>> {
    Ok(match binding_config.endpoint {
        EndpointKind::Elasticsearch => Arc::new(ElasticsearchEndpoint::new(
            schema,
            binding_config.address.clone(),
            binding_config.target.clone(),
            binding_config.doc_type.clone(),
        )),
        EndpointKind::InfluxDb => Arc::new(
            InfluxDbEndpoint::new(schema, binding_config.address.clone(), binding_config.target.clone())
                .with_context(|| format!("configuring influxdb binding {}", binding_config.topic))?,
        ),
    })
}

fn build_batch_endpoint(binding_config: &BindingConfig, schema: Schema) -> Result<Arc<dyn BatchEndpoint>> {
    match binding_config.endpoint {
        EndpointKind::InfluxDb => Ok(Arc::new(
            InfluxDbEndpoint::new(schema, binding_config.address.clone(), binding_config.target.clone())
                .with_context(|| format!("configuring influxdb binding {}", binding_config.topic))?,
        )),
        EndpointKind::Elasticsearch => {
            bail!(
                "binding {} requested batch delivery but the elasticsearch driver does not implement BatchEndpoint",
                binding_config.topic
            )
        }
    }
}
