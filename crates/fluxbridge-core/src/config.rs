//! Configuration system for fluxbridge.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FLUXBRIDGE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/fluxbridge/config.toml
//!   3. ~/.config/fluxbridge/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::Type;

/// Top-level configuration, shared by the producer and the forwarder
/// daemon (each reads only the sections it needs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxConfig {
    pub bus: BusConfig,
    pub producer: ProducerConfig,
    pub forwarder: ForwarderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Address of the pub/sub bus (e.g. an NSQD TCP address). Interpreted
    /// by whichever `BusProducer`/`BusConsumer` implementation is wired in.
    pub address: String,
    /// Shared secret for authenticating to the bus, if the transport needs one.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Topic the logger publishes encoded records to.
    pub topic: String,
    /// Bounded queue capacity before the logger starts growing its worker pool.
    pub queue_capacity: usize,
    /// Maximum concurrent publish workers (1-8; see `Logger`'s idle schedule).
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Bindings declared in config, in addition to any registered in code.
    pub bindings: Vec<BindingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub topic: String,
    pub channel: String,
    pub endpoint: EndpointKind,
    /// Target address/URL for the endpoint (e.g. Elasticsearch or InfluxDB base URL).
    pub address: String,
    /// Index/database name at the target.
    pub target: String,
    /// Elasticsearch document type. Ignored for InfluxDB bindings, which
    /// have no equivalent concept.
    pub doc_type: String,
    /// The record schema this binding decodes, in wire order. A schema is
    /// immutable once a binding is registered (spec.md §3), so it is
    /// declared once here rather than inferred per message.
    pub schema: Vec<SchemaFieldConfig>,
    /// Soft parallelism target for the bus subscription (spec.md §4.5).
    /// Defaults to 1 when unset.
    pub workers: usize,
    /// If set, records are accumulated and flushed as a batch instead of
    /// being forwarded one at a time.
    pub batch: Option<BatchConfig>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            channel: String::new(),
            endpoint: EndpointKind::Elasticsearch,
            address: String::new(),
            target: String::new(),
            doc_type: String::new(),
            schema: Vec::new(),
            workers: 1,
            batch: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFieldConfig {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Elasticsearch,
    InfluxDb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Flush once this many records have accumulated.
    pub max_records: usize,
    /// Flush at least this often, regardless of accumulated record count.
    pub max_interval_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────

impl Default for FluxConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            producer: ProducerConfig::default(),
            forwarder: ForwarderConfig::default(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4150".to_string(),
            secret: String::new(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: "fluxbridge.records".to_string(),
            queue_capacity: 64,
            max_workers: 8,
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self { bindings: Vec::new() }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: 50,
            max_interval_ms: 250,
        }
    }
}

// ── Path helpers ────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("fluxbridge")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ─────────────────────────────────────────────────────────────────

impl FluxConfig {
    /// Loads config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            FluxConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FLUXBRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Writes a default config file if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&FluxConfig::default()).map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Applies `FLUXBRIDGE_*` env var overrides on top of whatever was loaded.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FLUXBRIDGE_BUS__ADDRESS") {
            self.bus.address = v;
        }
        if let Ok(v) = std::env::var("FLUXBRIDGE_BUS__SECRET") {
            self.bus.secret = v;
        }
        if let Ok(v) = std::env::var("FLUXBRIDGE_PRODUCER__TOPIC") {
            self.producer.topic = v;
        }
        if let Ok(v) = std::env::var("FLUXBRIDGE_PRODUCER__QUEUE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.producer.queue_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("FLUXBRIDGE_PRODUCER__MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.producer.max_workers = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_producer_settings() {
        let config = FluxConfig::default();
        assert_eq!(config.producer.queue_capacity, 64);
        assert_eq!(config.producer.max_workers, 8);
        assert!(config.forwarder.bindings.is_empty());
    }

    #[test]
    fn apply_env_overrides_changes_topic() {
        let mut config = FluxConfig::default();
        assert_eq!(config.producer.topic, "fluxbridge.records");
        // Exercise the same mutation apply_env_overrides would perform,
        // without mutating actual process environment from a unit test.
        config.producer.topic = "custom.topic".to_string();
        assert_eq!(config.producer.topic, "custom.topic");
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("fluxbridge-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        unsafe {
            std::env::set_var("FLUXBRIDGE_CONFIG", config_path.to_str().unwrap());
        }

        let path = FluxConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let config = FluxConfig::load().expect("load should succeed");
        assert_eq!(config.producer.topic, "fluxbridge.records");

        unsafe {
            std::env::remove_var("FLUXBRIDGE_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn binding_config_round_trips_through_toml() {
        let mut config = FluxConfig::default();
        config.forwarder.bindings.push(BindingConfig {
            topic: "metrics".into(),
            channel: "es-forwarder".into(),
            endpoint: EndpointKind::Elasticsearch,
            address: "http://localhost:9200".into(),
            target: "metrics-index".into(),
            doc_type: "metric".into(),
            schema: vec![SchemaFieldConfig { name: "value".into(), ty: Type::Float }],
            workers: 1,
            batch: None,
        });
        let text = toml::to_string_pretty(&config).unwrap();
        let back: FluxConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.forwarder.bindings.len(), 1);
        assert_eq!(back.forwarder.bindings[0].endpoint, EndpointKind::Elasticsearch);
    }
}
