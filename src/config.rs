use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::game::constants::{net, world};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Spores seeded at startup; also scales the drop probability
    pub max_spores: usize,
    /// Pending outbound messages per connection before new ones are dropped
    pub outbound_queue_capacity: usize,
    /// Spores per batch when streaming the world to a new player
    pub spore_batch_size: usize,
    /// Pause between those batches
    pub spore_batch_delay: Duration,
    /// Ceiling for the per-tick spore drop probability
    pub max_drop_probability: f64,
    /// Port of the Prometheus metrics endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file
    pub tls_key_path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("max_drop_probability must be within [0, 1], got {0}")]
    Probability(f64),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            max_spores: world::MAX_SPORES,
            outbound_queue_capacity: net::OUTBOUND_QUEUE_CAPACITY,
            spore_batch_size: net::SPORE_BATCH_SIZE,
            spore_batch_delay: Duration::from_millis(net::SPORE_BATCH_DELAY_MS),
            max_drop_probability: 0.01,
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Some(port) = parse_var::<u16>("PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }

        if let Some(max_spores) = parse_var::<usize>("MAX_SPORES") {
            if max_spores <= 100_000 {
                config.max_spores = max_spores;
            } else {
                tracing::warn!("MAX_SPORES must be 0-100000, using default");
            }
        }

        if let Some(capacity) = parse_var::<usize>("OUTBOUND_QUEUE") {
            if capacity > 0 {
                config.outbound_queue_capacity = capacity;
            } else {
                tracing::warn!("OUTBOUND_QUEUE must be > 0, using default");
            }
        }

        if let Some(probability) = parse_var::<f64>("MAX_DROP_PROBABILITY") {
            if (0.0..=1.0).contains(&probability) {
                config.max_drop_probability = probability;
            } else {
                tracing::warn!("MAX_DROP_PROBABILITY must be within [0, 1], using default");
            }
        }

        if let Some(port) = parse_var::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }

        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Zero("port"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Zero("outbound_queue_capacity"));
        }
        if self.spore_batch_size == 0 {
            return Err(ConfigError::Zero("spore_batch_size"));
        }
        if !(0.0..=1.0).contains(&self.max_drop_probability) {
            return Err(ConfigError::Probability(self.max_drop_probability));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}
