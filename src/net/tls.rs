use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

use crate::config::ServerConfig;

// Written by scripts/gen-dev-cert.rs
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// TLS configuration for WebTransport server
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate (for browser flag)
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load the configured certificate, falling back to the dev certificate in certs/
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) {
            info!("Loading TLS certificate from {}", cert_path);
            return Self::load_from_paths(cert_path, key_path).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await
        } else {
            Err(anyhow!(
                "TLS certificate not found.\n\n\
                For development: run `cargo run --manifest-path scripts/Cargo.toml` to generate certs/.\n\
                For production: set TLS_CERT_PATH and TLS_KEY_PATH."
            ))
        }
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = compute_cert_hash(&identity);
        info!("Certificate hash: {}", cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    pub fn get_cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

fn compute_cert_hash(identity: &Identity) -> String {
    identity
        .certificate_chain()
        .as_slice()
        .first()
        .map(|cert| hash_der(cert.der()))
        .unwrap_or_default()
}

fn hash_der(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}
