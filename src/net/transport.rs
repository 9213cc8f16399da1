//! WebTransport server implementation
//!
//! Each accepted session opens one bidirectional stream, which carries the
//! length-prefixed packet stream for that connection.

use std::net::SocketAddr;

use tracing::{debug, info, warn};
use wtransport::endpoint::IncomingSession;
use wtransport::Endpoint;

use crate::net::client;
use crate::net::hub::HubHandle;
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    tls_config: TlsConfig,
    hub: HubHandle,
}

impl WebTransportServer {
    /// Load TLS material and prepare to accept connections
    pub async fn new(hub: HubHandle) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(hub.config()).await?;
        Ok(Self { tls_config, hub })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.get_cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        let config = self.hub.config();
        SocketAddr::new(config.bind_address, config.port)
    }

    /// Accept connections until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr();
        let builder = wtransport::ServerConfig::builder();
        // Unspecified address binds dual-stack (IPv4 + IPv6)
        let builder = if addr.ip().is_unspecified() {
            builder.with_bind_default(addr.port())
        } else {
            builder.with_bind_address(addr)
        };
        let server_config = builder.with_identity(self.tls_config.identity).build();

        let server = Endpoint::server(server_config)?;
        info!("WebTransport server listening on {}", addr);

        loop {
            let incoming = server.accept().await;
            let hub = self.hub.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, hub).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single WebTransport session
async fn handle_connection(incoming: IncomingSession, hub: HubHandle) -> anyhow::Result<()> {
    let session_request = incoming.await?;

    debug!(
        "New connection from: {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (send, recv) = connection.accept_bi().await?;
    debug!("Accepted bidirectional stream");

    let id = client::serve(hub, recv, send).await?;
    debug!("Connection closed (client {})", id);

    Ok(())
}
