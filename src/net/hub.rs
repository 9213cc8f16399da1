//! Central coordinator
//!
//! The hub loop is the only writer of the client registry and the single point
//! where broadcasts are fanned out. Connections talk to it through `HubHandle`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::game::world::World;
use crate::metrics::Metrics;
use crate::net::client::ClientHandle;
use crate::net::protocol::Packet;
use crate::store::PlayerStore;
use crate::util::registry::Registry;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
}

struct Registration {
    client: Arc<ClientHandle>,
    reply: oneshot::Sender<u64>,
}

/// Cloneable access to the hub and the state it owns
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<u64>,
    broadcast_tx: mpsc::UnboundedSender<Packet>,
    clients: Arc<Registry<Arc<ClientHandle>>>,
    world: Arc<World>,
    store: Arc<dyn PlayerStore>,
    config: Arc<ServerConfig>,
    metrics: Arc<Metrics>,
}

impl HubHandle {
    /// Register a connection and wait for its id
    pub async fn register(&self, client: Arc<ClientHandle>) -> Result<u64, HubError> {
        let (reply, id) = oneshot::channel();
        self.register_tx
            .send(Registration { client, reply })
            .map_err(|_| HubError::Closed)?;
        id.await.map_err(|_| HubError::Closed)
    }

    pub fn unregister(&self, id: u64) {
        if self.unregister_tx.send(id).is_err() {
            debug!("Hub stopped, dropping unregister for {}", id);
        }
    }

    /// Deliver `packet` to every connection except its sender
    pub fn broadcast(&self, packet: Packet) {
        if self.broadcast_tx.send(packet).is_err() {
            debug!("Hub stopped, dropping broadcast");
        }
    }

    pub fn clients(&self) -> &Registry<Arc<ClientHandle>> {
        &self.clients
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

pub struct Hub {
    handle: HubHandle,
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<u64>,
    broadcast_rx: mpsc::UnboundedReceiver<Packet>,
}

impl Hub {
    pub fn new(config: ServerConfig, store: Arc<dyn PlayerStore>, metrics: Arc<Metrics>) -> Self {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            clients: Arc::new(Registry::new()),
            world: Arc::new(World::new()),
            store,
            config: Arc::new(config),
            metrics,
        };

        Self {
            handle,
            register_rx,
            unregister_rx,
            broadcast_rx,
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Place the initial spore pool
    pub fn seed_world(&self) {
        let count = self.handle.config.max_spores;
        info!("Placing {} spores", count);
        self.handle.world.seed_spores(&mut rand::thread_rng(), count);
        self.handle
            .metrics
            .spores_active
            .store(self.handle.world.spores.len() as u64, Ordering::Relaxed);
    }

    /// Seed the world, then serve registrations and broadcasts forever
    pub async fn run(mut self) {
        self.seed_world();
        info!("Hub running");

        loop {
            tokio::select! {
                Some(registration) = self.register_rx.recv() => self.on_register(registration),
                Some(id) = self.unregister_rx.recv() => self.on_unregister(id),
                Some(packet) = self.broadcast_rx.recv() => self.on_broadcast(packet),
                else => break,
            }
        }

        info!("Hub stopped");
    }

    fn on_register(&self, Registration { client, reply }: Registration) {
        let id = self.handle.clients.insert(client.clone(), None);
        client.initialize(id);

        if reply.send(id).is_err() {
            // Connection went away before learning its id
            self.handle.clients.remove(id);
            return;
        }

        Metrics::incr(&self.handle.metrics.connections_active);
        info!("Client {} registered", id);
    }

    fn on_unregister(&self, id: u64) {
        if self.handle.clients.remove(id).is_some() {
            Metrics::decr(&self.handle.metrics.connections_active);
            info!("Client {} unregistered", id);
        }
    }

    fn on_broadcast(&self, packet: Packet) {
        Metrics::incr(&self.handle.metrics.broadcasts);
        self.handle.clients.for_each(|id, client| {
            if id != packet.sender_id {
                client.process_message(packet.clone());
            }
        });
    }
}

/// Running hub with an empty world and an in-memory store
#[cfg(test)]
pub(crate) fn test_hub() -> HubHandle {
    test_hub_with(ServerConfig {
        max_spores: 0,
        ..Default::default()
    })
}

#[cfg(test)]
pub(crate) fn test_hub_with(config: ServerConfig) -> HubHandle {
    let hub = Hub::new(
        config,
        Arc::new(crate::store::MemoryStore::new()),
        Arc::new(Metrics::new()),
    );
    let handle = hub.handle();
    tokio::spawn(hub.run());
    handle
}
