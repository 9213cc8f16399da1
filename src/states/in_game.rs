//! Spawned and playing
//!
//! The server keeps its own copy of the player, advances it on a fixed tick once
//! the client starts steering, and only accepts consumption claims that hold up
//! against the shared world.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use crate::anticheat::validator::ClaimValidator;
use crate::game::constants::{next_radius, radius_to_mass, tick};
use crate::game::player::{Player, PlayerId, SharedPlayer};
use crate::game::simulation::{self, DropConfig};
use crate::game::spawn::spawn_coords;
use crate::game::spore::SporeId;
use crate::metrics::Metrics;
use crate::net::client::ClientHandle;
use crate::net::protocol::Msg;
use crate::states::connected::Connected;
use crate::states::{ClientState, Transition};

pub struct InGame {
    player: SharedPlayer,
    validator: ClaimValidator,
    /// Movement tick, started by the first own direction message
    ticker: Option<JoinHandle<()>>,
    spore_stream: Option<JoinHandle<()>>,
}

impl InGame {
    pub fn new(player: Player) -> Self {
        Self {
            player: player.into_shared(),
            validator: ClaimValidator::default(),
            ticker: None,
            spore_stream: None,
        }
    }

    pub fn player(&self) -> &SharedPlayer {
        &self.player
    }

    fn handle_direction(&mut self, client: &Arc<ClientHandle>, sender_id: u64, direction: f64) {
        if sender_id != client.id() {
            return;
        }
        if !direction.is_finite() {
            debug!("Ignoring non-finite direction");
            return;
        }

        self.player.lock().direction = direction;

        if self.ticker.is_none() {
            let task = movement_loop(client.clone(), self.player.clone());
            self.ticker = Some(tokio::spawn(task.instrument(client.span().clone())));
        }
    }

    fn handle_spore_consumed(&mut self, client: &Arc<ClientHandle>, sender_id: u64, spore_id: SporeId) {
        let msg = Msg::SporeConsumed { spore_id };
        if sender_id != client.id() {
            client.socket_send_as(msg, sender_id);
            return;
        }

        let world = client.hub().world();
        let metrics = client.hub().metrics();
        let spore = world.spores.get(spore_id);

        let verdict = {
            let player = self.player.lock();
            self.validator
                .validate_spore_claim(&player, spore_id, spore.as_deref(), Instant::now())
        };
        if let Err(e) = verdict {
            Metrics::incr(&metrics.claims_rejected);
            debug!("Could not verify spore consumption: {}", e);
            return;
        }

        // Whoever removes the spore first gets it
        let Some(spore) = world.spores.remove(spore_id) else {
            Metrics::incr(&metrics.claims_rejected);
            debug!("Spore {} was consumed by someone else first", spore_id);
            return;
        };
        metrics.spores_active.store(world.spores.len() as u64, Ordering::Relaxed);
        Metrics::incr(&metrics.claims_accepted);

        {
            let mut player = self.player.lock();
            player.radius = next_radius(player.radius, radius_to_mass(spore.radius));
        }

        client.broadcast(msg);
        self.sync_best_score(client);
    }

    fn handle_player_consumed(
        &mut self,
        client: &Arc<ClientHandle>,
        sender_id: u64,
        target_id: PlayerId,
    ) -> Transition {
        let msg = Msg::PlayerConsumed { player_id: target_id };

        if sender_id != client.id() {
            client.socket_send_as(msg, sender_id);

            if target_id == client.id() && !self.still_registered(client) {
                info!("Player was consumed by {}, respawning", sender_id);
                let fresh = self.player.lock().respawned();
                return Some(Box::new(InGame::new(fresh)));
            }
            return None;
        }

        let world = client.hub().world();
        let metrics = client.hub().metrics();

        // Copy the target out before locking our own player
        let target = world.players.get(target_id).map(|p| p.lock().clone());

        let verdict = {
            let player = self.player.lock();
            self.validator
                .validate_player_claim(&player, target_id, target.as_ref())
        };
        let target = match (verdict, target) {
            (Ok(()), Some(target)) => target,
            (Err(e), _) => {
                Metrics::incr(&metrics.claims_rejected);
                debug!("Could not verify player consumption: {}", e);
                return None;
            }
            (Ok(()), None) => return None,
        };

        if world.players.remove(target_id).is_none() {
            Metrics::incr(&metrics.claims_rejected);
            debug!("Player {} left before being consumed", target_id);
            return None;
        }
        metrics.players_active.store(world.players.len() as u64, Ordering::Relaxed);
        Metrics::incr(&metrics.claims_accepted);

        {
            let mut player = self.player.lock();
            player.radius = next_radius(player.radius, target.mass());
        }

        client.broadcast(msg);
        self.sync_best_score(client);
        None
    }

    /// Whether the registry still holds this life's player
    fn still_registered(&self, client: &Arc<ClientHandle>) -> bool {
        client
            .hub()
            .world()
            .players
            .get(client.id())
            .is_some_and(|p| Arc::ptr_eq(&p, &self.player))
    }

    /// Flush the score to the store if it beats the best
    fn sync_best_score(&self, client: &Arc<ClientHandle>) {
        let (record_id, improved) = {
            let mut player = self.player.lock();
            (player.record_id, player.improve_best_score())
        };
        let Some(best) = improved else {
            return;
        };

        let store = client.hub().store().clone();
        let span = client.span().clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.update_best_score(record_id, best) {
                warn!(parent: &span, "Error updating the player best score: {}", e);
            }
        });
    }
}

impl ClientState for InGame {
    fn name(&self) -> &'static str {
        "InGame"
    }

    fn on_enter(&mut self, client: &Arc<ClientHandle>) {
        let world = client.hub().world();
        let metrics = client.hub().metrics();

        let radius = self.player.lock().radius;
        let position = spawn_coords(&mut rand::thread_rng(), radius, Some(&world.players), None);
        let snapshot = {
            let mut player = self.player.lock();
            player.position = position;
            player.clone()
        };

        info!("Adding player {} to the world", snapshot.name);
        world.players.insert(self.player.clone(), Some(client.id()));
        metrics.players_active.store(world.players.len() as u64, Ordering::Relaxed);

        client.socket_send(Msg::player(&snapshot));

        let stream = send_initial_spores(client.clone());
        self.spore_stream = Some(tokio::spawn(stream.instrument(client.span().clone())));
    }

    fn handle_message(&mut self, client: &Arc<ClientHandle>, sender_id: u64, msg: Msg) -> Transition {
        let own = sender_id == client.id();

        match msg {
            Msg::Player(_) if own => {
                debug!("Received player message from our own client, ignoring");
            }
            Msg::PlayerDirection { direction } => self.handle_direction(client, sender_id, direction),
            Msg::Chat { .. } if own => client.broadcast(msg),
            Msg::SporeConsumed { spore_id } => self.handle_spore_consumed(client, sender_id, spore_id),
            Msg::PlayerConsumed { player_id } => {
                return self.handle_player_consumed(client, sender_id, player_id);
            }
            Msg::Disconnect { .. } if own => {
                client.broadcast(msg);
                return Some(Box::new(Connected));
            }
            Msg::Player(_) | Msg::Chat { .. } | Msg::Spore(_) | Msg::Disconnect { .. } => {
                client.socket_send_as(msg, sender_id);
            }
            other => debug!("Ignoring {} while in game", other.kind()),
        }

        None
    }

    fn on_exit(&mut self, client: &Arc<ClientHandle>) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(stream) = self.spore_stream.take() {
            stream.abort();
        }

        let world = client.hub().world();
        world.players.remove(client.id());
        client
            .hub()
            .metrics()
            .players_active
            .store(world.players.len() as u64, Ordering::Relaxed);

        self.sync_best_score(client);
    }
}

/// Advance the player every tick until aborted
async fn movement_loop(client: Arc<ClientHandle>, player: SharedPlayer) {
    let period = Duration::from_millis(tick::DURATION_MS);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let config = client.hub().config();
    let drop_config = DropConfig {
        max_spores: config.max_spores,
        max_probability: config.max_drop_probability,
    };
    let metrics = client.hub().metrics().clone();

    loop {
        ticker.tick().await;
        let started = std::time::Instant::now();

        let roll = rand::thread_rng().gen::<f64>();
        let (dropped, update) = {
            let mut player = player.lock();
            let dropped = simulation::step(&mut player, tick::DT, roll, &drop_config, Instant::now());
            (dropped, Msg::player(&player))
        };

        if let Some(spore) = dropped {
            let spores = &client.hub().world().spores;
            let spore = Arc::new(spore);
            let spore_id = spores.insert(spore.clone(), None);
            metrics.spores_active.store(spores.len() as u64, Ordering::Relaxed);

            let msg = Msg::spore(spore_id, &spore);
            client.broadcast(msg.clone());
            client.socket_send(msg);
        }

        client.broadcast(update.clone());
        client.socket_send(update);

        metrics.record_tick_time(started.elapsed());
    }
}

/// Stream the current spores to the client in batches
async fn send_initial_spores(client: Arc<ClientHandle>) {
    let config = client.hub().config();
    let batch_size = config.spore_batch_size.max(1);
    let delay = config.spore_batch_delay;

    let spores = client.hub().world().spores.snapshot();
    let mut batches = spores.chunks(batch_size).peekable();

    while let Some(batch) = batches.next() {
        let msg = Msg::spore_batch(batch.iter().map(|(id, spore)| (*id, spore.as_ref())));
        client.socket_send(msg);

        if batches.peek().is_some() {
            time::sleep(delay).await;
        }
    }
}
