use std::sync::Arc;

use tracing::{info, warn};

use crate::game::player::Player;
use crate::net::client::ClientHandle;
use crate::net::protocol::Msg;
use crate::states::in_game::InGame;
use crate::states::{ClientState, Transition};

const MAX_NAME_CHARS: usize = 16;

/// Registered but not playing
///
/// Relays everything: the client's own messages go to the hub for broadcast,
/// messages from other connections go down to the client.
pub struct Connected;

impl ClientState for Connected {
    fn name(&self) -> &'static str {
        "Connected"
    }

    fn on_enter(&mut self, client: &Arc<ClientHandle>) {
        client.socket_send(Msg::Id { id: client.id() });
    }

    fn handle_message(&mut self, client: &Arc<ClientHandle>, sender_id: u64, msg: Msg) -> Transition {
        if sender_id != client.id() {
            client.socket_send_as(msg, sender_id);
            return None;
        }

        match msg {
            Msg::Join { user_id, name } => join(client, &user_id, &name),
            msg => {
                client.broadcast(msg);
                None
            }
        }
    }
}

fn join(client: &Arc<ClientHandle>, user_id: &str, name: &str) -> Transition {
    let Some(name) = sanitize_name(name) else {
        warn!("Rejecting join with an empty name");
        return None;
    };

    match client.hub().store().create_or_fetch(user_id, &name) {
        Ok(record) => {
            match client.hub().store().rank(record.id) {
                Ok(rank) => info!("Player '{}' joined (record {}, rank {})", record.name, record.id, rank),
                Err(_) => info!("Player '{}' joined (record {})", record.name, record.id),
            }
            let player = Player::new(client.id(), record.name, record.id, record.best_score);
            Some(Box::new(InGame::new(player)))
        }
        Err(e) => {
            warn!("Could not load player record for '{}': {}", user_id, e);
            None
        }
    }
}

/// Trim, strip control and markup characters, collapse whitespace, cap length
pub fn sanitize_name(raw: &str) -> Option<String> {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| *c != '<' && *c != '>' && *c != '&')
        .take(MAX_NAME_CHARS)
        .collect();

    let name = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
