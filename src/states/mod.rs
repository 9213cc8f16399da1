//! Protocol states
//!
//! A connection is in exactly one state at a time. The state decides what every
//! inbound packet means, whether it came from the client itself or was relayed by
//! the hub from another connection.

use std::sync::Arc;

use tracing::debug;

use crate::net::client::ClientHandle;
use crate::net::protocol::Msg;

pub mod connected;
pub mod in_game;

/// State to switch to after handling a message
pub type Transition = Option<Box<dyn ClientState>>;

pub trait ClientState: Send {
    fn name(&self) -> &'static str;

    fn on_enter(&mut self, _client: &Arc<ClientHandle>) {}

    /// Handle one packet; `sender_id` equals `client.id()` for the client's own messages
    fn handle_message(&mut self, client: &Arc<ClientHandle>, sender_id: u64, msg: Msg) -> Transition;

    fn on_exit(&mut self, _client: &Arc<ClientHandle>) {}
}

/// Exit `current`, then enter `next`
pub fn transition(
    client: &Arc<ClientHandle>,
    mut current: Box<dyn ClientState>,
    mut next: Box<dyn ClientState>,
) -> Box<dyn ClientState> {
    current.on_exit(client);
    debug!("Switching from {} to {}", current.name(), next.name());
    next.on_enter(client);
    next
}
