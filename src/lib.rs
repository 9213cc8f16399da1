//! Spore Arena Server Library
//!
//! Authoritative backend for a real-time multiplayer arena over WebTransport.
//! Connections register with a single hub, run a small protocol state machine,
//! and share one world of players and spores. Every consumption claim a client
//! makes about itself is checked against that world before it is accepted.

pub mod anticheat;
pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod states;
pub mod store;
pub mod util;
