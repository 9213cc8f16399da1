use serde::{Deserialize, Serialize};

use crate::game::player::{Player, PlayerId};
use crate::game::spore::{Spore, SporeId};

/// Envelope for every message on the wire, in both directions
///
/// A `sender_id` of 0 from a client means "sent by this connection".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sender_id: u64,
    pub msg: Msg,
}

impl Packet {
    pub fn new(sender_id: u64, msg: Msg) -> Self {
        Self { sender_id, msg }
    }
}

/// Message payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    /// Tells a client its connection id
    Id { id: u64 },
    /// Enter the game as the given user
    Join { user_id: String, name: String },
    Chat { text: String },
    /// Full state of one player
    Player(PlayerState),
    /// New heading for the sender's own player
    PlayerDirection { direction: f64 },
    /// A spore appeared
    Spore(SporeState),
    /// Several spores at once, used for the initial world stream
    SporeBatch { spores: Vec<SporeState> },
    /// The sender's player ate this spore
    SporeConsumed { spore_id: SporeId },
    /// The sender's player ate this player
    PlayerConsumed { player_id: PlayerId },
    /// The sender left the game
    Disconnect { reason: String },
}

impl Msg {
    pub fn player(player: &Player) -> Self {
        Msg::Player(PlayerState::from_player(player))
    }

    pub fn spore(id: SporeId, spore: &Spore) -> Self {
        Msg::Spore(SporeState::from_spore(id, spore))
    }

    pub fn spore_batch<'a, I>(spores: I) -> Self
    where
        I: IntoIterator<Item = (SporeId, &'a Spore)>,
    {
        Msg::SporeBatch {
            spores: spores
                .into_iter()
                .map(|(id, spore)| SporeState::from_spore(id, spore))
                .collect(),
        }
    }

    /// Variant name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Id { .. } => "Id",
            Msg::Join { .. } => "Join",
            Msg::Chat { .. } => "Chat",
            Msg::Player(_) => "Player",
            Msg::PlayerDirection { .. } => "PlayerDirection",
            Msg::Spore(_) => "Spore",
            Msg::SporeBatch { .. } => "SporeBatch",
            Msg::SporeConsumed { .. } => "SporeConsumed",
            Msg::PlayerConsumed { .. } => "PlayerConsumed",
            Msg::Disconnect { .. } => "Disconnect",
        }
    }
}

/// Player snapshot for network transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub direction: f64,
    pub speed: f64,
}

impl PlayerState {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            x: player.position.x,
            y: player.position.y,
            radius: player.radius,
            direction: player.direction,
            speed: player.speed,
        }
    }
}

/// Spore snapshot for network transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SporeState {
    pub id: SporeId,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl SporeState {
    pub fn from_spore(id: SporeId, spore: &Spore) -> Self {
        Self {
            id,
            x: spore.position.x,
            y: spore.position.y,
            radius: spore.radius,
        }
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_packet_chat() {
        let packet = Packet::new(3, Msg::Chat { text: "hello".to_string() });
        let encoded = encode(&packet).unwrap();
        let decoded: Packet = decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_player_state_from_player() {
        let mut player = Player::new(5, "alice".to_string(), 1, 0);
        player.position = Vec2::new(10.0, -20.0);
        player.direction = 1.25;

        match Msg::player(&player) {
            Msg::Player(state) => {
                assert_eq!(state.id, 5);
                assert_eq!(state.name, "alice");
                assert_eq!(state.x, 10.0);
                assert_eq!(state.y, -20.0);
                assert_eq!(state.direction, 1.25);
                assert_eq!(state.radius, player.radius);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_spore_batch() {
        let a = Spore::seeded(Vec2::new(1.0, 2.0), 8.0);
        let b = Spore::seeded(Vec2::new(3.0, 4.0), 9.0);
        let msg = Msg::spore_batch([(1, &a), (2, &b)]);

        let encoded = encode(&Packet::new(1, msg)).unwrap();
        let decoded: Packet = decode(&encoded).unwrap();
        match decoded.msg {
            Msg::SporeBatch { spores } => {
                assert_eq!(spores.len(), 2);
                assert_eq!(spores[0].id, 1);
                assert_eq!(spores[1].radius, 9.0);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_zero_sender_survives_encoding() {
        let packet = Packet::new(0, Msg::PlayerDirection { direction: 0.5 });
        let decoded: Packet = decode(&encode(&packet).unwrap()).unwrap();
        assert_eq!(decoded.sender_id, 0);
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<Packet, _> = decode(&[0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(result.is_err());
    }

    #[test]
    fn test_kind() {
        assert_eq!(Msg::SporeConsumed { spore_id: 1 }.kind(), "SporeConsumed");
        assert_eq!(Msg::Id { id: 1 }.kind(), "Id");
    }
}
