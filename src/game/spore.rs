use tokio::time::Instant;

use crate::game::player::{LifeId, Player, PlayerId};
use crate::util::registry::EntityId;
use crate::util::vec2::Vec2;

pub type SporeId = EntityId;

/// A resource node; immutable once placed
#[derive(Debug, Clone)]
pub struct Spore {
    pub position: Vec2,
    pub radius: f64,
    /// Player that dropped it; `None` for world-seeded spores
    pub dropped_by: Option<PlayerId>,
    /// Life of the dropper at drop time; 0 for world-seeded spores
    pub dropper_life: LifeId,
    pub dropped_at: Instant,
}

impl Spore {
    pub fn seeded(position: Vec2, radius: f64) -> Self {
        Self {
            position,
            radius,
            dropped_by: None,
            dropper_life: 0,
            dropped_at: Instant::now(),
        }
    }

    pub fn dropped(position: Vec2, radius: f64, by: &Player, at: Instant) -> Self {
        Self {
            position,
            radius,
            dropped_by: Some(by.id),
            dropper_life: by.life,
            dropped_at: at,
        }
    }
}
