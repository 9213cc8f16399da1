use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::game::constants::{player, radius_to_mass, score_for_radius};
use crate::util::registry::EntityId;
use crate::util::vec2::Vec2;

/// Player id, always equal to the owning connection's id
pub type PlayerId = EntityId;

/// Player as stored in the shared registry; the owning connection mutates it,
/// every other connection reads it during validation and spawn placement.
pub type SharedPlayer = Arc<Mutex<Player>>;

/// Distinguishes successive lives of the same player id; starts at 1
pub type LifeId = u64;

static NEXT_LIFE: AtomicU64 = AtomicU64::new(1);

/// A spawned player
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    /// Fresh for every spawn, including respawns under the same id
    pub life: LifeId,
    pub name: String,
    pub position: Vec2,
    /// Heading in radians
    pub direction: f64,
    /// World units per second
    pub speed: f64,
    /// Collision size; mass is derived from it
    pub radius: f64,
    /// Best score known to the store
    pub best_score: i64,
    /// Id of the persisted player record
    pub record_id: i64,
}

impl Player {
    pub fn new(id: PlayerId, name: String, record_id: i64, best_score: i64) -> Self {
        Self {
            id,
            life: NEXT_LIFE.fetch_add(1, Ordering::Relaxed),
            name,
            position: Vec2::ZERO,
            direction: 0.0,
            speed: player::DEFAULT_SPEED,
            radius: player::DEFAULT_RADIUS,
            best_score,
            record_id,
        }
    }

    /// Fresh copy at initial conditions, keeping identity, name and record
    pub fn respawned(&self) -> Self {
        Self::new(self.id, self.name.clone(), self.record_id, self.best_score)
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        radius_to_mass(self.radius)
    }

    #[inline]
    pub fn score(&self) -> i64 {
        score_for_radius(self.radius)
    }

    /// Move along the current heading for `dt` seconds
    pub fn advance(&mut self, dt: f64) {
        self.position += Vec2::from_angle(self.direction) * (self.speed * dt);
    }

    /// Record the current score if it beats the best; returns the new best
    pub fn improve_best_score(&mut self) -> Option<i64> {
        let score = self.score();
        if score > self.best_score {
            self.best_score = score;
            Some(score)
        } else {
            None
        }
    }

    pub fn into_shared(self) -> SharedPlayer {
        Arc::new(Mutex::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_new_player_defaults() {
        let p = Player::new(7, "alice".to_string(), 3, 0);
        assert_eq!(p.id, 7);
        assert_eq!(p.radius, player::DEFAULT_RADIUS);
        assert_eq!(p.speed, player::DEFAULT_SPEED);
        assert_eq!(p.record_id, 3);
    }

    #[test]
    fn test_advance() {
        let mut p = Player::new(1, "p".to_string(), 0, 0);
        p.direction = PI / 2.0;
        p.advance(0.05);
        assert!(p.position.x.abs() < 1e-9);
        assert!((p.position.y - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_respawned_keeps_identity() {
        let mut p = Player::new(4, "bob".to_string(), 9, 500);
        p.radius = 80.0;
        p.position = Vec2::new(10.0, 10.0);

        let fresh = p.respawned();
        assert_eq!(fresh.id, 4);
        assert_eq!(fresh.name, "bob");
        assert_eq!(fresh.record_id, 9);
        assert_eq!(fresh.best_score, 500);
        assert_eq!(fresh.radius, player::DEFAULT_RADIUS);
        assert_eq!(fresh.position, Vec2::ZERO);
        assert_ne!(fresh.life, p.life);
    }

    #[test]
    fn test_improve_best_score() {
        let mut p = Player::new(1, "p".to_string(), 0, 5000);
        assert_eq!(p.improve_best_score(), None);

        p.radius = 50.0;
        let best = p.improve_best_score();
        assert_eq!(best, Some(score_for_radius(50.0)));
        assert_eq!(p.best_score, score_for_radius(50.0));
        assert_eq!(p.improve_best_score(), None);
    }
}
