//! Per-tick movement step and the mass-loss spore drop

use tokio::time::Instant;

use crate::game::constants::{next_radius, player, radius_to_mass, spore};
use crate::game::player::Player;
use crate::game::spore::Spore;

/// Tuning for the spore drop rule
#[derive(Debug, Clone, Copy)]
pub struct DropConfig {
    /// Drop probability per tick is radius / (max_spores * 5)
    pub max_spores: usize,
    /// Ceiling for the per-tick drop probability
    pub max_probability: f64,
}

impl DropConfig {
    pub fn probability(&self, radius: f64) -> f64 {
        let scale = (self.max_spores.max(1) * 5) as f64;
        (radius / scale).clamp(0.0, self.max_probability)
    }
}

/// Radius of a spore dropped by a player of `player_radius`
#[inline]
pub fn drop_radius(player_radius: f64) -> f64 {
    (spore::MIN_RADIUS + player_radius / spore::DROP_RADIUS_DIVISOR).min(spore::MAX_DROP_RADIUS)
}

/// Advance the player one tick and maybe drop a spore
///
/// `roll` is a uniform sample in [0, 1). When a spore is dropped the player
/// loses exactly the spore's mass.
pub fn step(player: &mut Player, dt: f64, roll: f64, config: &DropConfig, now: Instant) -> Option<Spore> {
    player.advance(dt);

    if player.radius <= player::MIN_DROP_RADIUS || roll >= config.probability(player.radius) {
        return None;
    }

    let radius = drop_radius(player.radius);
    let dropped = Spore::dropped(player.position, radius, player, now);
    player.radius = next_radius(player.radius, -radius_to_mass(radius));

    Some(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::tick;

    fn config() -> DropConfig {
        DropConfig {
            max_spores: 1000,
            max_probability: 0.01,
        }
    }

    #[test]
    fn test_probability_scales_with_radius() {
        let c = config();
        assert!((c.probability(25.0) - 0.005).abs() < 1e-12);
        assert!(c.probability(10.0) < c.probability(20.0));
    }

    #[test]
    fn test_probability_ceiling() {
        let c = config();
        assert_eq!(c.probability(10_000.0), 0.01);
    }

    #[test]
    fn test_drop_radius_clamped() {
        assert!((drop_radius(25.0) - 5.5).abs() < 1e-12);
        assert_eq!(drop_radius(5000.0), spore::MAX_DROP_RADIUS);
    }

    #[test]
    fn test_step_without_drop() {
        let mut p = Player::new(1, "p".to_string(), 0, 0);
        let before = p.radius;

        let dropped = step(&mut p, tick::DT, 0.99, &config(), Instant::now());
        assert!(dropped.is_none());
        assert_eq!(p.radius, before);
        assert!((p.position.x - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_step_drop_conserves_mass() {
        let mut p = Player::new(3, "p".to_string(), 0, 0);
        let mass_before = p.mass();

        let dropped = step(&mut p, tick::DT, 0.0, &config(), Instant::now())
            .expect("roll of 0 should drop");

        assert_eq!(dropped.dropped_by, Some(3));
        assert_eq!(dropped.dropper_life, p.life);
        assert_eq!(dropped.position, p.position);
        let total = p.mass() + radius_to_mass(dropped.radius);
        assert!((total - mass_before).abs() < 1e-6);
    }

    #[test]
    fn test_small_player_never_drops() {
        let mut p = Player::new(1, "p".to_string(), 0, 0);
        p.radius = player::MIN_DROP_RADIUS;

        assert!(step(&mut p, tick::DT, 0.0, &config(), Instant::now()).is_none());
        assert_eq!(p.radius, player::MIN_DROP_RADIUS);
    }
}
