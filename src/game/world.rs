//! Shared world state: live players and live spores

use std::sync::Arc;

use rand::Rng;

use crate::game::constants::spore;
use crate::game::player::SharedPlayer;
use crate::game::spawn::spawn_coords;
use crate::game::spore::Spore;
use crate::util::registry::Registry;

/// Registries shared by every connection
pub struct World {
    /// Keyed by the owning connection's id
    pub players: Registry<SharedPlayer>,
    pub spores: Registry<Arc<Spore>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            players: Registry::new(),
            spores: Registry::new(),
        }
    }

    /// Place `count` world spores clear of each other
    pub fn seed_spores<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) {
        for _ in 0..count {
            let radius = seed_spore_radius(rng);
            let position = spawn_coords(rng, radius, None, Some(&self.spores));
            self.spores.insert(Arc::new(Spore::seeded(position, radius)), None);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Normally distributed radius around `spore::SEED_MEAN_RADIUS`, at least `spore::MIN_RADIUS`
fn seed_spore_radius<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1]
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    let normal = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();

    (spore::SEED_MEAN_RADIUS + normal * spore::SEED_RADIUS_STDDEV).max(spore::MIN_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_seed_spores() {
        let world = World::new();
        let mut rng = StdRng::seed_from_u64(1);
        world.seed_spores(&mut rng, 200);

        assert_eq!(world.spores.len(), 200);
        assert!(world.players.is_empty());

        let spores = world.spores.snapshot();
        for (_, s) in &spores {
            assert!(s.radius >= spore::MIN_RADIUS);
            assert!(s.dropped_by.is_none());
        }
        for (a, sa) in &spores {
            for (b, sb) in &spores {
                if a != b {
                    let reach = sa.radius + sb.radius;
                    assert!(sa.position.distance_sq_to(sb.position) > reach * reach);
                }
            }
        }
    }

    #[test]
    fn test_seed_radius_distribution() {
        let mut rng = StdRng::seed_from_u64(3);
        let samples: Vec<f64> = (0..5000).map(|_| seed_spore_radius(&mut rng)).collect();

        assert!(samples.iter().all(|r| r.is_finite() && *r >= spore::MIN_RADIUS));
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - spore::SEED_MEAN_RADIUS).abs() < 0.5, "mean was {}", mean);
    }
}
