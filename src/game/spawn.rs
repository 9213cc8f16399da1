//! Random placement that avoids overlapping existing entities

use std::sync::Arc;

use rand::Rng;

use crate::game::constants::world;
use crate::game::player::SharedPlayer;
use crate::game::spore::Spore;
use crate::util::registry::Registry;
use crate::util::vec2::Vec2;

/// Anything with a circular footprint in the world
pub trait Footprint {
    fn footprint(&self) -> (Vec2, f64);
}

impl Footprint for SharedPlayer {
    fn footprint(&self) -> (Vec2, f64) {
        let player = self.lock();
        (player.position, player.radius)
    }
}

impl Footprint for Arc<Spore> {
    fn footprint(&self) -> (Vec2, f64) {
        (self.position, self.radius)
    }
}

/// Whether a circle at `position` would touch anything in `objects`
pub fn is_too_close<T>(position: Vec2, radius: f64, objects: Option<&Registry<T>>) -> bool
where
    T: Clone + Footprint,
{
    let Some(objects) = objects else {
        return false;
    };

    objects.snapshot().iter().any(|(_, object)| {
        let (other, other_radius) = object.footprint();
        let reach = radius + other_radius;
        position.distance_sq_to(other) <= reach * reach
    })
}

/// Pick coordinates clear of the given players and spores
///
/// Tries random points in a square of half-width `world::SPAWN_BOUND`; every
/// `world::SPAWN_MAX_TRIES` misses the square doubles.
pub fn spawn_coords<R: Rng + ?Sized>(
    rng: &mut R,
    radius: f64,
    players: Option<&Registry<SharedPlayer>>,
    spores: Option<&Registry<Arc<Spore>>>,
) -> Vec2 {
    let mut bound = world::SPAWN_BOUND;
    let mut tries = 0;

    loop {
        let candidate = Vec2::new(
            bound * (2.0 * rng.gen::<f64>() - 1.0),
            bound * (2.0 * rng.gen::<f64>() - 1.0),
        );

        if !is_too_close(candidate, radius, players) && !is_too_close(candidate, radius, spores) {
            return candidate;
        }

        tries += 1;
        if tries >= world::SPAWN_MAX_TRIES {
            bound *= 2.0;
            tries = 0;
        }
    }
}
