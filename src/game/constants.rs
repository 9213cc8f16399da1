/// World layout constants
pub mod world {
    /// Number of spores seeded at startup
    pub const MAX_SPORES: usize = 1000;
    /// Initial half-width of the square spawn area
    pub const SPAWN_BOUND: f64 = 3000.0;
    /// Failed placement attempts before the spawn area doubles
    pub const SPAWN_MAX_TRIES: u32 = 25;
}

/// Player defaults
pub mod player {
    /// Speed in world units per second
    pub const DEFAULT_SPEED: f64 = 150.0;
    /// Radius on (re)spawn
    pub const DEFAULT_RADIUS: f64 = 25.0;
    /// Radius never drops below this
    pub const MIN_RADIUS: f64 = 5.0;
    /// Players at or below this radius never drop spores
    pub const MIN_DROP_RADIUS: f64 = 10.0;
}

/// Spore sizing
pub mod spore {
    /// Mean radius of a seeded spore
    pub const SEED_MEAN_RADIUS: f64 = 10.0;
    /// Standard deviation of seeded spore radius
    pub const SEED_RADIUS_STDDEV: f64 = 3.0;
    /// Smallest spore radius
    pub const MIN_RADIUS: f64 = 5.0;
    /// Largest radius of a dropped spore
    pub const MAX_DROP_RADIUS: f64 = 15.0;
    /// Player radius is divided by this to size a dropped spore
    pub const DROP_RADIUS_DIVISOR: f64 = 50.0;
}

/// Movement tick constants
pub mod tick {
    /// Tick duration in milliseconds (20 Hz)
    pub const DURATION_MS: u64 = 50;
    /// Delta time per tick in seconds
    pub const DT: f64 = DURATION_MS as f64 / 1000.0;
}

/// Networking constants
pub mod net {
    /// Maximum framed message size
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Pending outbound messages per connection before shedding
    pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;
    /// Spores per initial batch
    pub const SPORE_BATCH_SIZE: usize = 20;
    /// Pause between initial spore batches in milliseconds
    pub const SPORE_BATCH_DELAY_MS: u64 = 50;
    /// Undecodable frames in a row before the connection is dropped
    pub const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 5;
}

/// Calculate mass from radius: mass = π·r²
#[inline]
pub fn radius_to_mass(radius: f64) -> f64 {
    std::f64::consts::PI * radius * radius
}

/// Calculate radius from mass (inverse of radius_to_mass)
#[inline]
pub fn mass_to_radius(mass: f64) -> f64 {
    (mass.max(0.0) / std::f64::consts::PI).sqrt()
}

/// Radius after adding `mass_diff` (negative to shrink), floored at `player::MIN_RADIUS`
#[inline]
pub fn next_radius(radius: f64, mass_diff: f64) -> f64 {
    let mass = radius_to_mass(radius) + mass_diff;
    mass_to_radius(mass.max(radius_to_mass(player::MIN_RADIUS)))
}

/// Score shown on the leaderboard for a given radius
#[inline]
pub fn score_for_radius(radius: f64) -> i64 {
    radius_to_mass(radius).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_to_mass() {
        let mass = radius_to_mass(25.0);
        assert!((mass - 1963.495).abs() < 0.001);
    }

    #[test]
    fn test_mass_radius_round_trip() {
        for r in [0.001, 0.5, 5.0, 8.0, 25.0, 123.456, 10_000.0] {
            let back = mass_to_radius(radius_to_mass(r));
            assert!(
                (back - r).abs() < 1e-9 * r.max(1.0),
                "round trip failed for {}: got {}",
                r,
                back
            );
        }
    }

    #[test]
    fn test_next_radius_grows_by_area() {
        // Mass of 25 + mass of 8 gives sqrt(25² + 8²)
        let grown = next_radius(25.0, radius_to_mass(8.0));
        assert!((grown - (25.0f64 * 25.0 + 8.0 * 8.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_next_radius_floored() {
        let shrunk = next_radius(6.0, -radius_to_mass(100.0));
        assert!((shrunk - player::MIN_RADIUS).abs() < 1e-9);
    }

    #[test]
    fn test_mass_to_radius_negative_mass() {
        assert_eq!(mass_to_radius(-10.0), 0.0);
    }

    #[test]
    fn test_score_for_radius() {
        assert_eq!(score_for_radius(25.0), 1963);
        assert_eq!(score_for_radius(0.0), 0);
    }

    #[test]
    fn test_tick_dt() {
        assert!((tick::DT - 0.05).abs() < f64::EPSILON);
    }
}
