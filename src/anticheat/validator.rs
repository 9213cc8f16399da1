use std::time::Duration;

use tokio::time::Instant;

use crate::game::player::{Player, PlayerId};
use crate::game::spore::{Spore, SporeId};
use crate::util::vec2::Vec2;

/// Reasons a consumption claim is refused
///
/// Never sent to the client; only logged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClaimViolation {
    #[error("spore with the id {0} does not exist")]
    UnknownSpore(SporeId),
    #[error("player with the id {0} does not exist")]
    UnknownPlayer(PlayerId),
    #[error("player is too far from the object (distSq: {dist_sq}, thresholdSq: {threshold_sq})")]
    TooFar { dist_sq: f64, threshold_sq: f64 },
    #[error("player dropped the spore too recently (since drop: {elapsed:?}, min acceptable: {min:?})")]
    DropCooldown { elapsed: Duration, min: Duration },
    #[error("player not massive enough to consume the other player (our radius: {ours}, other radius: {theirs})")]
    NotMassiveEnough { ours: f64, theirs: f64 },
    #[error("NaN or Infinity in player state")]
    InvalidFloats,
}

/// Configuration for claim validation
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Slack added to the touch distance
    pub proximity_buffer: f64,
    /// Slack subtracted from the distance used for the self-drop cooldown
    pub cooldown_buffer: f64,
    /// Consumer mass must exceed the target's by this factor
    pub mass_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            proximity_buffer: 10.0,
            cooldown_buffer: 10.0,
            mass_ratio: 1.5,
        }
    }
}

/// Server-side check of consumption claims made by a client about itself
pub struct ClaimValidator {
    config: ValidationConfig,
}

impl ClaimValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate that `player` may consume `spore`
    ///
    /// Checks run in order and stop at the first failure: the spore exists, it
    /// is touching the player, and if the player dropped it, enough time passed.
    pub fn validate_spore_claim(
        &self,
        player: &Player,
        spore_id: SporeId,
        spore: Option<&Spore>,
        now: Instant,
    ) -> Result<(), ClaimViolation> {
        let spore = spore.ok_or(ClaimViolation::UnknownSpore(spore_id))?;
        validate_floats(player)?;
        self.validate_proximity(player, spore.position, spore.radius)?;
        self.validate_drop_cooldown(player, spore, now)?;
        Ok(())
    }

    /// Validate that `player` may consume `target`
    pub fn validate_player_claim(
        &self,
        player: &Player,
        target_id: PlayerId,
        target: Option<&Player>,
    ) -> Result<(), ClaimViolation> {
        let target = target.ok_or(ClaimViolation::UnknownPlayer(target_id))?;
        validate_floats(player)?;

        if player.mass() <= target.mass() * self.config.mass_ratio {
            return Err(ClaimViolation::NotMassiveEnough {
                ours: player.radius,
                theirs: target.radius,
            });
        }

        self.validate_proximity(player, target.position, target.radius)
    }

    /// Squared-distance touch test with `proximity_buffer` slack
    pub fn validate_proximity(
        &self,
        player: &Player,
        position: Vec2,
        radius: f64,
    ) -> Result<(), ClaimViolation> {
        let dist_sq = player.position.distance_sq_to(position);
        let threshold = player.radius + self.config.proximity_buffer + radius;
        let threshold_sq = threshold * threshold;

        if dist_sq > threshold_sq {
            return Err(ClaimViolation::TooFar { dist_sq, threshold_sq });
        }
        Ok(())
    }

    /// A player cannot eat its own spore before it could have moved clear of it
    pub fn validate_drop_cooldown(
        &self,
        player: &Player,
        spore: &Spore,
        now: Instant,
    ) -> Result<(), ClaimViolation> {
        // Only the same life counts; a respawned player may eat its old drops
        if spore.dropped_by != Some(player.id) || spore.dropper_life != player.life {
            return Ok(());
        }

        let min = self.min_time_since_drop(player, spore);
        let elapsed = now.saturating_duration_since(spore.dropped_at);
        if elapsed < min {
            return Err(ClaimViolation::DropCooldown { elapsed, min });
        }
        Ok(())
    }

    /// Time for `player` to travel (spore radius + player radius - buffer)
    pub fn min_time_since_drop(&self, player: &Player, spore: &Spore) -> Duration {
        let distance = spore.radius + player.radius - self.config.cooldown_buffer;
        if distance <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(distance / player.speed).unwrap_or(Duration::MAX)
    }
}

impl Default for ClaimValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn validate_floats(player: &Player) -> Result<(), ClaimViolation> {
    if !player.position.is_finite() || !player.radius.is_finite() || !player.speed.is_finite() {
        return Err(ClaimViolation::InvalidFloats);
    }
    Ok(())
}
