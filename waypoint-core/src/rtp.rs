//! Random teleports into a configured radius around a world's origin.

use std::{sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use rustc_hash::FxHashMap;
use scc::HashMap;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;
use waypoint_utils::{Position, math::Vector3};

use crate::{
    back::BackLocationStore,
    config::RtpConfig,
    player::Player,
    safe_location::ColumnSearch,
    teleport::{Completion, TeleportError, TeleportManager},
};

/// Why a random teleport was refused. The display text is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtpError {
    /// Neither the player's world nor the default world has a radius.
    #[error("Random teleport is not enabled here.")]
    NotEnabled,
    /// The world to teleport into is not loaded.
    #[error("World '{world}' is not loaded.")]
    WorldNotLoaded {
        /// The configured world.
        world: String,
    },
    /// The player used a random teleport too recently.
    #[error("You must wait {}s before using random teleport again.", remaining.as_secs().max(1))]
    OnCooldown {
        /// Time left on the cooldown.
        remaining: Duration,
    },
    /// No place to stand was found.
    #[error(transparent)]
    Placement(#[from] TeleportError),
}

/// Random teleport with per-player cooldowns.
pub struct RtpService {
    teleports: Arc<TeleportManager>,
    back: Arc<BackLocationStore>,
    cooldowns: HashMap<Uuid, Instant>,
    radii: FxHashMap<String, i32>,
    default_world: String,
    cooldown: Duration,
    max_attempts: u32,
}

impl RtpService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        teleports: Arc<TeleportManager>,
        back: Arc<BackLocationStore>,
        config: &RtpConfig,
    ) -> Self {
        Self {
            teleports,
            back,
            cooldowns: HashMap::new(),
            radii: config.worlds.clone(),
            default_world: config.default_world.clone(),
            cooldown: Duration::from_secs(config.cooldown),
            max_attempts: config.max_attempts,
        }
    }

    /// Time left before the player may random teleport again.
    #[must_use]
    pub fn remaining_cooldown(&self, player: Uuid) -> Option<Duration> {
        let last = self.cooldowns.read_sync(&player, |_, last| *last)?;
        let remaining = self.cooldown.saturating_sub(last.elapsed());
        (!remaining.is_zero()).then_some(remaining)
    }

    fn stamp_cooldown(&self, player: Uuid) {
        let now = Instant::now();
        if self
            .cooldowns
            .update_sync(&player, |_, last| *last = now)
            .is_none()
        {
            let _ = self.cooldowns.insert_sync(player, now);
        }
    }

    /// Picks the world and radius for a player standing in `current_world`.
    fn target(&self, current_world: &str) -> Result<(String, i32), RtpError> {
        if let Some(radius) = self.radii.get(current_world) {
            return Ok((current_world.to_owned(), *radius));
        }
        self.radii
            .get(&self.default_world)
            .map(|radius| (self.default_world.clone(), *radius))
            .ok_or(RtpError::NotEnabled)
    }

    /// Sends the player to a random standing spot.
    ///
    /// Must run on the player's world. Refusals and a failed search in the
    /// player's own world are returned. A search in another world runs in
    /// the background and its failure is sent to the player.
    pub fn random_teleport(
        self: &Arc<Self>,
        player: &Arc<Player>,
        bypass_cooldown: bool,
    ) -> Result<(), RtpError> {
        let current_world = player.world();
        let (world_name, radius) = self.target(&current_world.name)?;
        let world = self
            .teleports
            .universe()
            .world(&world_name)
            .ok_or_else(|| RtpError::WorldNotLoaded {
                world: world_name.clone(),
            })?;

        if !bypass_cooldown && let Some(remaining) = self.remaining_cooldown(player.uuid) {
            return Err(RtpError::OnCooldown { remaining });
        }

        let origin = player.current_position();
        let start = player.position();
        let search = ColumnSearch::new(f64::from(radius), self.max_attempts);

        if world.same_as(&current_world) {
            let found = search.search_sync(&world, &mut rand::rng())?;
            self.back.save(player.uuid, origin);
            self.queue(player, start, &world_name, found);
            return Ok(());
        }

        let service = Arc::clone(self);
        let player = Arc::clone(player);
        let rng = StdRng::from_rng(&mut rand::rng());
        tokio::spawn(async move {
            let result = search.search_async(&world, rng).await;
            let home = player.world();
            let uuid = player.uuid;
            let submitted = home.submit(move |_| {
                service.placement_found(&player, origin, start, &world_name, result);
            });
            if let Err(err) = submitted {
                log::warn!("Random teleport of {uuid} could not continue: {err}");
            }
        });
        Ok(())
    }

    /// Finishes a cross-world search back on the player's world.
    fn placement_found(
        self: &Arc<Self>,
        player: &Arc<Player>,
        origin: Position,
        start: Vector3<f64>,
        world: &str,
        result: Result<Vector3<f64>, TeleportError>,
    ) {
        if !player.is_valid() {
            log::debug!("{} left before the random teleport was placed", player.name);
            return;
        }
        match result {
            Ok(found) => {
                self.back.save(player.uuid, origin.clone());
                // A quit flush may have run between the check and the save
                if !player.is_valid() {
                    self.back.clear_if(player.uuid, &origin);
                    return;
                }
                self.queue(player, start, world, found);
            }
            Err(err) => player.send_message(&err.to_string()),
        }
    }

    fn queue(
        self: &Arc<Self>,
        player: &Arc<Player>,
        start: Vector3<f64>,
        world: &str,
        found: Vector3<f64>,
    ) {
        let service = Arc::clone(self);
        let uuid = player.uuid;
        let completion = Completion::new()
            .with_message(format!("Teleported to a random location in {world}."))
            .on_success(move |_| service.stamp_cooldown(uuid));
        self.teleports.queue_delayed_teleport(
            player,
            start,
            Position::new(world, found.x, found.y, found.z, 0.0, 0.0),
            completion,
        );
    }
}
