//! The travel flows behind the player commands.
//!
//! Command parsing and permission checks happen in the host. Every method
//! taking a player expects to be called on that player's world.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;
use waypoint_utils::Position;

use crate::{
    back::BackLocationStore,
    config::TravelConfig,
    locations::{DEFAULT_HOME_NAME, HomeBook, LocationError, SpawnPoint, WarpBook},
    player::Player,
    rtp::{RtpError, RtpService},
    teleport::{CancelReason, Completion, TeleportError, TeleportManager, TeleportOutcome},
    toggles::PlayerToggles,
    tpa::TravelRequestStore,
    world::Universe,
};

const MOVED_MESSAGE: &str = "Teleport cancelled because you moved.";

/// Why a travel command was refused. The display text is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TravelError {
    /// `back` without a stored location.
    #[error("You have no location to return to.")]
    NoBackLocation,
    /// A player sent a request to themselves.
    #[error("You cannot send a teleport request to yourself.")]
    SelfRequest,
    /// A live request to the same player exists.
    #[error("You already have a pending request to {0}.")]
    DuplicateRequest(String),
    /// No online player has that name.
    #[error("Player '{0}' is not online.")]
    PlayerNotFound(String),
    /// Nothing to accept.
    #[error("You have no pending teleport requests.")]
    NoPendingRequest,
    /// Nothing to accept from that player.
    #[error("You have no pending teleport request from {0}.")]
    NoRequestFrom(String),
    /// A named location problem.
    #[error(transparent)]
    Location(#[from] LocationError),
    /// The teleport could not start.
    #[error(transparent)]
    Teleport(#[from] TeleportError),
    /// The random teleport was refused.
    #[error(transparent)]
    Rtp(#[from] RtpError),
}

/// Ties the stores and the teleport manager together.
pub struct TravelService {
    universe: Arc<Universe>,
    teleports: Arc<TeleportManager>,
    back: Arc<BackLocationStore>,
    requests: TravelRequestStore,
    homes: HomeBook,
    warps: WarpBook,
    spawn: SpawnPoint,
    toggles: PlayerToggles,
    rtp: Arc<RtpService>,
}

impl TravelService {
    /// Creates the service for `universe`.
    #[must_use]
    pub fn new(universe: Arc<Universe>, config: &TravelConfig) -> Self {
        let teleports = Arc::new(TeleportManager::new(
            Arc::clone(&universe),
            config.teleport_delay(),
        ));
        let back = Arc::new(BackLocationStore::new());
        let rtp = Arc::new(RtpService::new(
            Arc::clone(&teleports),
            Arc::clone(&back),
            &config.rtp,
        ));

        Self {
            universe,
            teleports,
            back,
            requests: TravelRequestStore::new(config.tpa_expiration()),
            homes: HomeBook::new(config.homes.limits.clone()),
            warps: WarpBook::new(),
            spawn: SpawnPoint::new(),
            toggles: PlayerToggles::new(),
            rtp,
        }
    }

    /// The universe players travel in.
    #[must_use]
    pub const fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// The teleport manager.
    #[must_use]
    pub const fn teleports(&self) -> &Arc<TeleportManager> {
        &self.teleports
    }

    /// Last locations.
    #[must_use]
    pub fn back_locations(&self) -> &BackLocationStore {
        &self.back
    }

    /// Pending teleport requests.
    #[must_use]
    pub const fn requests(&self) -> &TravelRequestStore {
        &self.requests
    }

    /// Player homes.
    #[must_use]
    pub const fn homes(&self) -> &HomeBook {
        &self.homes
    }

    /// Server warps.
    #[must_use]
    pub const fn warps(&self) -> &WarpBook {
        &self.warps
    }

    /// The spawn point.
    #[must_use]
    pub const fn spawn_point(&self) -> &SpawnPoint {
        &self.spawn
    }

    /// Per-player toggles.
    #[must_use]
    pub const fn toggles(&self) -> &PlayerToggles {
        &self.toggles
    }

    /// Random teleports.
    #[must_use]
    pub const fn rtp(&self) -> &Arc<RtpService> {
        &self.rtp
    }

    fn countdown_notice(&self, player: &Player) {
        let delay = self.teleports.delay();
        if !delay.is_zero() {
            player.send_message(&format!(
                "Teleporting in {} seconds. Don't move!",
                delay.as_secs()
            ));
        }
    }

    /// Tells the player when movement cancelled their countdown.
    fn completion(player: &Arc<Player>, message: String) -> Completion {
        let player = Arc::clone(player);
        Completion::new()
            .with_message(message)
            .on_complete(move |outcome| {
                if matches!(outcome, TeleportOutcome::Cancelled(CancelReason::Moved)) {
                    player.send_message(MOVED_MESSAGE);
                }
            })
    }

    /// Saves the back location and starts a countdown to `destination`.
    fn travel_to(&self, player: &Arc<Player>, destination: Position, completion: Completion) {
        self.back.save(player.uuid, player.current_position());
        self.countdown_notice(player);
        self.teleports
            .queue_delayed_teleport(player, player.position(), destination, completion);
    }

    /// Returns the player to their back location.
    ///
    /// On arrival the location the player left is forgotten, unless
    /// something stored a newer one in the meantime.
    pub fn back(&self, player: &Arc<Player>) -> Result<(), TravelError> {
        let destination = self
            .back
            .peek(player.uuid)
            .ok_or(TravelError::NoBackLocation)?;
        if self.universe.world(&destination.world).is_none() {
            return Err(TeleportError::WorldNotLoaded {
                world: destination.world,
            }
            .into());
        }

        let left = player.current_position();
        let back = Arc::clone(&self.back);
        let uuid = player.uuid;
        let expected = left.clone();
        let completion = Self::completion(player, "Returned to your previous location.".to_owned())
            .on_success(move |_| {
                back.clear_if(uuid, &expected);
            });

        self.back.save(uuid, left);
        self.countdown_notice(player);
        self.teleports
            .queue_delayed_teleport(player, player.position(), destination, completion);
        Ok(())
    }

    /// Teleports the player to one of their homes.
    pub fn home(&self, player: &Arc<Player>, name: Option<&str>) -> Result<(), TravelError> {
        let name = name.unwrap_or(DEFAULT_HOME_NAME);
        let destination = self
            .homes
            .get(player.uuid, name)
            .ok_or_else(|| LocationError::UnknownHome(name.to_ascii_lowercase()))?;
        let completion = Self::completion(player, format!("Teleported to home {name}."));
        self.travel_to(player, destination, completion);
        Ok(())
    }

    /// Sets a home at the player's position.
    pub fn set_home(
        &self,
        player: &Player,
        name: Option<&str>,
        has_tier: impl Fn(&str) -> bool,
    ) -> Result<(), TravelError> {
        let name = name.unwrap_or(DEFAULT_HOME_NAME);
        self.homes
            .set(player.uuid, name, player.current_position(), has_tier)?;
        player.send_message(&format!("Home {} set.", name.to_ascii_lowercase()));
        Ok(())
    }

    /// Teleports the player to a warp.
    pub fn warp(&self, player: &Arc<Player>, name: &str) -> Result<(), TravelError> {
        let destination = self
            .warps
            .get(name)
            .ok_or_else(|| LocationError::UnknownWarp(name.to_ascii_lowercase()))?;
        let completion = Self::completion(player, format!("Warped to {name}."));
        self.travel_to(player, destination, completion);
        Ok(())
    }

    /// Teleports the player to the spawn point.
    pub fn spawn(&self, player: &Arc<Player>) -> Result<(), TravelError> {
        let destination = self.spawn.get().ok_or(LocationError::NoSpawn)?;
        let completion = Self::completion(player, "Teleported to spawn.".to_owned());
        self.travel_to(player, destination, completion);
        Ok(())
    }

    /// Asks `target_name` to let `requester` teleport to them.
    pub fn tpa(&self, requester: &Player, target_name: &str) -> Result<(), TravelError> {
        let target = self
            .universe
            .player_by_name(target_name)
            .filter(|target| target.is_valid())
            .ok_or_else(|| TravelError::PlayerNotFound(target_name.to_owned()))?;
        if target.uuid == requester.uuid {
            return Err(TravelError::SelfRequest);
        }
        if !self
            .requests
            .create(requester.uuid, &requester.name, target.uuid)
        {
            return Err(TravelError::DuplicateRequest(target.name.clone()));
        }

        requester.send_message(&format!("Teleport request sent to {}.", target.name));
        target.send_message(&format!(
            "{} has requested to teleport to you. Type /tpaccept to accept.",
            requester.name
        ));
        log::debug!("{} requested to teleport to {}", requester.name, target.name);
        Ok(())
    }

    /// Accepts a request sent to `target`, the newest one unless a requester is named.
    ///
    /// The requester's back location is saved and their countdown started on
    /// the requester's own world.
    pub fn tpaccept(
        &self,
        target: &Player,
        requester_name: Option<&str>,
    ) -> Result<(), TravelError> {
        let request = match requester_name {
            Some(name) => self
                .requests
                .accept_from(target.uuid, name)
                .ok_or_else(|| TravelError::NoRequestFrom(name.to_owned()))?,
            None => self
                .requests
                .accept_most_recent(target.uuid)
                .ok_or(TravelError::NoPendingRequest)?,
        };
        let requester = self
            .universe
            .player(request.requester)
            .filter(|requester| requester.is_valid())
            .ok_or_else(|| TravelError::PlayerNotFound(request.requester_name.clone()))?;

        let back = Arc::clone(&self.back);
        let teleports = Arc::clone(&self.teleports);
        let target_uuid = target.uuid;
        let completion = Self::completion(&requester, format!("Teleported to {}.", target.name));
        let delay = self.teleports.delay();
        let requester_world = requester.world();
        requester_world
            .submit(move |_| {
                if !requester.is_valid() {
                    return;
                }
                back.save(requester.uuid, requester.current_position());
                if !delay.is_zero() {
                    requester.send_message(&format!(
                        "Teleporting in {} seconds. Don't move!",
                        delay.as_secs()
                    ));
                }
                teleports.queue_delayed_teleport_to_player(
                    &requester,
                    requester.position(),
                    target_uuid,
                    completion,
                );
            })
            .map_err(|_| TeleportError::WorldNotLoaded {
                world: requester_world.name.clone(),
            })?;

        target.send_message(&format!(
            "Accepted teleport request from {}.",
            request.requester_name
        ));
        Ok(())
    }

    /// Brings `target_name` to `admin` without a countdown.
    pub fn tphere(&self, admin: &Player, target_name: &str) -> Result<(), TravelError> {
        let target = self
            .universe
            .player_by_name(target_name)
            .filter(|target| target.is_valid())
            .ok_or_else(|| TravelError::PlayerNotFound(target_name.to_owned()))?;
        let destination = admin.current_position();
        if self.universe.world(&destination.world).is_none() {
            return Err(TeleportError::WorldNotLoaded {
                world: destination.world,
            }
            .into());
        }

        let back = Arc::clone(&self.back);
        let teleports = Arc::clone(&self.teleports);
        let admin_name = admin.name.clone();
        let target_name = target.name.clone();
        let target_world = target.world();
        target_world
            .submit(move |_| {
                if !target.is_valid() {
                    return;
                }
                back.save(target.uuid, target.current_position());
                let completion =
                    Completion::new().with_message(format!("You were teleported to {admin_name}."));
                if let Err(err) = teleports.teleport_instant(
                    &target,
                    &destination.world,
                    destination.x,
                    destination.y,
                    destination.z,
                    destination.yaw,
                    destination.pitch,
                    completion,
                ) {
                    log::warn!("Could not bring {} to {admin_name}: {err}", target.name);
                }
            })
            .map_err(|_| TeleportError::WorldNotLoaded {
                world: target_world.name.clone(),
            })?;

        admin.send_message(&format!("Teleporting {target_name} to you."));
        Ok(())
    }

    /// Sends the player to a random location.
    pub fn random_teleport(
        &self,
        player: &Arc<Player>,
        bypass_cooldown: bool,
    ) -> Result<(), TravelError> {
        self.rtp.random_teleport(player, bypass_cooldown)?;
        self.countdown_notice(player);
        Ok(())
    }

    /// Flushes all per-player state of a disconnecting player.
    pub fn on_player_quit(&self, player: Uuid) {
        self.back.on_player_quit(player);
        self.requests.on_player_quit(player);
        self.teleports.on_player_quit(player);
        self.toggles.on_player_quit(player);
        log::debug!("Flushed travel state of {player}");
    }
}
