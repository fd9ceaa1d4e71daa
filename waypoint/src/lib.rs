//! # Waypoint
//!
//! Server wiring for the travel engine. Creates the configured worlds, owns the
//! [`TravelService`] and shuts everything down through one cancellation token.
use std::{sync::Arc, time::Duration};

use tokio::{select, spawn, time::interval};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waypoint_core::{
    TravelConfig, TravelService, Universe,
    chunk::{ChunkMode, ChunkStorage, RamChunkStorage},
    player::{Player, PlayerConnection},
    teleport::TeleportError,
};
use waypoint_utils::math::Vector3;

/// The logging module.
pub mod logger;

/// Ground level of worlds created without custom storage.
pub const FLAT_GROUND_Y: i32 = 63;

/// How often expired teleport requests are swept out.
pub const REQUEST_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// The main server struct.
pub struct WaypointServer {
    /// The cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// All loaded worlds and connected players.
    pub universe: Arc<Universe>,
    /// The travel flows.
    pub travel: Arc<TravelService>,
    /// The settings the server was started with.
    pub config: TravelConfig,
}

impl WaypointServer {
    /// Creates a server whose worlds are flat and kept in memory.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: TravelConfig) -> Self {
        Self::new_with_storage(config, |_| {
            Arc::new(RamChunkStorage::flat(
                ChunkMode::AlwaysResident,
                FLAT_GROUND_Y,
            ))
        })
    }

    /// Creates a server, asking `storage` for the chunks of every configured world.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new_with_storage<F>(config: TravelConfig, mut storage: F) -> Self
    where
        F: FnMut(&str) -> Arc<dyn ChunkStorage>,
    {
        log::info!("Starting Waypoint Server");

        let cancel_token = CancellationToken::new();
        let universe = Arc::new(Universe::new(cancel_token.child_token()));
        for name in &config.worlds {
            universe.create_world(name, storage(name));
        }
        let travel = Arc::new(TravelService::new(Arc::clone(&universe), &config));

        Self {
            cancel_token,
            universe,
            travel,
            config,
        }
    }

    /// Starts the background maintenance tasks.
    pub fn start(&self) {
        log::info!(
            "Started Waypoint Server with {} world(s)",
            self.universe.world_names().len()
        );

        let travel = Arc::clone(&self.travel);
        let cancel_token = self.cancel_token.clone();
        spawn(async move {
            let mut sweep = interval(REQUEST_SWEEP_INTERVAL);
            loop {
                select! {
                    () = cancel_token.cancelled() => break,
                    _ = sweep.tick() => {
                        let purged = travel.requests().purge_expired();
                        if purged > 0 {
                            log::debug!("Purged {purged} expired teleport request(s)");
                        }
                    }
                }
            }
        });
    }

    /// Adds a player, replacing any previous session with the same identity.
    pub fn connect(
        &self,
        uuid: Uuid,
        name: &str,
        connection: Arc<dyn PlayerConnection>,
        world: &str,
        position: Vector3<f64>,
        rotation: (f32, f32),
    ) -> Result<Arc<Player>, TeleportError> {
        if self.universe.player(uuid).is_some() {
            log::debug!("{name} ({uuid}) logged in again, closing the previous session");
            self.disconnect(uuid);
        }
        self.universe
            .connect(uuid, name, connection, world, position, rotation)
    }

    /// Removes a player and flushes all of its travel state.
    pub fn disconnect(&self, uuid: Uuid) -> Option<Arc<Player>> {
        let player = self.universe.disconnect(uuid);
        self.travel.on_player_quit(uuid);
        player
    }

    /// Stops the server.
    pub fn stop(&self) {
        log::info!("Stopping Waypoint Server");
        self.cancel_token.cancel();
    }
}
