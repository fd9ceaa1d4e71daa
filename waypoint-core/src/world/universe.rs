//! The set of loaded worlds and connected players.

use std::sync::Arc;

use scc::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waypoint_utils::math::Vector3;

use crate::{
    chunk::ChunkStorage,
    player::{Player, PlayerConnection},
    teleport::TeleportError,
    world::World,
};

/// All loaded worlds and the players connected to the server.
pub struct Universe {
    worlds: HashMap<String, Arc<World>>,
    players: HashMap<Uuid, Arc<Player>>,
    cancel_token: CancellationToken,
}

impl Universe {
    /// Creates an empty universe. Worlds created through it stop with `cancel_token`.
    #[must_use]
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            worlds: HashMap::new(),
            players: HashMap::new(),
            cancel_token,
        }
    }

    /// Creates and registers a world backed by `chunks`.
    ///
    /// An already loaded world with the same name is returned unchanged.
    pub fn create_world(&self, name: &str, chunks: Arc<dyn ChunkStorage>) -> Arc<World> {
        if let Some(world) = self.world(name) {
            log::warn!("World {name} is already loaded");
            return world;
        }
        let world = World::new(name, chunks, self.cancel_token.child_token());
        self.add_world(Arc::clone(&world));
        log::info!("Loaded world {name}");
        world
    }

    /// Registers an existing world. Returns `false` if the name is taken.
    pub fn add_world(&self, world: Arc<World>) -> bool {
        self.worlds.insert_sync(world.name.clone(), world).is_ok()
    }

    /// Looks up a loaded world by name.
    #[must_use]
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.read_sync(name, |_, world| Arc::clone(world))
    }

    /// Names of all loaded worlds.
    #[must_use]
    pub fn world_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.worlds.iter_sync(|name, _| {
            names.push(name.clone());
            true
        });
        names.sort();
        names
    }

    /// Looks up a connected player.
    #[must_use]
    pub fn player(&self, uuid: Uuid) -> Option<Arc<Player>> {
        self.players.read_sync(&uuid, |_, player| Arc::clone(player))
    }

    /// Looks up a connected player by name, ignoring case.
    #[must_use]
    pub fn player_by_name(&self, name: &str) -> Option<Arc<Player>> {
        let mut found = None;
        self.players.iter_sync(|_, player| {
            if player.name.eq_ignore_ascii_case(name) {
                found = Some(Arc::clone(player));
                return false;
            }
            true
        });
        found
    }

    /// Number of connected players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Adds a player to `world_name` at `position`.
    pub fn connect(
        &self,
        uuid: Uuid,
        name: &str,
        connection: Arc<dyn PlayerConnection>,
        world_name: &str,
        position: Vector3<f64>,
        rotation: (f32, f32),
    ) -> Result<Arc<Player>, TeleportError> {
        let world = self
            .world(world_name)
            .ok_or_else(|| TeleportError::WorldNotLoaded {
                world: world_name.to_owned(),
            })?;
        let player = Arc::new(Player::new(
            uuid,
            name,
            connection,
            Arc::clone(&world),
            position,
            rotation,
        ));

        // A second login replaces the old session
        if let Some((_, previous)) = self.players.remove_sync(&uuid) {
            previous.invalidate();
            let _ = previous.world().players.remove_sync(&uuid);
        }
        let _ = world.players.insert_sync(uuid, Arc::clone(&player));
        let _ = self.players.insert_sync(uuid, Arc::clone(&player));
        log::info!("{name} ({uuid}) joined {world_name}");
        Ok(player)
    }

    /// Removes a player and invalidates every handle to it.
    ///
    /// Returns the removed player, if it was connected.
    pub fn disconnect(&self, uuid: Uuid) -> Option<Arc<Player>> {
        let (_, player) = self.players.remove_sync(&uuid)?;
        player.invalidate();
        let _ = player.world().players.remove_sync(&uuid);
        log::info!("{} ({uuid}) left", player.name);
        Some(player)
    }
}
