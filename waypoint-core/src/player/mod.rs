//! This module contains all things player-related.
mod connection;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, Ordering},
};

use arc_swap::ArcSwap;
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use uuid::Uuid;
use waypoint_utils::{Position, math::Vector3};

pub use connection::PlayerConnection;

use crate::world::World;

/// A teleport the client has not acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AwaitingTeleport {
    /// The id the client has to echo back.
    pub id: i32,
    /// Where the client was sent.
    pub position: Vector3<f64>,
}

/// A struct representing a player.
///
/// A `Player` handle may be held by any context, but its live state is only
/// mutated from within the context of the world it is currently in.
pub struct Player {
    /// The player's unique id.
    pub uuid: Uuid,
    /// The player's name.
    pub name: String,
    /// The player's connection.
    pub connection: Arc<dyn PlayerConnection>,

    world: ArcSwap<World>,

    /// The player's position.
    pub position: Mutex<Vector3<f64>>,
    /// The player's rotation as `(yaw, pitch)` in radians.
    pub rotation: AtomicCell<(f32, f32)>,

    removed: AtomicBool,
    awaiting_teleport: Mutex<Option<AwaitingTeleport>>,
    teleport_id: AtomicI32,
}

impl Player {
    /// Creates a new player standing at `position` in `world`.
    #[must_use]
    pub fn new(
        uuid: Uuid,
        name: impl Into<String>,
        connection: Arc<dyn PlayerConnection>,
        world: Arc<World>,
        position: Vector3<f64>,
        rotation: (f32, f32),
    ) -> Self {
        Self {
            uuid,
            name: name.into(),
            connection,
            world: ArcSwap::new(world),
            position: Mutex::new(position),
            rotation: AtomicCell::new(rotation),
            removed: AtomicBool::new(false),
            awaiting_teleport: Mutex::new(None),
            teleport_id: AtomicI32::new(0),
        }
    }

    /// The world the player is currently in.
    #[must_use]
    pub fn world(&self) -> Arc<World> {
        self.world.load_full()
    }

    /// Moves the player handle to another world.
    ///
    /// Membership in the worlds' player maps is managed by the caller.
    pub fn set_world(&self, world: Arc<World>) {
        self.world.store(world);
    }

    /// Whether the handle still refers to a connected player.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.removed.load(Ordering::SeqCst)
    }

    /// Marks the handle as no longer valid.
    pub fn invalidate(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    /// The player's current coordinates.
    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        *self.position.lock()
    }

    /// The player's full location, including world and rotation.
    #[must_use]
    pub fn current_position(&self) -> Position {
        let pos = self.position();
        let (yaw, pitch) = self.rotation.load();
        Position::new(self.world().name.clone(), pos.x, pos.y, pos.z, yaw, pitch)
    }

    fn is_invalid_position(pos: Vector3<f64>, yaw: f32, pitch: f32) -> bool {
        !pos.x.is_finite() || !pos.y.is_finite() || !pos.z.is_finite()
            || !yaw.is_finite()
            || !pitch.is_finite()
    }

    /// Handles a movement report from the client.
    ///
    /// Reports are ignored while a teleport is waiting to be acknowledged, as
    /// they describe where the client was before it.
    pub fn handle_move(&self, pos: Vector3<f64>, yaw: f32, pitch: f32) {
        if Self::is_invalid_position(pos, yaw, pitch) {
            log::warn!("Player {} sent an invalid position", self.name);
            return;
        }
        if self.awaiting_teleport.lock().is_some() {
            log::trace!("Ignoring movement of {} while awaiting teleport", self.name);
            return;
        }
        *self.position.lock() = pos;
        self.rotation.store((yaw, pitch));
    }

    /// Sets the player's position and rotation and tells the client about it.
    ///
    /// Returns the id the client has to acknowledge.
    pub fn teleport(&self, pos: Vector3<f64>, yaw: f32, pitch: f32) -> i32 {
        let id = self
            .teleport_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);
        *self.awaiting_teleport.lock() = Some(AwaitingTeleport { id, position: pos });
        *self.position.lock() = pos;
        self.rotation.store((yaw, pitch));
        self.connection.send_teleport(id, pos, yaw, pitch);
        id
    }

    /// Handles the client's acknowledgement of a teleport.
    ///
    /// Returns `false` when `id` does not match the teleport being awaited.
    pub fn accept_teleportation(&self, id: i32) -> bool {
        let mut awaiting = self.awaiting_teleport.lock();
        match *awaiting {
            Some(pending) if pending.id == id => {
                *awaiting = None;
                true
            }
            Some(pending) => {
                log::debug!(
                    "Player {} acknowledged teleport {id}, expected {}",
                    self.name,
                    pending.id
                );
                false
            }
            None => false,
        }
    }

    /// The teleport the client has not acknowledged yet, if any.
    #[must_use]
    pub fn awaiting_teleport(&self) -> Option<AwaitingTeleport> {
        *self.awaiting_teleport.lock()
    }

    /// Forgets any unacknowledged teleport and resets the id counter.
    ///
    /// Must run before a new teleport is applied, otherwise a client still
    /// working through an older teleport would never get out of the wait.
    pub fn clear_awaiting_teleport(&self) {
        *self.awaiting_teleport.lock() = None;
        self.teleport_id.store(0, Ordering::Relaxed);
    }

    /// Sends a system chat message to the player.
    pub fn send_message(&self, message: &str) {
        self.connection.send_system_message(message);
    }
}
