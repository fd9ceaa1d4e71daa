//! Stand-ins for the host runtime used by the unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waypoint_utils::math::Vector3;

use crate::{
    chunk::{CellFlags, ChunkMode, ChunkStorage, LevelChunk, RamChunkStorage},
    player::{Player, PlayerConnection},
    teleport::{Completion, TeleportOutcome},
    world::{Universe, World},
};

/// Ground level of the flat test worlds. Players stand at `FLAT_GROUND + 1`.
pub(crate) const FLAT_GROUND: i32 = 63;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SentTeleport {
    pub id: i32,
    pub position: Vector3<f64>,
    pub yaw: f32,
    pub pitch: f32,
}

/// Records everything sent to the client.
#[derive(Default)]
pub(crate) struct RecordingConnection {
    messages: Mutex<Vec<String>>,
    teleports: Mutex<Vec<SentTeleport>>,
}

impl RecordingConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub(crate) fn teleports(&self) -> Vec<SentTeleport> {
        self.teleports.lock().clone()
    }

    pub(crate) fn received(&self, message: &str) -> bool {
        self.messages.lock().iter().any(|m| m == message)
    }
}

impl PlayerConnection for RecordingConnection {
    fn send_system_message(&self, message: &str) {
        self.messages.lock().push(message.to_owned());
    }

    fn send_teleport(&self, id: i32, position: Vector3<f64>, yaw: f32, pitch: f32) {
        self.teleports.lock().push(SentTeleport {
            id,
            position,
            yaw,
            pitch,
        });
    }
}

/// Chunks of solid ground with 22 blocks of water on top.
pub(crate) fn ocean() -> RamChunkStorage {
    RamChunkStorage::generated(
        ChunkMode::AlwaysResident,
        Box::new(|pos| {
            let mut chunk = LevelChunk::empty(pos, 0, 256);
            chunk.fill_layers(0, 40, CellFlags::SOLID);
            chunk.fill_layers(41, 62, CellFlags::FLUID);
            chunk
        }),
    )
}

/// A universe whose worlds stop when the server is dropped.
pub(crate) struct TestServer {
    pub universe: Arc<Universe>,
    cancel_token: CancellationToken,
}

impl TestServer {
    pub(crate) fn new() -> Self {
        let cancel_token = CancellationToken::new();
        Self {
            universe: Arc::new(Universe::new(cancel_token.clone())),
            cancel_token,
        }
    }

    /// Flat, always resident worlds with the given names.
    pub(crate) fn flat(names: &[&str]) -> Self {
        let server = Self::new();
        for name in names {
            server.add_world(
                name,
                Arc::new(RamChunkStorage::flat(ChunkMode::AlwaysResident, FLAT_GROUND)),
            );
        }
        server
    }

    pub(crate) fn add_world(&self, name: &str, chunks: Arc<dyn ChunkStorage>) -> Arc<World> {
        self.universe.create_world(name, chunks)
    }

    pub(crate) fn world(&self, name: &str) -> Arc<World> {
        self.universe
            .world(name)
            .unwrap_or_else(|| panic!("world {name} is not loaded"))
    }

    pub(crate) fn connect(
        &self,
        name: &str,
        connection: &Arc<RecordingConnection>,
        world: &str,
        position: Vector3<f64>,
    ) -> Arc<Player> {
        let connection: Arc<dyn PlayerConnection> = Arc::clone(connection) as _;
        self.universe
            .connect(Uuid::new_v4(), name, connection, world, position, (0.0, 0.0))
            .expect("test world is loaded")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Waits until every task submitted to `world` so far has run.
pub(crate) async fn settle(world: &World) {
    let (done, wait) = oneshot::channel();
    world
        .submit(move |_| {
            let _ = done.send(());
        })
        .expect("world context is running");
    wait.await.expect("world context dropped the task");
}

/// A completion that forwards the outcome to the returned receiver.
pub(crate) fn recorded() -> (Completion, mpsc::UnboundedReceiver<TeleportOutcome>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let completion = Completion::new().on_complete(move |outcome| {
        let _ = sender.send(outcome.clone());
    });
    (completion, receiver)
}
