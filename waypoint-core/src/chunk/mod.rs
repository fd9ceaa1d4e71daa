//! Chunk columns and the voxel queries the safe location search runs on.

pub mod level_chunk;
pub mod ram_storage;

use std::sync::Arc;

use futures::future::BoxFuture;
use waypoint_utils::ChunkPos;

pub use level_chunk::{CellFlags, LevelChunk};
pub use ram_storage::{ChunkMode, RamChunkStorage};

/// Voxel queries in world coordinates.
///
/// Coordinates outside of the view (above the build height, below the floor)
/// read as empty air.
pub trait VoxelView {
    /// Whether the block at the position blocks a player.
    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool;
    /// Whether water or lava occupies the position.
    fn has_fluid(&self, x: i32, y: i32, z: i32) -> bool;
}

/// Source of chunks for one world.
pub trait ChunkStorage: Send + Sync {
    /// Returns the chunk if it is resident, without loading anything.
    fn chunk(&self, pos: ChunkPos) -> Option<Arc<LevelChunk>>;

    /// Returns the chunk, loading it when it is not resident.
    ///
    /// Resolves to `None` when the chunk does not exist and cannot be created.
    fn load(&self, pos: ChunkPos) -> BoxFuture<'_, Option<Arc<LevelChunk>>>;
}
