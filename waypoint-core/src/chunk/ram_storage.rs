//! RAM-only chunk storage.
//!
//! Chunks are produced by a generator function and kept in memory. Useful for
//! - Testing
//! - Minigame and lobby worlds
//! - Hosts that keep their own chunk data and only mirror what teleports need

use std::sync::Arc;

use futures::future::BoxFuture;
use scc::HashMap;
use waypoint_utils::ChunkPos;

use super::{CellFlags, ChunkStorage, LevelChunk};

/// Builds the column for a chunk position.
pub type ChunkGenerator = Box<dyn Fn(ChunkPos) -> LevelChunk + Send + Sync>;

/// When generated chunks become resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// Every chunk counts as resident; missing ones are generated on first access.
    AlwaysResident,
    /// Chunks are only resident after an explicit asynchronous load.
    LoadOnDemand,
}

/// In-memory chunk storage.
pub struct RamChunkStorage {
    chunks: HashMap<ChunkPos, Arc<LevelChunk>>,
    generator: Option<ChunkGenerator>,
    mode: ChunkMode,
}

impl RamChunkStorage {
    /// Storage that creates chunks with `generator`.
    #[must_use]
    pub fn generated(mode: ChunkMode, generator: ChunkGenerator) -> Self {
        Self {
            chunks: HashMap::new(),
            generator: Some(generator),
            mode,
        }
    }

    /// Storage that only knows the chunks inserted into it.
    #[must_use]
    pub fn preloaded() -> Self {
        Self {
            chunks: HashMap::new(),
            generator: None,
            mode: ChunkMode::LoadOnDemand,
        }
    }

    /// A superflat world: solid up to and including `ground_y`, air above.
    #[must_use]
    pub fn flat(mode: ChunkMode, ground_y: i32) -> Self {
        Self::generated(
            mode,
            Box::new(move |pos| {
                let mut chunk = LevelChunk::empty(pos, 0, 256);
                chunk.fill_layers(0, ground_y, CellFlags::SOLID);
                chunk
            }),
        )
    }

    /// Inserts or replaces a chunk, making it resident.
    pub fn insert(&self, chunk: LevelChunk) {
        let pos = chunk.pos;
        let chunk = Arc::new(chunk);
        if self
            .chunks
            .update_sync(&pos, |_, resident| *resident = Arc::clone(&chunk))
            .is_none()
        {
            let _ = self.chunks.insert_sync(pos, chunk);
        }
    }

    /// Drops a resident chunk. Returns whether it was resident.
    pub fn unload(&self, pos: ChunkPos) -> bool {
        self.chunks.remove_sync(&pos).is_some()
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.chunks.len()
    }

    fn resident(&self, pos: ChunkPos) -> Option<Arc<LevelChunk>> {
        self.chunks.read_sync(&pos, |_, chunk| Arc::clone(chunk))
    }

    fn get_or_generate(&self, pos: ChunkPos) -> Option<Arc<LevelChunk>> {
        if let Some(chunk) = self.resident(pos) {
            return Some(chunk);
        }

        let generator = self.generator.as_ref()?;
        let chunk = Arc::new(generator(pos));
        match self.chunks.insert_sync(pos, Arc::clone(&chunk)) {
            Ok(()) => Some(chunk),
            // Another context generated it first
            Err(_) => self.resident(pos),
        }
    }
}

impl ChunkStorage for RamChunkStorage {
    fn chunk(&self, pos: ChunkPos) -> Option<Arc<LevelChunk>> {
        match self.mode {
            ChunkMode::AlwaysResident => self.get_or_generate(pos),
            ChunkMode::LoadOnDemand => self.resident(pos),
        }
    }

    fn load(&self, pos: ChunkPos) -> BoxFuture<'_, Option<Arc<LevelChunk>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let chunk = self.get_or_generate(pos);
            if chunk.is_none() {
                log::debug!("Chunk {pos:?} does not exist and cannot be generated");
            }
            chunk
        })
    }
}
