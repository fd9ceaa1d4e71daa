//! This module contains the `World` struct and its serial task context.
//!
//! A world runs every submitted task to completion, one at a time and in
//! submission order, on a single tokio task. Different worlds run
//! concurrently with respect to each other.
use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use scc::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waypoint_utils::{BlockPos, ChunkPos};

use crate::{
    chunk::{ChunkStorage, LevelChunk},
    player::Player,
};

mod universe;

pub use universe::Universe;

/// A unit of work run inside a world's context.
pub type WorldTask = Box<dyn FnOnce(&Arc<World>) + Send + 'static>;

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_WORLD: u64;
}

/// The world's context has shut down and no longer accepts tasks.
#[derive(Debug, Error)]
#[error("the context of world '{0}' is closed")]
pub struct ContextClosed(pub String);

/// A struct that represents a world.
pub struct World {
    id: u64,
    /// The name of the world.
    pub name: String,
    /// The chunk storage of the world.
    pub chunks: Arc<dyn ChunkStorage>,
    /// A map of all the players in the world.
    pub players: HashMap<Uuid, Arc<Player>>,
    tasks: mpsc::UnboundedSender<WorldTask>,
}

impl World {
    /// Creates a new world and starts its context.
    ///
    /// Must be called from within a tokio runtime. The context stops when
    /// `cancel_token` is cancelled or the world is dropped.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        chunks: Arc<dyn ChunkStorage>,
        cancel_token: CancellationToken,
    ) -> Arc<Self> {
        let (tasks, receiver) = mpsc::unbounded_channel();
        let world = Arc::new(Self {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            chunks,
            players: HashMap::new(),
            tasks,
        });

        tokio::spawn(Self::run_context(
            world.id,
            Arc::downgrade(&world),
            receiver,
            cancel_token,
        ));
        world
    }

    async fn run_context(
        id: u64,
        world: Weak<World>,
        mut receiver: mpsc::UnboundedReceiver<WorldTask>,
        cancel_token: CancellationToken,
    ) {
        log::debug!("World context {id} started");
        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                task = receiver.recv() => {
                    let Some(task) = task else {
                        break;
                    };
                    let Some(world) = world.upgrade() else {
                        break;
                    };
                    CURRENT_WORLD.sync_scope(id, || task(&world));
                }
            }
        }
        log::debug!("World context {id} stopped");
    }

    /// Enqueues a task on this world's context and returns immediately.
    ///
    /// No ordering is guaranteed relative to tasks submitted to other worlds.
    pub fn submit<F>(&self, task: F) -> Result<(), ContextClosed>
    where
        F: FnOnce(&Arc<World>) + Send + 'static,
    {
        self.tasks
            .send(Box::new(task))
            .map_err(|_| ContextClosed(self.name.clone()))
    }

    /// Whether the caller is currently running inside this world's context.
    #[must_use]
    pub fn in_context(&self) -> bool {
        CURRENT_WORLD
            .try_with(|current| *current == self.id)
            .unwrap_or(false)
    }

    /// The chunk containing `pos`, if it is resident.
    #[must_use]
    pub fn chunk_at(&self, pos: BlockPos) -> Option<Arc<LevelChunk>> {
        self.chunks.chunk(ChunkPos::from_block(pos))
    }

    /// The chunk containing `pos`, loading it if needed.
    pub async fn load_chunk_at(&self, pos: BlockPos) -> Option<Arc<LevelChunk>> {
        self.chunks.load(ChunkPos::from_block(pos)).await
    }

    /// Whether two handles refer to the same world.
    #[must_use]
    pub fn same_as(&self, other: &World) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::chunk::{ChunkMode, RamChunkStorage};

    fn test_world(name: &str) -> Arc<World> {
        World::new(
            name,
            Arc::new(RamChunkStorage::flat(ChunkMode::AlwaysResident, 63)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let world = test_world("a");
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            world
                .submit(move |_| order.lock().expect("poisoned").push(i))
                .expect("context is running");
        }

        let (done, wait) = oneshot::channel();
        world
            .submit(move |_| {
                let _ = done.send(());
            })
            .expect("context is running");
        wait.await.expect("context dropped the task");

        assert_eq!(*order.lock().expect("poisoned"), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_in_context_only_inside_own_world() {
        let a = test_world("a");
        let b = test_world("b");
        assert!(!a.in_context());

        let (done, wait) = oneshot::channel();
        let b_inner = Arc::clone(&b);
        a.submit(move |world| {
            let _ = done.send((world.in_context(), b_inner.in_context()));
        })
        .expect("context is running");

        assert_eq!(wait.await.expect("context dropped the task"), (true, false));
    }

    #[tokio::test]
    async fn test_submit_fails_after_cancel() {
        let token = CancellationToken::new();
        let world = World::new(
            "closing",
            Arc::new(RamChunkStorage::preloaded()),
            token.clone(),
        );
        token.cancel();

        // Let the context observe the cancellation and drop its receiver
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(world.submit(|_| {}).is_err());
    }
}
