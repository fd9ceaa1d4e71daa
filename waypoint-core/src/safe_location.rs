//! Vertical scans that turn a requested coordinate into one a player can stand in.
//!
//! The upward clearance search adjusts player-authored destinations (homes,
//! warps, spawn) whose terrain may have changed since they were saved. The
//! downward ground search picks standing spots for randomized placement and
//! rejects any column with fluid above its ground.

use rand::{Rng, rngs::StdRng};
use waypoint_utils::{BlockPos, math::Vector3};

use crate::{chunk::VoxelView, teleport::TeleportError, world::World};

/// How far above the requested y the clearance search looks.
pub const MAX_SAFE_SEARCH: i32 = 128;
/// Number of stacked non-solid cells a standing player needs.
pub const PLAYER_HEIGHT: i32 = 2;
/// The ground search starts at this y.
pub const GROUND_SEARCH_TOP: i32 = 200;
/// The ground search stops after this y.
pub const GROUND_SEARCH_BOTTOM: i32 = 0;
/// Columns tried by a randomized placement before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Whether a player fits with their feet at `y`.
pub fn has_space_for_player<V: VoxelView + ?Sized>(view: &V, x: i32, y: i32, z: i32) -> bool {
    (0..PLAYER_HEIGHT).all(|dy| !view.is_solid(x, y + dy, z))
}

/// Upward clearance search.
///
/// Returns `y` itself when the player already fits there, the first block y
/// above it with enough clearance, or `y` unchanged when nothing within
/// [`MAX_SAFE_SEARCH`] blocks fits.
#[allow(clippy::cast_possible_truncation)]
pub fn find_safe_y<V: VoxelView + ?Sized>(view: &V, x: f64, y: f64, z: f64) -> f64 {
    let block = BlockPos::containing(x, y, z);
    (0..MAX_SAFE_SEARCH)
        .map(|offset| block.y() + offset)
        .find(|&check_y| has_space_for_player(view, block.x(), check_y, block.z()))
        .map_or(y, |check_y| {
            if check_y == block.y() {
                y
            } else {
                f64::from(check_y)
            }
        })
}

/// [`find_safe_y`] against the resident chunk of `world`.
///
/// A column whose chunk is not resident is left as requested.
pub fn find_safe_y_in(world: &World, x: f64, y: f64, z: f64) -> f64 {
    match world.chunk_at(BlockPos::containing(x, y, z)) {
        Some(chunk) => find_safe_y(chunk.as_ref(), x, y, z),
        None => {
            log::debug!(
                "Chunk at {x:.1}, {z:.1} in {} is not loaded, keeping y={y}",
                world.name
            );
            y
        }
    }
}

/// [`find_safe_y`] against `world`, loading the chunk if needed.
pub async fn find_safe_y_async(world: &World, x: f64, y: f64, z: f64) -> f64 {
    match world.load_chunk_at(BlockPos::containing(x, y, z)).await {
        Some(chunk) => find_safe_y(chunk.as_ref(), x, y, z),
        None => y,
    }
}

/// Downward ground search in a single column.
///
/// Scans from [`GROUND_SEARCH_TOP`] down. The first solid block is ground and
/// the player would stand one above it. Returns `None` when fluid is met
/// before ground, when fluid fills the standing cells, or when the column
/// has no ground with room for a player. A standing spot without headroom
/// does not abort the scan, a lower pocket may still fit.
pub fn find_ground_y<V: VoxelView + ?Sized>(view: &V, x: i32, z: i32) -> Option<f64> {
    for check_y in (GROUND_SEARCH_BOTTOM..=GROUND_SEARCH_TOP).rev() {
        if view.has_fluid(x, check_y, z) {
            return None;
        }
        if !view.is_solid(x, check_y, z) {
            continue;
        }

        let spawn_y = check_y + 1;
        if view.has_fluid(x, spawn_y, z) || view.has_fluid(x, spawn_y + 1, z) {
            return None;
        }
        if !has_space_for_player(view, x, spawn_y, z) {
            continue;
        }
        return Some(f64::from(spawn_y));
    }
    None
}

/// [`find_ground_y`] against the resident chunk of `world`.
///
/// A column whose chunk is not resident has no safe position.
pub fn find_ground_y_in(world: &World, x: f64, z: f64) -> Option<f64> {
    let block = BlockPos::containing(x, 0.0, z);
    let chunk = world.chunk_at(block)?;
    find_ground_y(chunk.as_ref(), block.x(), block.z())
}

/// [`find_ground_y`] against `world`, loading the chunk if needed.
pub async fn find_ground_y_async(world: &World, x: f64, z: f64) -> Option<f64> {
    let block = BlockPos::containing(x, 0.0, z);
    let chunk = world.load_chunk_at(block).await?;
    find_ground_y(chunk.as_ref(), block.x(), block.z())
}

/// Randomized placement: tries random columns around the world origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSearch {
    /// Columns are sampled with `x` and `z` in `(-radius, radius)`.
    pub radius: f64,
    /// Number of columns tried before giving up.
    pub max_attempts: u32,
}

impl ColumnSearch {
    /// Creates a search over `radius` blocks around the origin.
    #[must_use]
    pub const fn new(radius: f64, max_attempts: u32) -> Self {
        Self {
            radius,
            max_attempts,
        }
    }

    /// Picks a column uniformly inside the radius.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> (f64, f64) {
        if self.radius <= 0.0 {
            return (0.0, 0.0);
        }
        (
            rng.random_range(-self.radius..self.radius),
            rng.random_range(-self.radius..self.radius),
        )
    }

    fn exhausted(&self, world: &World) -> TeleportError {
        log::warn!(
            "No safe position in {} after {} attempts (radius {})",
            world.name,
            self.max_attempts,
            self.radius
        );
        TeleportError::NoSafePosition {
            attempts: self.max_attempts,
        }
    }

    /// Searches resident chunks only. Used when the caller already runs in `world`.
    pub fn search_sync<R: Rng>(
        &self,
        world: &World,
        rng: &mut R,
    ) -> Result<Vector3<f64>, TeleportError> {
        for attempt in 1..=self.max_attempts {
            let (x, z) = self.sample(rng);
            log::trace!("Placement attempt {attempt} in {} at {x:.1}, {z:.1}", world.name);
            if let Some(y) = find_ground_y_in(world, x, z) {
                return Ok(Vector3::new(x, y, z));
            }
        }
        Err(self.exhausted(world))
    }

    /// Searches `world`, loading chunks as needed.
    ///
    /// Takes an owned generator so the search can run on any task.
    pub async fn search_async(
        &self,
        world: &World,
        mut rng: StdRng,
    ) -> Result<Vector3<f64>, TeleportError> {
        for attempt in 1..=self.max_attempts {
            let (x, z) = self.sample(&mut rng);
            log::trace!("Placement attempt {attempt} in {} at {x:.1}, {z:.1}", world.name);
            if let Some(y) = find_ground_y_async(world, x, z).await {
                return Ok(Vector3::new(x, y, z));
            }
        }
        Err(self.exhausted(world))
    }
}
