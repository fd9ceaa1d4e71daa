// Wrapper types making it harder to accidentally mix block, chunk and entity coordinates.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::math::{Vector2, Vector3};

/// A chunk column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos(pub Vector2<i32>);

impl ChunkPos {
    /// Creates a chunk position from chunk coordinates.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self(Vector2::new(x, z))
    }

    /// The chunk containing the given block.
    #[must_use]
    pub const fn from_block(pos: BlockPos) -> Self {
        Self::new(pos.0.x >> 4, pos.0.z >> 4)
    }

    /// Chunk x coordinate.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.0.x
    }

    /// Chunk z coordinate.
    #[must_use]
    pub const fn z(&self) -> i32 {
        self.0.y
    }
}

/// A block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos(pub Vector3<i32>);

impl BlockPos {
    /// Creates a block position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self(Vector3::new(x, y, z))
    }

    /// The block an entity at `x, y, z` is standing in.
    #[must_use]
    pub fn containing(x: f64, y: f64, z: f64) -> Self {
        Self(Vector3::new(x, y, z).floor())
    }

    /// Block x coordinate.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.0.x
    }

    /// Block y coordinate.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.0.y
    }

    /// Block z coordinate.
    #[must_use]
    pub const fn z(&self) -> i32 {
        self.0.z
    }
}

/// A location in a named world, including the facing direction.
///
/// Rotation is in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Name of the world.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Horizontal rotation.
    pub yaw: f32,
    /// Vertical rotation.
    pub pitch: f32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw,
            pitch,
        }
    }

    /// The coordinates as a vector.
    #[must_use]
    pub const fn coords(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// The block this position lies in.
    #[must_use]
    pub fn block_pos(&self) -> BlockPos {
        BlockPos::containing(self.x, self.y, self.z)
    }

    /// Returns a copy with a different y coordinate.
    #[must_use]
    pub fn with_y(&self, y: f64) -> Self {
        Self { y, ..self.clone() }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}, {:.2}, {:.2})",
            self.world, self.x, self.y, self.z
        )
    }
}
