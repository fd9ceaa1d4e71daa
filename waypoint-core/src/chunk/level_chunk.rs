//! A single chunk column of cell flags.

use bitflags::bitflags;
use waypoint_utils::ChunkPos;

use super::VoxelView;

/// Width of a chunk along x and z.
pub const CHUNK_WIDTH: i32 = 16;

bitflags! {
    /// What occupies a single cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u8 {
        /// A full block the player cannot stand inside of.
        const SOLID = 1 << 0;
        /// Water or lava.
        const FLUID = 1 << 1;
    }
}

/// A chunk column, `CHUNK_WIDTH` wide and `height` tall starting at `min_y`.
#[derive(Debug, Clone)]
pub struct LevelChunk {
    /// Position of the column.
    pub pos: ChunkPos,
    min_y: i32,
    height: i32,
    cells: Box<[CellFlags]>,
}

impl LevelChunk {
    /// Creates a column filled with air.
    #[must_use]
    pub fn empty(pos: ChunkPos, min_y: i32, height: i32) -> Self {
        let size = (CHUNK_WIDTH * CHUNK_WIDTH * height.max(0)) as usize;
        Self {
            pos,
            min_y,
            height: height.max(0),
            cells: vec![CellFlags::empty(); size].into_boxed_slice(),
        }
    }

    /// Lowest y coordinate stored in this column.
    #[must_use]
    pub const fn min_y(&self) -> i32 {
        self.min_y
    }

    fn index(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        let relative_y = y - self.min_y;
        if !(0..self.height).contains(&relative_y) {
            return None;
        }
        let relative_x = x & (CHUNK_WIDTH - 1);
        let relative_z = z & (CHUNK_WIDTH - 1);
        Some(((relative_y * CHUNK_WIDTH + relative_z) * CHUNK_WIDTH + relative_x) as usize)
    }

    /// Reads the cell at world coordinates. Out of range cells are empty.
    #[must_use]
    pub fn get(&self, x: i32, y: i32, z: i32) -> CellFlags {
        self.index(x, y, z)
            .map_or(CellFlags::empty(), |index| self.cells[index])
    }

    /// Writes the cell at world coordinates. Writes outside the column are ignored.
    pub fn set(&mut self, x: i32, y: i32, z: i32, flags: CellFlags) {
        if let Some(index) = self.index(x, y, z) {
            self.cells[index] = flags;
        } else {
            log::trace!("Ignoring write outside chunk {:?} at y={y}", self.pos);
        }
    }

    /// Fills the inclusive y range in every column of this chunk.
    pub fn fill_layers(&mut self, from_y: i32, to_y: i32, flags: CellFlags) {
        let base_x = self.pos.x() * CHUNK_WIDTH;
        let base_z = self.pos.z() * CHUNK_WIDTH;
        for y in from_y..=to_y {
            for dz in 0..CHUNK_WIDTH {
                for dx in 0..CHUNK_WIDTH {
                    self.set(base_x + dx, y, base_z + dz, flags);
                }
            }
        }
    }
}

impl VoxelView for LevelChunk {
    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.get(x, y, z).contains(CellFlags::SOLID)
    }

    fn has_fluid(&self, x: i32, y: i32, z: i32) -> bool {
        self.get(x, y, z).contains(CellFlags::FLUID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_is_air() {
        let chunk = LevelChunk::empty(ChunkPos::new(0, 0), 0, 256);
        assert!(!chunk.is_solid(0, -1, 0));
        assert!(!chunk.is_solid(0, 256, 0));
    }

    #[test]
    fn test_negative_chunk_indexing() {
        let mut chunk = LevelChunk::empty(ChunkPos::new(-1, -1), 0, 64);
        chunk.set(-1, 10, -16, CellFlags::SOLID);
        assert!(chunk.is_solid(-1, 10, -16));
        assert!(!chunk.is_solid(-2, 10, -16));
    }

    #[test]
    fn test_fill_layers() {
        let mut chunk = LevelChunk::empty(ChunkPos::new(2, 0), 0, 64);
        chunk.fill_layers(0, 3, CellFlags::SOLID);
        chunk.fill_layers(4, 5, CellFlags::FLUID);
        assert!(chunk.is_solid(32, 3, 15));
        assert!(chunk.has_fluid(47, 5, 0));
        assert!(!chunk.has_fluid(47, 6, 0));
    }
}
