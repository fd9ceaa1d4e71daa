//! Shared value types for the waypoint crates.
//!
//! Everything in here is plain data: cheap to copy or clone and safe to move
//! between world contexts.

pub mod math;
pub mod types;

pub use types::{BlockPos, ChunkPos, Position};
