//! # Waypoint core
//!
//! Teleport coordination and safe placement for a multi-world game server.
//!
//! Each [`World`](world::World) owns a serial task context. Every read or
//! write of live player state happens inside the context of the world the
//! player is currently in; cross-world work hops between contexts by
//! submitting continuations and never blocks one context on another.
//!
//! The [`TeleportManager`](teleport::TeleportManager) is the single funnel
//! all travel goes through. The stores ([`back`], [`tpa`]) only hold plain
//! values keyed by player identity and may be used from any context.

pub mod back;
pub mod chunk;
pub mod config;
pub mod locations;
pub mod player;
pub mod rtp;
pub mod safe_location;
pub mod service;
pub mod teleport;
pub mod toggles;
pub mod tpa;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::TravelConfig;
pub use service::TravelService;
pub use world::{Universe, World};
