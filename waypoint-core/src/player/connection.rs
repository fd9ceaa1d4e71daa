//! This module contains the `PlayerConnection` trait that abstracts the client link.
//!
//! The trait is object-safe so the host can plug in its network connection
//! while tests plug in a connection that records what was sent.

use waypoint_utils::math::Vector3;

/// An object-safe trait for player connections.
pub trait PlayerConnection: Send + Sync {
    /// Sends a system chat message to the client.
    fn send_system_message(&self, message: &str);

    /// Sends an absolute position update the client has to acknowledge with `id`.
    fn send_teleport(&self, id: i32, position: Vector3<f64>, yaw: f32, pitch: f32);
}
