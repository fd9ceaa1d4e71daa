//! Cardinal snapping of the yaw applied on arrival.
//!
//! Arriving at an off-axis or downward angle renders badly on the client,
//! so every teleport faces one of the four compass directions.

use std::f32::consts::{FRAC_PI_2, PI};

/// Yaw facing north, in radians.
pub const YAW_NORTH: f32 = 0.0;
/// Yaw facing east, in radians.
pub const YAW_EAST: f32 = -FRAC_PI_2;
/// Yaw facing south, in radians.
pub const YAW_SOUTH: f32 = PI;
/// Yaw facing west, in radians.
pub const YAW_WEST: f32 = FRAC_PI_2;

/// Rounds a yaw in radians to the nearest cardinal direction.
#[must_use]
pub fn snap_to_cardinal(yaw: f32) -> f32 {
    let mut degrees = yaw.to_degrees() % 360.0;
    if degrees > 180.0 {
        degrees -= 360.0;
    } else if degrees < -180.0 {
        degrees += 360.0;
    }

    if (-45.0..45.0).contains(&degrees) {
        YAW_NORTH
    } else if (45.0..135.0).contains(&degrees) {
        YAW_WEST
    } else if !(-135.0..135.0).contains(&degrees) {
        YAW_SOUTH
    } else {
        YAW_EAST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapped_degrees(degrees: f32) -> f32 {
        snap_to_cardinal(degrees.to_radians()).to_degrees()
    }

    #[test]
    fn test_cardinal_buckets() {
        for (input, expected) in [
            (10.0, 0.0),
            (80.0, 90.0),
            (170.0, 180.0),
            (-170.0, 180.0),
            (-100.0, -90.0),
            (-44.0, 0.0),
        ] {
            let snapped = snapped_degrees(input);
            assert!(
                (snapped - expected).abs() < 1e-3,
                "{input} snapped to {snapped}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_wraps_full_turns() {
        assert!((snapped_degrees(370.0) - 0.0).abs() < 1e-3);
        assert!((snapped_degrees(-290.0) - 90.0).abs() < 1e-3);
        assert!((snapped_degrees(530.0) - 180.0).abs() < 1e-3);
    }
}
