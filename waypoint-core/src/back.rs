//! Last location per player, used to return after a teleport.

use scc::HashMap;
use uuid::Uuid;
use waypoint_utils::Position;

/// The location each player would return to.
///
/// Entries live until they are overwritten, consumed or the player leaves.
/// Safe to use from any world context.
#[derive(Default)]
pub struct BackLocationStore {
    locations: HashMap<Uuid, Position>,
}

impl BackLocationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers `position`, replacing whatever was stored.
    pub fn save(&self, player: Uuid, position: Position) {
        let mut position = Some(position);
        self.locations.update_sync(&player, |_, stored| {
            if let Some(position) = position.take() {
                *stored = position;
            }
        });
        if let Some(position) = position {
            let _ = self.locations.insert_sync(player, position);
        }
    }

    /// The stored location, left in place.
    #[must_use]
    pub fn peek(&self, player: Uuid) -> Option<Position> {
        self.locations.read_sync(&player, |_, position| position.clone())
    }

    /// Removes and returns the stored location.
    pub fn consume(&self, player: Uuid) -> Option<Position> {
        self.locations
            .remove_sync(&player)
            .map(|(_, position)| position)
    }

    /// Removes the stored location.
    pub fn clear(&self, player: Uuid) {
        self.locations.remove_sync(&player);
    }

    /// Removes the stored location only if it still equals `expected`.
    pub fn clear_if(&self, player: Uuid, expected: &Position) -> bool {
        self.locations
            .remove_if_sync(&player, |position| *position == *expected)
            .is_some()
    }

    /// Forgets everything about a disconnecting player.
    pub fn on_player_quit(&self, player: Uuid) {
        if self.locations.remove_sync(&player).is_some() {
            log::debug!("Cleared back location of {player}");
        }
    }

    /// Number of players with a stored location.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no location is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
