//! Per-player switches such as god mode, kept in one registry that is
//! flushed when the player leaves.

use bitflags::bitflags;
use scc::HashMap;
use uuid::Uuid;

bitflags! {
    /// Switches a player can have turned on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ToggleSet: u8 {
        /// Takes no damage.
        const GOD = 1;
        /// Sees private messages between other players.
        const SOCIAL_SPY = 1 << 1;
        /// Camera detached from the body.
        const FREECAM = 1 << 2;
    }
}

/// The toggles of every connected player.
#[derive(Default)]
pub struct PlayerToggles {
    toggles: HashMap<Uuid, ToggleSet>,
}

impl PlayerToggles {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The player's active toggles.
    #[must_use]
    pub fn get(&self, player: Uuid) -> ToggleSet {
        self.toggles
            .read_sync(&player, |_, set| *set)
            .unwrap_or_default()
    }

    /// Whether all of `toggles` are on for the player.
    #[must_use]
    pub fn is_on(&self, player: Uuid, toggles: ToggleSet) -> bool {
        self.get(player).contains(toggles)
    }

    /// Turns `toggles` on or off.
    pub fn set(&self, player: Uuid, toggles: ToggleSet, on: bool) {
        let updated = self.toggles.update_sync(&player, |_, set| {
            set.set(toggles, on);
            set.is_empty()
        });
        match updated {
            Some(true) => {
                let _ = self.toggles.remove_if_sync(&player, |set| set.is_empty());
            }
            Some(false) => {}
            None if on => {
                if self.toggles.insert_sync(player, toggles).is_err() {
                    // Inserted concurrently
                    self.set(player, toggles, on);
                }
            }
            None => {}
        }
    }

    /// Flips `toggles` and returns whether they are now on.
    pub fn toggle(&self, player: Uuid, toggles: ToggleSet) -> bool {
        let on = !self.is_on(player, toggles);
        self.set(player, toggles, on);
        on
    }

    /// Players with all of `toggles` on.
    #[must_use]
    pub fn players_with(&self, toggles: ToggleSet) -> Vec<Uuid> {
        let mut players = Vec::new();
        self.toggles.iter_sync(|uuid, set| {
            if set.contains(toggles) {
                players.push(*uuid);
            }
            true
        });
        players
    }

    /// Turns everything off for a disconnecting player.
    pub fn on_player_quit(&self, player: Uuid) {
        if let Some((_, set)) = self.toggles.remove_sync(&player) {
            log::debug!("Cleared toggles {set:?} of {player}");
        }
    }
}
