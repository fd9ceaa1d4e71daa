//! Named locations: per-player homes, server warps and the spawn point.
//!
//! The books hold plain values and can be exported to and imported from
//! their serde forms by whatever persistence layer the host uses.

use std::{collections::BTreeMap, sync::Arc};

use arc_swap::ArcSwapOption;
use rustc_hash::FxHashMap;
use scc::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use waypoint_utils::Position;

/// Longest allowed home or warp name.
pub const MAX_NAME_LENGTH: usize = 16;
/// Home used when a player does not name one.
pub const DEFAULT_HOME_NAME: &str = "home";

/// Errors for named location operations. The display text is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The name is empty.
    #[error("Name cannot be empty.")]
    EmptyName,
    /// The name is longer than [`MAX_NAME_LENGTH`].
    #[error("Name cannot be longer than {max} characters.")]
    NameTooLong {
        /// The longest allowed name.
        max: usize,
    },
    /// The name contains something other than ASCII letters and digits.
    #[error("Name can only contain letters and numbers.")]
    InvalidName,
    /// The player holds no home tier at all.
    #[error("You do not have permission to set homes.")]
    NoHomeTier,
    /// The player already has as many homes as their tier allows.
    #[error("You have reached the maximum of {max} homes.")]
    HomeLimitReached {
        /// The player's limit.
        max: u32,
    },
    /// No home with that name.
    #[error("Home '{0}' does not exist.")]
    UnknownHome(String),
    /// No warp with that name.
    #[error("Warp '{0}' does not exist.")]
    UnknownWarp(String),
    /// The spawn point has not been set.
    #[error("Spawn has not been set.")]
    NoSpawn,
}

/// Checks a home or warp name and returns its canonical lowercase form.
pub fn normalize_name(name: &str) -> Result<String, LocationError> {
    if name.is_empty() {
        return Err(LocationError::EmptyName);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(LocationError::NameTooLong {
            max: MAX_NAME_LENGTH,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LocationError::InvalidName);
    }
    Ok(name.to_ascii_lowercase())
}

/// The homes of one player, in their stored form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerHomes {
    /// Homes by lowercase name.
    pub homes: BTreeMap<String, Position>,
}

/// Homes of every player, with limits per permission tier.
pub struct HomeBook {
    homes: HashMap<Uuid, PlayerHomes>,
    limits: FxHashMap<String, u32>,
}

impl HomeBook {
    /// Creates an empty book. `limits` maps tier names to home counts.
    #[must_use]
    pub fn new(limits: FxHashMap<String, u32>) -> Self {
        Self {
            homes: HashMap::new(),
            limits,
        }
    }

    /// The highest limit among the tiers the player holds, 0 if none.
    pub fn max_homes(&self, has_tier: impl Fn(&str) -> bool) -> u32 {
        self.limits
            .iter()
            .filter(|(tier, _)| has_tier(tier))
            .map(|(_, limit)| *limit)
            .max()
            .unwrap_or(0)
    }

    /// Sets or moves a home. Moving an existing home never counts against the limit.
    pub fn set(
        &self,
        player: Uuid,
        name: &str,
        position: Position,
        has_tier: impl Fn(&str) -> bool,
    ) -> Result<(), LocationError> {
        let name = normalize_name(name)?;
        let max = self.max_homes(has_tier);
        let check = |homes: &PlayerHomes| {
            if homes.homes.contains_key(&name) || homes.homes.len() < max as usize {
                Ok(())
            } else if max == 0 {
                Err(LocationError::NoHomeTier)
            } else {
                Err(LocationError::HomeLimitReached { max })
            }
        };

        let mut position = Some(position);
        loop {
            let updated = self.homes.update_sync(&player, |_, homes| {
                check(homes)?;
                if let Some(position) = position.take() {
                    homes.homes.insert(name.clone(), position);
                }
                Ok(())
            });
            if let Some(result) = updated {
                return result;
            }

            let mut fresh = PlayerHomes::default();
            check(&fresh)?;
            if let Some(position) = position.take() {
                fresh.homes.insert(name.clone(), position);
            }
            match self.homes.insert_sync(player, fresh) {
                Ok(()) => return Ok(()),
                Err((_, mut rejected)) => {
                    // Created concurrently, retry against that entry
                    position = rejected.homes.remove(&name);
                }
            }
        }
    }

    /// Looks up a home by name, ignoring case.
    #[must_use]
    pub fn get(&self, player: Uuid, name: &str) -> Option<Position> {
        let name = name.to_ascii_lowercase();
        self.homes
            .read_sync(&player, |_, homes| homes.homes.get(&name).cloned())
            .flatten()
    }

    /// Deletes a home. Returns whether it existed.
    pub fn delete(&self, player: Uuid, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.homes
            .update_sync(&player, |_, homes| homes.homes.remove(&name).is_some())
            .unwrap_or(false)
    }

    /// Names of the player's homes, sorted.
    #[must_use]
    pub fn list(&self, player: Uuid) -> Vec<String> {
        self.homes
            .read_sync(&player, |_, homes| homes.homes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the player's homes for storage.
    #[must_use]
    pub fn export(&self, player: Uuid) -> PlayerHomes {
        self.homes
            .read_sync(&player, |_, homes| homes.clone())
            .unwrap_or_default()
    }

    /// Replaces the player's homes with stored ones.
    pub fn import(&self, player: Uuid, homes: PlayerHomes) {
        let _ = self.homes.remove_sync(&player);
        let _ = self.homes.insert_sync(player, homes);
    }
}

/// Server-wide warps.
#[derive(Default)]
pub struct WarpBook {
    warps: HashMap<String, Position>,
}

impl WarpBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a warp. Returns `true` if an existing warp was moved.
    pub fn set(&self, name: &str, position: Position) -> Result<bool, LocationError> {
        let name = normalize_name(name)?;
        let mut position = Some(position);
        loop {
            let moved = self.warps.update_sync(&name, |_, stored| {
                if let Some(position) = position.take() {
                    *stored = position;
                }
            });
            if moved.is_some() {
                return Ok(true);
            }
            let Some(new) = position.take() else {
                return Ok(true);
            };
            match self.warps.insert_sync(name.clone(), new) {
                Ok(()) => return Ok(false),
                Err((_, rejected)) => position = Some(rejected),
            }
        }
    }

    /// Looks up a warp by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Position> {
        self.warps
            .read_sync(&name.to_ascii_lowercase(), |_, position| position.clone())
    }

    /// Deletes a warp. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.warps
            .remove_sync(&name.to_ascii_lowercase())
            .is_some()
    }

    /// Names of all warps, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.warps.iter_sync(|name, _| {
            names.push(name.clone());
            true
        });
        names.sort();
        names
    }

    /// Copy of all warps for storage.
    #[must_use]
    pub fn export(&self) -> BTreeMap<String, Position> {
        let mut warps = BTreeMap::new();
        self.warps.iter_sync(|name, position| {
            warps.insert(name.clone(), position.clone());
            true
        });
        warps
    }

    /// Adds stored warps, replacing existing ones with the same name.
    pub fn import(&self, warps: BTreeMap<String, Position>) {
        for (name, position) in warps {
            let _ = self.warps.remove_sync(&name);
            let _ = self.warps.insert_sync(name, position);
        }
    }
}

/// The server spawn point.
#[derive(Default)]
pub struct SpawnPoint {
    position: ArcSwapOption<Position>,
}

impl SpawnPoint {
    /// Creates an unset spawn point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the spawn point.
    pub fn set(&self, position: Position) {
        self.position.store(Some(Arc::new(position)));
    }

    /// The spawn point, if set.
    #[must_use]
    pub fn get(&self) -> Option<Position> {
        self.position.load_full().map(|position| (*position).clone())
    }

    /// Unsets the spawn point.
    pub fn clear(&self) {
        self.position.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64) -> Position {
        Position::new("default", x, 64.0, 0.0, 0.0, 0.0)
    }

    fn book() -> HomeBook {
        let mut limits = FxHashMap::default();
        limits.insert("default".to_owned(), 2);
        limits.insert("vip".to_owned(), 5);
        HomeBook::new(limits)
    }

    #[test]
    fn test_name_rules() {
        assert_eq!(normalize_name("Base1"), Ok("base1".to_owned()));
        assert_eq!(normalize_name(""), Err(LocationError::EmptyName));
        assert_eq!(
            normalize_name("abcdefghijklmnopq"),
            Err(LocationError::NameTooLong { max: 16 })
        );
        assert_eq!(normalize_name("my home"), Err(LocationError::InvalidName));
        assert_eq!(normalize_name("héllo"), Err(LocationError::InvalidName));
    }

    #[test]
    fn test_highest_tier_wins() {
        let book = book();
        assert_eq!(book.max_homes(|tier| tier == "default"), 2);
        assert_eq!(book.max_homes(|_| true), 5);
        assert_eq!(book.max_homes(|_| false), 0);
    }

    #[test]
    fn test_limit_and_overwrite() {
        let book = book();
        let player = Uuid::new_v4();
        let default_tier = |tier: &str| tier == "default";

        assert_eq!(book.set(player, "One", at(1.0), default_tier), Ok(()));
        assert_eq!(book.set(player, "two", at(2.0), default_tier), Ok(()));
        assert_eq!(
            book.set(player, "three", at(3.0), default_tier),
            Err(LocationError::HomeLimitReached { max: 2 })
        );
        // Moving an existing home is always allowed
        assert_eq!(book.set(player, "ONE", at(9.0), default_tier), Ok(()));
        assert_eq!(book.get(player, "one"), Some(at(9.0)));
        assert_eq!(book.list(player), vec!["one".to_owned(), "two".to_owned()]);
    }

    #[test]
    fn test_no_tier_means_no_homes() {
        let book = book();
        assert_eq!(
            book.set(Uuid::new_v4(), "home", at(1.0), |_| false),
            Err(LocationError::NoHomeTier)
        );
    }

    #[test]
    fn test_delete_and_export() {
        let book = book();
        let player = Uuid::new_v4();
        book.set(player, "home", at(1.0), |_| true).expect("within limit");
        let stored = book.export(player);

        assert!(book.delete(player, "HOME"));
        assert!(!book.delete(player, "home"));
        assert!(book.get(player, "home").is_none());

        book.import(player, stored);
        assert_eq!(book.get(player, "home"), Some(at(1.0)));
    }

    #[test]
    fn test_warps() {
        let warps = WarpBook::new();
        assert_eq!(warps.set("Market", at(1.0)), Ok(false));
        assert_eq!(warps.set("market", at(2.0)), Ok(true));
        assert_eq!(warps.get("MARKET"), Some(at(2.0)));
        assert!(warps.set("bad name", at(3.0)).is_err());

        let stored = warps.export();
        assert!(warps.delete("market"));
        assert!(warps.list().is_empty());
        warps.import(stored);
        assert_eq!(warps.list(), vec!["market".to_owned()]);
    }

    #[test]
    fn test_spawn_point() {
        let spawn = SpawnPoint::new();
        assert!(spawn.get().is_none());
        spawn.set(at(4.0));
        assert_eq!(spawn.get(), Some(at(4.0)));
        spawn.clear();
        assert!(spawn.get().is_none());
    }
}
