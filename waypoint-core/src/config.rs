//! Travel settings, read from a json5 file.

use std::{fs, io, path::Path, time::Duration};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::safe_location::DEFAULT_MAX_ATTEMPTS;

/// The config file written when none exists.
pub const DEFAULT_CONFIG: &str = include_str!("../../package-content/waypoint_config.json5");

/// Errors while loading the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("could not access config file: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid json5 or has the wrong shape.
    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_json5::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// All travel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TravelConfig {
    /// Worlds created when the server starts.
    pub worlds: Vec<String>,
    /// Countdown settings.
    pub teleport: TeleportConfig,
    /// Teleport request settings.
    pub tpa: TpaConfig,
    /// Random teleport settings.
    pub rtp: RtpConfig,
    /// Home settings.
    pub homes: HomesConfig,
}

/// Countdown settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeleportConfig {
    /// Seconds before a queued teleport runs. 0 disables the countdown.
    pub delay: u64,
}

/// Teleport request settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TpaConfig {
    /// Seconds a request stays valid.
    pub expiration: u64,
}

/// Random teleport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    /// Seconds between random teleports of one player.
    pub cooldown: u64,
    /// World used when the player's world has no radius.
    pub default_world: String,
    /// Radius per world name.
    pub worlds: FxHashMap<String, i32>,
    /// Columns tried per random teleport.
    pub max_attempts: u32,
}

/// Home settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HomesConfig {
    /// Homes allowed per permission tier.
    pub limits: FxHashMap<String, u32>,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            worlds: vec!["default".to_owned()],
            teleport: TeleportConfig::default(),
            tpa: TpaConfig::default(),
            rtp: RtpConfig::default(),
            homes: HomesConfig::default(),
        }
    }
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self { delay: 3 }
    }
}

impl Default for TpaConfig {
    fn default() -> Self {
        Self { expiration: 60 }
    }
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            cooldown: 300,
            default_world: "default".to_owned(),
            worlds: FxHashMap::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for HomesConfig {
    fn default() -> Self {
        let mut limits = FxHashMap::default();
        limits.insert("default".to_owned(), 3);
        Self { limits }
    }
}

impl TravelConfig {
    /// Reads the config at `path`, writing the default file there first if it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            Self::parse(&fs::read_to_string(path)?)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, DEFAULT_CONFIG)?;
            log::info!("Wrote default config to {}", path.display());
            Self::parse(DEFAULT_CONFIG)?
        };
        Ok(config)
    }

    /// Parses and validates json5 config text.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json5::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rtp.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "rtp.max_attempts must be at least 1".to_owned(),
            ));
        }
        if let Some((world, radius)) = self.rtp.worlds.iter().find(|(_, radius)| **radius <= 0) {
            return Err(ConfigError::Invalid(format!(
                "rtp radius of world {world} must be positive, got {radius}"
            )));
        }
        Ok(())
    }

    /// The countdown length.
    #[must_use]
    pub const fn teleport_delay(&self) -> Duration {
        Duration::from_secs(self.teleport.delay)
    }

    /// How long a teleport request stays valid.
    #[must_use]
    pub const fn tpa_expiration(&self) -> Duration {
        Duration::from_secs(self.tpa.expiration)
    }
}
