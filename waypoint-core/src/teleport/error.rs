use thiserror::Error;

/// Why a teleport could not be carried out.
///
/// The display text is what the player is shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeleportError {
    /// The player disconnected or their entity was removed.
    #[error("You are no longer connected.")]
    HandleInvalid,
    /// The destination world is unknown to the server.
    #[error("World '{world}' is not loaded.")]
    WorldNotLoaded {
        /// The requested world.
        world: String,
    },
    /// The resolver ran out of candidates.
    #[error("Could not find a safe location after {attempts} attempts.")]
    NoSafePosition {
        /// How many candidates were tried.
        attempts: u32,
    },
    /// The player being followed left before the teleport ran.
    #[error("That player is no longer available.")]
    TargetUnavailable,
}

impl TeleportError {
    /// Errors nobody can be told about.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::HandleInvalid)
    }
}
