use uuid::Uuid;
use waypoint_utils::Position;

use crate::{player::Player, teleport::TeleportError};

/// Where a teleport goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// A fixed location, adjusted upward for clearance before use.
    Fixed(Position),
    /// Wherever the player with this id stands when the teleport runs.
    Player(Uuid),
}

/// Why a pending teleport did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The player moved during the countdown.
    Moved,
    /// A newer teleport replaced this one.
    Superseded,
}

/// The terminal state of a teleport request.
#[derive(Debug, Clone, PartialEq)]
pub enum TeleportOutcome {
    /// The player was moved to this position.
    Succeeded(Position),
    /// The countdown was cancelled.
    Cancelled(CancelReason),
    /// The player disconnected, nothing was changed.
    Dropped,
    /// The teleport ran and failed.
    Failed(TeleportError),
}

impl TeleportOutcome {
    /// Whether the player arrived.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Continuation receiving the terminal state of a teleport.
pub type CompletionHook = Box<dyn FnOnce(&TeleportOutcome) + Send + 'static>;

/// What happens once a teleport reaches a terminal state.
///
/// The hook is called exactly once. A completion that is dropped without
/// being finished, for example because a world shut down mid-hop, reports
/// [`TeleportOutcome::Dropped`].
#[derive(Default)]
#[must_use]
pub struct Completion {
    message: Option<String>,
    hook: Option<CompletionHook>,
}

impl Completion {
    /// A completion with no message and no hook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Message sent to the player on arrival.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a continuation for every terminal state. Continuations run in
    /// the order they were added.
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&TeleportOutcome) + Send + 'static,
    {
        self.hook = Some(match self.hook.take() {
            Some(previous) => Box::new(move |outcome: &TeleportOutcome| {
                previous(outcome);
                hook(outcome);
            }),
            None => Box::new(hook),
        });
        self
    }

    /// Adds a continuation that only runs on arrival.
    pub fn on_success<F>(self, hook: F) -> Self
    where
        F: FnOnce(&Position) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let TeleportOutcome::Succeeded(position) = outcome {
                hook(position);
            }
        })
    }

    /// Throws the completion away without calling the continuation.
    pub(crate) fn discard(mut self) {
        self.hook = None;
    }

    /// Delivers `outcome` to the player and the continuation.
    pub(crate) fn finish(mut self, player: &Player, outcome: TeleportOutcome) {
        match &outcome {
            TeleportOutcome::Succeeded(position) => {
                log::info!("{} teleported to {position}", player.name);
                if let Some(message) = self.message.take() {
                    player.send_message(&message);
                }
            }
            TeleportOutcome::Failed(err) => {
                log::warn!("Teleport of {} failed: {err}", player.name);
                if !err.is_silent() {
                    player.send_message(&err.to_string());
                }
            }
            TeleportOutcome::Cancelled(reason) => {
                log::debug!("Teleport of {} cancelled: {reason:?}", player.name);
            }
            TeleportOutcome::Dropped => {
                log::debug!("Teleport of {} dropped", player.name);
            }
        }

        if let Some(hook) = self.hook.take() {
            hook(&outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook(&TeleportOutcome::Dropped);
        }
    }
}
