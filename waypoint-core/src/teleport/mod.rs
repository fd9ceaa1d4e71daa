//! This module contains the `TeleportManager`, the funnel every teleport goes through.
//!
//! A delayed teleport waits out a countdown, then checks on the player's
//! current world whether they are still connected and standing where they
//! started. Only then does it execute. Execution resolves the destination on
//! the destination's world and applies the move on the player's world, see
//! [`pipeline`].

mod error;
mod outcome;
mod pipeline;
pub mod rotation;

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use scc::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waypoint_utils::{Position, math::Vector3};

pub use error::TeleportError;
pub use outcome::{CancelReason, Completion, CompletionHook, Destination, TeleportOutcome};

use crate::{
    player::Player,
    teleport::pipeline::TeleportPipeline,
    world::{Universe, World},
};

/// Squared distance above which a player counts as having moved.
pub const MOVEMENT_EPSILON: f64 = 1e-7;

struct PendingTeleport {
    ticket: u64,
    cancel: CancellationToken,
}

/// Coordinates delayed and instant teleports.
pub struct TeleportManager {
    universe: Arc<Universe>,
    delay: Duration,
    pending: HashMap<Uuid, PendingTeleport>,
    next_ticket: AtomicU64,
}

impl TeleportManager {
    /// Creates a manager whose countdowns last `delay`. A zero delay teleports immediately.
    #[must_use]
    pub fn new(universe: Arc<Universe>, delay: Duration) -> Self {
        Self {
            universe,
            delay,
            pending: HashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// The countdown length.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// The universe teleports resolve worlds and players in.
    #[must_use]
    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// Whether a countdown is running for the player.
    #[must_use]
    pub fn has_pending(&self, uuid: Uuid) -> bool {
        self.pending.read_sync(&uuid, |_, _| ()).is_some()
    }

    /// Teleports `player` to `destination` once the countdown ends.
    ///
    /// Replaces any countdown already running for the player. The teleport is
    /// cancelled if the player is no longer at `start` when the countdown ends.
    pub fn queue_delayed_teleport(
        self: &Arc<Self>,
        player: &Arc<Player>,
        start: Vector3<f64>,
        destination: Position,
        completion: Completion,
    ) {
        self.queue(player, start, Destination::Fixed(destination), completion);
    }

    /// Like [`queue_delayed_teleport`](Self::queue_delayed_teleport), but the
    /// destination is wherever `target` stands when the countdown ends.
    pub fn queue_delayed_teleport_to_player(
        self: &Arc<Self>,
        player: &Arc<Player>,
        start: Vector3<f64>,
        target: Uuid,
        completion: Completion,
    ) {
        self.queue(player, start, Destination::Player(target), completion);
    }

    /// Teleports `player` without a countdown.
    ///
    /// A player that is gone or a world that is not loaded is reported right
    /// away and the completion is discarded without being called. Later
    /// failures are reported through the completion.
    #[allow(clippy::too_many_arguments)]
    pub fn teleport_instant(
        &self,
        player: &Arc<Player>,
        world: &str,
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        completion: Completion,
    ) -> Result<(), TeleportError> {
        let destination = Destination::Fixed(Position::new(world, x, y, z, yaw, pitch));
        match TeleportPipeline::plan(
            Arc::clone(&self.universe),
            Arc::clone(player),
            destination,
            completion,
        ) {
            Ok(pipeline) => {
                pipeline.run();
                Ok(())
            }
            Err((err, completion)) => {
                completion.discard();
                Err(err)
            }
        }
    }

    /// Drops the pending countdown of a disconnecting player.
    pub fn on_player_quit(&self, uuid: Uuid) {
        if let Some((_, pending)) = self.pending.remove_sync(&uuid) {
            log::debug!("Dropping pending teleport of {uuid}");
            pending.cancel.cancel();
        }
    }

    fn queue(
        self: &Arc<Self>,
        player: &Arc<Player>,
        start: Vector3<f64>,
        destination: Destination,
        completion: Completion,
    ) {
        if self.delay.is_zero() {
            self.execute(player, destination, completion);
            return;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let replaced = self.pending.update_sync(&player.uuid, |_, pending| {
            std::mem::replace(
                pending,
                PendingTeleport {
                    ticket,
                    cancel: cancel.clone(),
                },
            )
        });
        match replaced {
            Some(previous) => {
                log::debug!("Teleport of {} superseded", player.name);
                previous.cancel.cancel();
            }
            None => {
                let _ = self.pending.insert_sync(
                    player.uuid,
                    PendingTeleport {
                        ticket,
                        cancel: cancel.clone(),
                    },
                );
            }
        }
        log::debug!(
            "Teleport of {} queued, {}s countdown",
            player.name,
            self.delay.as_secs_f32()
        );

        let manager = Arc::clone(self);
        let player = Arc::clone(player);
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    let outcome = if player.is_valid() {
                        TeleportOutcome::Cancelled(CancelReason::Superseded)
                    } else {
                        TeleportOutcome::Dropped
                    };
                    completion.finish(&player, outcome);
                }
                () = tokio::time::sleep(manager.delay) => {
                    manager.countdown_elapsed(player, ticket, start, destination, completion);
                }
            }
        });
    }

    fn countdown_elapsed(
        self: Arc<Self>,
        player: Arc<Player>,
        ticket: u64,
        start: Vector3<f64>,
        destination: Destination,
        completion: Completion,
    ) {
        if !player.is_valid() {
            self.forget(player.uuid, ticket);
            completion.finish(&player, TeleportOutcome::Dropped);
            return;
        }

        let world = player.world();
        let manager = Arc::clone(&self);
        let uuid = player.uuid;
        let submitted = world.submit(move |world| {
            manager.check_and_execute(world, &player, ticket, start, destination, completion);
        });
        if let Err(err) = submitted {
            log::warn!("Countdown for {uuid} could not run: {err}");
            self.forget(uuid, ticket);
        }
    }

    /// Runs on the player's world once the countdown is over.
    fn check_and_execute(
        &self,
        world: &Arc<World>,
        player: &Arc<Player>,
        ticket: u64,
        start: Vector3<f64>,
        destination: Destination,
        completion: Completion,
    ) {
        let current = self.forget(player.uuid, ticket);

        if !player.is_valid() {
            completion.finish(player, TeleportOutcome::Dropped);
            return;
        }
        if !current {
            completion.finish(player, TeleportOutcome::Cancelled(CancelReason::Superseded));
            return;
        }
        let moved = !player.world().same_as(world)
            || player.position().squared_distance(&start) > MOVEMENT_EPSILON;
        if moved {
            completion.finish(player, TeleportOutcome::Cancelled(CancelReason::Moved));
            return;
        }

        self.execute(player, destination, completion);
    }

    fn execute(&self, player: &Arc<Player>, destination: Destination, completion: Completion) {
        match TeleportPipeline::plan(
            Arc::clone(&self.universe),
            Arc::clone(player),
            destination,
            completion,
        ) {
            Ok(pipeline) => pipeline.run(),
            Err((err, completion)) => completion.finish(player, TeleportOutcome::Failed(err)),
        }
    }

    /// Removes the pending entry if it still belongs to `ticket`.
    fn forget(&self, uuid: Uuid, ticket: u64) -> bool {
        self.pending
            .remove_if_sync(&uuid, |pending| pending.ticket == ticket)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        chunk::{ChunkMode, RamChunkStorage},
        test_support::{RecordingConnection, TestServer, recorded, settle},
    };

    const DELAY: Duration = Duration::from_secs(3);

    fn manager(server: &TestServer, delay: Duration) -> Arc<TeleportManager> {
        Arc::new(TeleportManager::new(Arc::clone(&server.universe), delay))
    }

    fn origin() -> Vector3<f64> {
        Vector3::new(0.5, 64.0, 0.5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_teleport_arrives_once() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        let started = tokio::time::Instant::now();
        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0),
            completion.with_message("Whoosh"),
        );
        assert!(teleports.has_pending(player.uuid));

        let outcome = outcomes.recv().await.expect("teleport finishes");
        assert!(started.elapsed() >= DELAY);
        assert_eq!(
            outcome,
            TeleportOutcome::Succeeded(Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0))
        );
        assert_eq!(player.position(), Vector3::new(10.0, 64.0, 10.0));
        assert!(connection.received("Whoosh"));
        assert!(!teleports.has_pending(player.uuid));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(outcomes.recv().await.is_none());
        assert_eq!(connection.teleports().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_is_raised_out_of_the_ground() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 30.0, 10.0, 0.0, 0.0),
            completion,
        );

        let outcome = outcomes.recv().await.expect("teleport finishes");
        assert!(outcome.is_success());
        assert_eq!(player.position(), Vector3::new(10.0, 64.0, 10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_cancels_countdown() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0),
            completion.with_message("Whoosh"),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        let moved = Vector3::new(5.5, 64.0, 0.5);
        player.handle_move(moved, 0.0, 0.0);

        let outcome = outcomes.recv().await.expect("teleport finishes");
        assert_eq!(outcome, TeleportOutcome::Cancelled(CancelReason::Moved));
        assert_eq!(player.position(), moved);
        assert!(connection.messages().is_empty());
        assert!(connection.teleports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_supersedes_pending_one() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (first, mut first_outcomes) = recorded();
        let (second, mut second_outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0),
            first,
        );
        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", -10.0, 64.0, -10.0, 0.0, 0.0),
            second,
        );

        assert_eq!(
            first_outcomes.recv().await,
            Some(TeleportOutcome::Cancelled(CancelReason::Superseded))
        );
        let outcome = second_outcomes.recv().await.expect("second teleport finishes");
        assert!(outcome.is_success());
        assert_eq!(player.position(), Vector3::new(-10.0, 64.0, -10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_drops_countdown() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0),
            completion,
        );
        server.universe.disconnect(player.uuid);
        teleports.on_player_quit(player.uuid);

        assert_eq!(outcomes.recv().await, Some(TeleportOutcome::Dropped));
        assert!(connection.teleports().is_empty());
        assert!(!teleports.has_pending(player.uuid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_quit_hook_is_noticed_after_countdown() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0),
            completion,
        );
        server.universe.disconnect(player.uuid);

        assert_eq!(outcomes.recv().await, Some(TeleportOutcome::Dropped));
        assert!(!teleports.has_pending(player.uuid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_world_teleport_loads_destination() {
        let server = TestServer::flat(&["a"]);
        let b_chunks = Arc::new(RamChunkStorage::flat(ChunkMode::LoadOnDemand, 70));
        let b = server.add_world("b", b_chunks.clone());
        let a = server.world("a");
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("b", 10.0, 64.0, 10.0, 0.0, 0.0),
            completion,
        );

        let outcome = outcomes.recv().await.expect("teleport finishes");
        assert_eq!(
            outcome,
            TeleportOutcome::Succeeded(Position::new("b", 10.0, 71.0, 10.0, 0.0, 0.0))
        );
        assert!(player.world().same_as(&b));
        assert!(b.players.read_sync(&player.uuid, |_, _| ()).is_some());
        assert!(a.players.read_sync(&player.uuid, |_, _| ()).is_none());
        assert_eq!(b_chunks.resident_count(), 1);
        assert_eq!(player.current_position().world, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_between_hops_leaves_no_membership() {
        let server = TestServer::flat(&["a", "b"]);
        let a = server.world("a");
        let b = server.world("b");
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports
            .teleport_instant(&player, "b", 10.0, 64.0, 10.0, 0.0, 0.0, completion)
            .expect("player and world are there");
        // Queued on "a" ahead of the apply step, which is only submitted once "b" resolved
        let universe = Arc::clone(&server.universe);
        let uuid = player.uuid;
        a.submit(move |_| {
            universe.disconnect(uuid);
        })
        .expect("world context is running");

        let outcome = outcomes.recv().await.expect("teleport finishes");
        assert_eq!(outcome, TeleportOutcome::Failed(TeleportError::HandleInvalid));
        assert!(a.players.read_sync(&uuid, |_, _| ()).is_none());
        assert!(b.players.read_sync(&uuid, |_, _| ()).is_none());
        assert!(player.world().same_as(&a));
        assert!(connection.teleports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_target_uses_position_at_execution() {
        let server = TestServer::flat(&["a", "b"]);
        let teleports = manager(&server, DELAY);
        let alice_connection = RecordingConnection::new();
        let bob_connection = RecordingConnection::new();
        let alice = server.connect("Alice", &alice_connection, "a", origin());
        let bob = server.connect("Bob", &bob_connection, "b", Vector3::new(3.0, 64.0, 3.0));
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport_to_player(&alice, alice.position(), bob.uuid, completion);

        tokio::time::sleep(Duration::from_secs(1)).await;
        // Looking up and to the left should not carry over
        bob.handle_move(Vector3::new(20.0, 64.0, -4.0), 80f32.to_radians(), -0.5);

        let outcome = outcomes.recv().await.expect("teleport finishes");
        let TeleportOutcome::Succeeded(arrived) = outcome else {
            panic!("teleport failed: {outcome:?}");
        };
        assert_eq!(arrived.world, "b");
        assert_eq!(alice.position(), Vector3::new(20.0, 64.0, -4.0));
        assert!((arrived.yaw - rotation::YAW_WEST).abs() < f32::EPSILON);
        assert!(arrived.pitch.abs() < f32::EPSILON);
        assert!(alice.world().same_as(&server.world("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_target_gone_fails() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let alice_connection = RecordingConnection::new();
        let alice = server.connect("Alice", &alice_connection, "a", origin());
        let bob = server.connect("Bob", &RecordingConnection::new(), "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport_to_player(&alice, alice.position(), bob.uuid, completion);
        server.universe.disconnect(bob.uuid);

        assert_eq!(
            outcomes.recv().await,
            Some(TeleportOutcome::Failed(TeleportError::TargetUnavailable))
        );
        assert!(alice_connection.received(&TeleportError::TargetUnavailable.to_string()));
        assert_eq!(alice.position(), origin());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_world_fails_after_countdown() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("nether", 0.0, 64.0, 0.0, 0.0, 0.0),
            completion,
        );

        assert_eq!(
            outcomes.recv().await,
            Some(TeleportOutcome::Failed(TeleportError::WorldNotLoaded {
                world: "nether".to_owned()
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_teleports_immediately() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, Duration::ZERO);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());
        let (completion, mut outcomes) = recorded();

        let started = tokio::time::Instant::now();
        teleports.queue_delayed_teleport(
            &player,
            player.position(),
            Position::new("a", 10.0, 64.0, 10.0, 0.0, 0.0),
            completion,
        );
        assert!(!teleports.has_pending(player.uuid));

        assert!(outcomes.recv().await.is_some_and(|o| o.is_success()));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_teleport_preflight_errors_skip_hook() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());

        let (completion, mut outcomes) = recorded();
        let result =
            teleports.teleport_instant(&player, "nether", 0.0, 64.0, 0.0, 0.0, 0.0, completion);
        assert_eq!(
            result,
            Err(TeleportError::WorldNotLoaded {
                world: "nether".to_owned()
            })
        );
        assert!(outcomes.recv().await.is_none());

        server.universe.disconnect(player.uuid);
        let (completion, mut outcomes) = recorded();
        let result = teleports.teleport_instant(&player, "a", 0.0, 64.0, 0.0, 0.0, 0.0, completion);
        assert_eq!(result, Err(TeleportError::HandleInvalid));
        assert!(outcomes.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_teleport_snaps_rotation_and_resets_ack() {
        let server = TestServer::flat(&["a"]);
        let teleports = manager(&server, DELAY);
        let connection = RecordingConnection::new();
        let player = server.connect("Alice", &connection, "a", origin());

        for _ in 0..2 {
            let (completion, mut outcomes) = recorded();
            teleports
                .teleport_instant(
                    &player,
                    "a",
                    5.0,
                    20.0,
                    5.0,
                    170f32.to_radians(),
                    1.2,
                    completion,
                )
                .expect("world is loaded");
            assert!(outcomes.recv().await.is_some_and(|o| o.is_success()));
        }
        settle(&server.world("a")).await;

        let sent = connection.teleports();
        assert_eq!(sent.len(), 2);
        // The unacknowledged first teleport does not push the second id forward
        assert!(sent.iter().all(|teleport| teleport.id == 1));
        let last = sent[1];
        assert_eq!(last.position, Vector3::new(5.0, 64.0, 5.0));
        assert!((last.yaw - rotation::YAW_SOUTH).abs() < f32::EPSILON);
        assert!(last.pitch.abs() < f32::EPSILON);
    }
}
