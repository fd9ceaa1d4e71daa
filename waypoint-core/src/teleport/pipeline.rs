//! The ordered steps a teleport runs through, each pinned to a world context.
//!
//! A pipeline runs every step whose world is the current context inline and
//! hops to the next step's world by submitting itself there. The player is
//! re-validated at the start of every step, so a disconnect during a hop is
//! noticed before anything is read or written.

use std::{collections::VecDeque, sync::Arc};

use waypoint_utils::Position;

use crate::{
    player::Player,
    safe_location::find_safe_y_in,
    teleport::{
        Completion, Destination, TeleportError, TeleportOutcome, rotation::snap_to_cardinal,
    },
    world::{Universe, World},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    /// Work out the final position, on the destination's world.
    Resolve,
    /// Move the player, on the world the player is in.
    Apply,
}

struct Step {
    kind: StepKind,
    world: Arc<World>,
}

enum Flow {
    Next,
    Requeue(Step),
    Done(TeleportOutcome),
}

pub(crate) struct TeleportPipeline {
    universe: Arc<Universe>,
    player: Arc<Player>,
    destination: Destination,
    resolved: Option<(Arc<World>, Position)>,
    steps: VecDeque<Step>,
    completion: Completion,
}

impl TeleportPipeline {
    /// Checks that the teleport can start and lays out its steps.
    pub(crate) fn plan(
        universe: Arc<Universe>,
        player: Arc<Player>,
        destination: Destination,
        completion: Completion,
    ) -> Result<Self, (TeleportError, Completion)> {
        if !player.is_valid() {
            return Err((TeleportError::HandleInvalid, completion));
        }

        let destination_world = match &destination {
            Destination::Fixed(position) => universe.world(&position.world).ok_or_else(|| {
                TeleportError::WorldNotLoaded {
                    world: position.world.clone(),
                }
            }),
            Destination::Player(target) => universe
                .player(*target)
                .filter(|target| target.is_valid())
                .map(|target| target.world())
                .ok_or(TeleportError::TargetUnavailable),
        };
        let destination_world = match destination_world {
            Ok(world) => world,
            Err(err) => return Err((err, completion)),
        };

        let steps = VecDeque::from([
            Step {
                kind: StepKind::Resolve,
                world: destination_world,
            },
            Step {
                kind: StepKind::Apply,
                world: player.world(),
            },
        ]);

        Ok(Self {
            universe,
            player,
            destination,
            resolved: None,
            steps,
            completion,
        })
    }

    /// Runs steps until the pipeline finishes or has to hop.
    pub(crate) fn run(mut self) {
        loop {
            let Some(step) = self.steps.front() else {
                // Apply always finishes the pipeline
                log::warn!("Teleport of {} ran out of steps", self.player.name);
                self.finish(TeleportOutcome::Dropped);
                return;
            };
            if !step.world.in_context() {
                self.hop();
                return;
            }
            let Some(step) = self.steps.pop_front() else {
                return;
            };

            if !self.player.is_valid() {
                self.finish(TeleportOutcome::Failed(TeleportError::HandleInvalid));
                return;
            }

            let flow = match step.kind {
                StepKind::Resolve => self.resolve(&step.world),
                StepKind::Apply => self.apply(&step.world),
            };
            match flow {
                Flow::Next => {}
                Flow::Requeue(step) => self.steps.push_front(step),
                Flow::Done(outcome) => {
                    self.finish(outcome);
                    return;
                }
            }
        }
    }

    fn resolve(&mut self, world: &Arc<World>) -> Flow {
        let position = match &self.destination {
            Destination::Fixed(requested) => {
                let y = find_safe_y_in(world, requested.x, requested.y, requested.z);
                requested.with_y(y)
            }
            Destination::Player(uuid) => {
                let Some(target) = self.universe.player(*uuid).filter(|t| t.is_valid()) else {
                    return Flow::Done(TeleportOutcome::Failed(TeleportError::TargetUnavailable));
                };
                let target_world = target.world();
                if !target_world.same_as(world) {
                    log::debug!(
                        "{} moved to {} before the teleport resolved",
                        target.name,
                        target_world.name
                    );
                    return Flow::Requeue(Step {
                        kind: StepKind::Resolve,
                        world: target_world,
                    });
                }
                target.current_position()
            }
        };

        self.resolved = Some((Arc::clone(world), position));
        Flow::Next
    }

    fn apply(&mut self, world: &Arc<World>) -> Flow {
        let current_world = self.player.world();
        if !current_world.same_as(world) {
            return Flow::Requeue(Step {
                kind: StepKind::Apply,
                world: current_world,
            });
        }
        let Some((destination_world, position)) = self.resolved.take() else {
            return Flow::Done(TeleportOutcome::Dropped);
        };

        let yaw = snap_to_cardinal(position.yaw);
        let position = Position {
            yaw,
            pitch: 0.0,
            ..position
        };

        self.player.clear_awaiting_teleport();
        if !destination_world.same_as(world) {
            let uuid = self.player.uuid;
            let _ = world.players.remove_sync(&uuid);
            let _ = destination_world
                .players
                .insert_sync(uuid, Arc::clone(&self.player));
            self.player.set_world(Arc::clone(&destination_world));
            // A disconnect racing the move may have cleaned up the source world only
            if !self.player.is_valid() {
                let _ = destination_world.players.remove_sync(&uuid);
                return Flow::Done(TeleportOutcome::Failed(TeleportError::HandleInvalid));
            }
            log::debug!(
                "{} moved from {} to {}",
                self.player.name,
                world.name,
                destination_world.name
            );
        }
        self.player.teleport(position.coords(), yaw, 0.0);

        Flow::Done(TeleportOutcome::Succeeded(position))
    }

    fn hop(self) {
        let Some(step) = self.steps.front() else {
            return;
        };
        let world = Arc::clone(&step.world);
        let preload = match (&step.kind, &self.destination) {
            (StepKind::Resolve, Destination::Fixed(position))
                if world.chunk_at(position.block_pos()).is_none() =>
            {
                Some(position.block_pos())
            }
            _ => None,
        };
        log::debug!(
            "Teleport of {} continues on {}",
            self.player.name,
            world.name
        );

        match preload {
            Some(block) => {
                tokio::spawn(async move {
                    if world.load_chunk_at(block).await.is_none() {
                        log::debug!("Chunk at {block:?} in {} could not be loaded", world.name);
                    }
                    self.submit_to(&world);
                });
            }
            None => self.submit_to(&world),
        }
    }

    fn submit_to(self, world: &World) {
        // A closed context drops the pipeline, which reports Dropped
        if let Err(err) = world.submit(move |_| self.run()) {
            log::warn!("Teleport could not continue: {err}");
        }
    }

    fn finish(self, outcome: TeleportOutcome) {
        let Self {
            player, completion, ..
        } = self;
        completion.finish(&player, outcome);
    }
}
