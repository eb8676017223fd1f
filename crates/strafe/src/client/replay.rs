use crate::config::SyncConfig;
use crate::data::{BoundDataRegistry, BoundSet, Move, Pose, State};
use crate::rollback::{PeerEntity, rollback};
use crate::sim::{MIN_DELTA_TIME, Simulation, execute_move};

use super::prediction::MoveQueue;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOutcome {
    pub replayed: bool,
    pub moves_replayed: usize,
    /// Whether the handled state carried the full replicated batch.
    pub full_batch: bool,
    /// Whether a source move matching the state's timestamp was found.
    pub source_found: bool,
}

/// Applies authoritative states to the local predicting entity: prunes
/// acknowledged moves, detects divergence and re-simulates the remaining
/// queue from the server's values when needed. The replay reconstructs
/// just-computed-but-wrong history; it never touches what is currently
/// rendered, so a correct trajectory replays into an identical end state
/// with nothing visible happening.
pub struct ReplayEngine {
    config: SyncConfig,
    registry: BoundDataRegistry,
    last_applied_timestamp: f32,
    replays: u64,
}

impl ReplayEngine {
    pub fn new(config: SyncConfig, registry: BoundDataRegistry) -> Self {
        Self {
            config,
            registry,
            last_applied_timestamp: -1.0,
            replays: 0,
        }
    }

    pub fn replays(&self) -> u64 {
        self.replays
    }

    pub fn handle_state(
        &mut self,
        state: &State,
        queue: &mut MoveQueue,
        pose: &mut Pose,
        bound: &mut BoundSet,
        sim: &mut dyn Simulation,
        peers: &mut [PeerEntity],
    ) -> ReplayOutcome {
        let mut outcome = ReplayOutcome {
            full_batch: state.contains_full_batch,
            ..ReplayOutcome::default()
        };
        // Stale or duplicate states are ignored, never applied.
        if !state.is_valid() || state.timestamp <= self.last_applied_timestamp {
            return outcome;
        }
        self.last_applied_timestamp = state.timestamp;

        queue.discard_older_than(state.timestamp);
        let source = queue
            .find_source(state.timestamp)
            .and_then(|_| queue.pop_front());

        let Some(source) = source else {
            // The source move is gone (e.g. dropped by queue overflow). A
            // full batch still lets us resync from the authoritative values.
            if state.contains_full_batch {
                self.replay(state, queue, pose, bound, sim, peers, &mut outcome);
            }
            return outcome;
        };
        outcome.source_found = true;

        if self.should_replay(&source, state) {
            self.replay(state, queue, pose, bound, sim, peers, &mut outcome);
        }
        outcome
    }

    fn should_replay(&self, source: &Move, state: &State) -> bool {
        if self.config.always_replay {
            return true;
        }

        // Bound-data divergence encodes discrete gameplay state and forces
        // a replay unconditionally, bypassing the speed gate below.
        if state.contains_full_batch
            && !source
                .bound_out
                .matches_for(&state.bound, &self.registry, true)
        {
            return true;
        }

        let mut replay = false;
        if state.contains_full_batch {
            // The server overrode this move; its values must be adopted.
            replay = true;
        }
        if !source
            .out_pose
            .velocity_within(&state.pose, self.config.max_velocity_error)
        {
            replay = true;
        }
        if state.contains_full_batch {
            if !source
                .out_pose
                .location_within(&state.pose, self.config.max_location_error)
                || !source
                    .out_pose
                    .rotation_within(&state.pose, self.config.max_rotation_error)
                || !source
                    .out_pose
                    .control_rotation_within(&state.pose, self.config.max_control_rotation_error)
                || source.out_pose.input_mode != state.pose.input_mode
            {
                replay = true;
            }
        }

        if replay && self.config.only_replay_when_moving {
            let speed = state.pose.speed().max(source.out_pose.speed());
            if speed < self.config.replay_speed_threshold {
                replay = false;
            }
        }
        replay
    }

    #[allow(clippy::too_many_arguments)]
    fn replay(
        &mut self,
        state: &State,
        queue: &mut MoveQueue,
        pose: &mut Pose,
        bound: &mut BoundSet,
        sim: &mut dyn Simulation,
        peers: &mut [PeerEntity],
        outcome: &mut ReplayOutcome,
    ) {
        log::debug!(
            "replaying {} moves from authoritative state at {:.3}",
            queue.len(),
            state.timestamp
        );
        self.replays += 1;
        outcome.replayed = true;

        *pose = state.pose;
        let mut replay_bound = state.bound.clone();
        replay_bound.fill_missing_from(bound);
        *bound = replay_bound;

        for mv in queue.iter_mut() {
            mv.in_pose = *pose;
            mv.bound_in = bound.clone();
            if mv.delta_time >= MIN_DELTA_TIME {
                let snapshot = if self.config.rollback_client_pawns && !peers.is_empty() {
                    Some(rollback(peers, mv.timestamp))
                } else {
                    None
                };
                execute_move(
                    sim,
                    pose,
                    bound,
                    &mv.input,
                    mv.delta_time,
                    self.config.max_time_step,
                    self.config.max_iterations,
                );
                pose.quantize(&self.config.quantize);
                if let Some(snapshot) = snapshot {
                    snapshot.restore(peers);
                }
            }
            mv.out_pose = *pose;
            mv.bound_out = bound.clone();
            outcome.moves_replayed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EntityId, InputFlags, MoveInput, QuantizeConfig, RecipientRole};
    use glam::Vec3;

    struct ConstantVelocitySim;

    impl Simulation for ConstantVelocitySim {
        fn simulate(
            &mut self,
            pose: &mut Pose,
            _bound: &mut BoundSet,
            input: &MoveInput,
            delta_time: f32,
            _iteration: u32,
            _sub_stepped: bool,
        ) {
            pose.velocity = input.input_vector * 100.0;
            pose.location += pose.velocity * delta_time;
        }
    }

    fn forward_move(timestamp: f32, delta_time: f32, x_start: f32) -> Move {
        let input = MoveInput {
            input_vector: Vec3::new(1.0, 0.0, 0.0),
            flags: InputFlags::empty(),
        };
        let mut mv = Move::new(timestamp, delta_time, input);
        mv.in_pose.location = Vec3::new(x_start, 0.0, 0.0);
        mv.out_pose.location = Vec3::new(x_start + 100.0 * delta_time, 0.0, 0.0);
        mv.out_pose.velocity = Vec3::new(100.0, 0.0, 0.0);
        mv
    }

    fn matching_state(mv: &Move) -> State {
        State::new(
            mv.timestamp,
            EntityId(1),
            RecipientRole::AutonomousProxy,
            mv.out_pose,
            QuantizeConfig::default(),
        )
    }

    #[test]
    fn matching_minimal_state_does_not_replay() {
        let config = SyncConfig::default();
        let registry = BoundDataRegistry::new();
        let mut engine = ReplayEngine::new(config, registry);
        let mut queue = MoveQueue::new(16);
        let mut sim = ConstantVelocitySim;

        queue.push(forward_move(1.00, 0.05, 0.0));
        queue.push(forward_move(1.05, 0.05, 5.0));
        let mut pose = queue.back().unwrap().out_pose;
        let mut bound = BoundSet::default();

        let mut state = matching_state(queue.front().unwrap());
        state.contains_full_batch = false;

        let outcome = engine.handle_state(&state, &mut queue, &mut pose, &mut bound, &mut sim, &mut []);
        assert!(outcome.source_found);
        assert!(!outcome.replayed);
        // Source move acknowledged and gone, newer move kept.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().timestamp, 1.05);
    }

    #[test]
    fn full_batch_mismatch_replays_remaining_moves() {
        let config = SyncConfig::default();
        let registry = BoundDataRegistry::new();
        let mut engine = ReplayEngine::new(config, registry);
        let mut queue = MoveQueue::new(16);
        let mut sim = ConstantVelocitySim;

        queue.push(forward_move(1.00, 0.05, 0.0));
        queue.push(forward_move(1.05, 0.05, 5.0));
        queue.push(forward_move(1.10, 0.05, 10.0));
        let mut pose = queue.back().unwrap().out_pose;
        let mut bound = BoundSet::default();

        // Server disagrees: the move at 1.00 actually ended 3 units short.
        let mut state = matching_state(queue.front().unwrap());
        state.pose.location = Vec3::new(2.0, 0.0, 0.0);

        let outcome = engine.handle_state(&state, &mut queue, &mut pose, &mut bound, &mut sim, &mut []);
        assert!(outcome.replayed);
        assert_eq!(outcome.moves_replayed, 2);
        // Corrected trajectory: 2.0 + 2 x 0.05 x 100.
        assert!((pose.location.x - 12.0).abs() < 0.01);
    }

    #[test]
    fn replay_of_correct_trajectory_is_idempotent() {
        let mut config = SyncConfig::default();
        config.always_replay = true;
        let registry = BoundDataRegistry::new();
        let mut engine = ReplayEngine::new(config, registry);
        let mut queue = MoveQueue::new(16);
        let mut sim = ConstantVelocitySim;

        queue.push(forward_move(1.00, 0.05, 0.0));
        queue.push(forward_move(1.05, 0.05, 5.0));
        queue.push(forward_move(1.10, 0.05, 10.0));
        let mut pose = queue.back().unwrap().out_pose;
        let before = pose;
        let mut bound = BoundSet::default();

        let state = matching_state(queue.front().unwrap());
        let outcome = engine.handle_state(&state, &mut queue, &mut pose, &mut bound, &mut sim, &mut []);
        assert!(outcome.replayed);
        assert!((pose.location - before.location).length() < 1e-4);
        assert_eq!(pose.velocity, before.velocity);
    }

    #[test]
    fn stale_state_ignored() {
        let config = SyncConfig::default();
        let registry = BoundDataRegistry::new();
        let mut engine = ReplayEngine::new(config, registry);
        let mut queue = MoveQueue::new(16);
        let mut sim = ConstantVelocitySim;

        queue.push(forward_move(1.00, 0.05, 0.0));
        let mut pose = Pose::default();
        let mut bound = BoundSet::default();

        let state = matching_state(queue.front().unwrap());
        engine.handle_state(&state, &mut queue, &mut pose, &mut bound, &mut sim, &mut []);

        let mut stale = state.clone();
        stale.timestamp = 0.5;
        let outcome =
            engine.handle_state(&stale, &mut queue, &mut pose, &mut bound, &mut sim, &mut []);
        assert!(!outcome.replayed);
        assert!(!outcome.source_found);
    }

    #[test]
    fn speed_gate_suppresses_replay_when_idle() {
        let mut config = SyncConfig::default();
        config.only_replay_when_moving = true;
        config.replay_speed_threshold = 10.0;
        let registry = BoundDataRegistry::new();
        let mut engine = ReplayEngine::new(config, registry);
        let mut queue = MoveQueue::new(16);
        let mut sim = ConstantVelocitySim;

        // A stationary move with a small location disagreement.
        let mut mv = Move::new(1.00, 0.05, MoveInput::default());
        mv.out_pose.velocity = Vec3::ZERO;
        mv.out_pose.location = Vec3::new(0.0, 0.0, 0.0);
        queue.push(mv);
        let mut pose = Pose::default();
        let mut bound = BoundSet::default();

        let mut state = matching_state(queue.front().unwrap());
        state.pose.location = Vec3::new(2.0, 0.0, 0.0);

        let outcome = engine.handle_state(&state, &mut queue, &mut pose, &mut bound, &mut sim, &mut []);
        assert!(!outcome.replayed);
    }
}
