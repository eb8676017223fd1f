use crate::config::SyncConfig;
use crate::data::{BoundDataRegistry, BoundSet, EntityId, Move, Pose, RecipientRole, State};
use crate::net::{WireError, WireMoveBatch, decode_move};
use crate::rollback::{PeerEntity, rollback};
use crate::sim::{MIN_DELTA_TIME, Simulation, execute_move};

use super::verify::{TimestampVerifier, Verdict};

#[derive(Debug, Clone, Copy)]
pub struct MoveResult {
    pub timestamp: f32,
    /// Whether the client's reported output was adopted.
    pub valid: bool,
    /// Whether the move was rejected by timestamp verification and never
    /// executed.
    pub rejected: bool,
}

/// The product of one reconciliation pass over a received batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<MoveResult>,
    /// State for the owning client: a minimal diff while its prediction
    /// holds, the full batch when a move was invalid (forcing a replay).
    pub autonomous_state: Option<State>,
    /// State for observers; always a full batch.
    pub simulated_state: Option<State>,
}

/// Authoritative server side of one predicting entity: unpacks batches,
/// verifies timestamps, re-executes each move through the identical
/// simulation callback and decides whether to trust the client's reported
/// results or override them.
pub struct ReconciliationEngine {
    entity: EntityId,
    config: SyncConfig,
    registry: BoundDataRegistry,
    pose: Pose,
    bound: BoundSet,
    last_move: Move,
    last_processed_timestamp: f32,
    verifier: TimestampVerifier,
    invalid_moves: u64,
}

impl ReconciliationEngine {
    pub fn new(entity: EntityId, config: SyncConfig, registry: BoundDataRegistry) -> Self {
        let bound = registry.empty_set();
        Self {
            entity,
            config,
            registry,
            pose: Pose::default(),
            bound,
            last_move: Move::empty(),
            last_processed_timestamp: -1.0,
            verifier: TimestampVerifier::new(),
            invalid_moves: 0,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Places the entity (e.g. at spawn). Both ends must agree on the
    /// starting pose before moves are exchanged.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn bound(&self) -> &BoundSet {
        &self.bound
    }

    pub fn bound_mut(&mut self) -> &mut BoundSet {
        &mut self.bound
    }

    pub fn invalid_moves(&self) -> u64 {
        self.invalid_moves
    }

    pub fn strikes(&self) -> u32 {
        self.verifier.strikes()
    }

    /// Deserializes and processes one received batch. A decode failure is
    /// fatal for the connection and surfaces as the error; the host is
    /// expected to disconnect the client.
    pub fn receive_batch(
        &mut self,
        bytes: &[u8],
        sim: &mut dyn Simulation,
        peers: &mut [PeerEntity],
        now: f32,
    ) -> Result<BatchOutcome, WireError> {
        let batch = WireMoveBatch::from_bytes(bytes)?;
        self.process_batch(&batch, sim, peers, now)
    }

    /// Processes moves in strictly increasing timestamp order; stale
    /// entries are skipped silently.
    pub fn process_batch(
        &mut self,
        batch: &WireMoveBatch,
        sim: &mut dyn Simulation,
        peers: &mut [PeerEntity],
        now: f32,
    ) -> Result<BatchOutcome, WireError> {
        let mut results = Vec::with_capacity(batch.moves.len());
        let mut last_valid = true;

        for wire in &batch.moves {
            let mut mv = decode_move(wire, &self.last_move, &self.config.move_wire, &self.registry)?;
            if mv.timestamp <= self.last_processed_timestamp {
                continue;
            }

            // The delta time is not replicated; it is derived from the
            // timestamps the same way on both machines, clamped so a slow
            // client cannot buy extra simulation time per move.
            mv.delta_time = if self.last_move.is_valid() {
                (mv.timestamp - self.last_move.timestamp).min(self.config.max_server_delta_time)
            } else {
                0.0
            };

            let verdict = self.verifier.check(mv.timestamp, now, &self.config);
            let rejected = verdict == Verdict::Reject;
            let valid = if rejected {
                false
            } else {
                self.execute_and_reconcile(&mut mv, sim, peers)
            };
            if !valid {
                self.invalid_moves += 1;
            }

            self.last_processed_timestamp = mv.timestamp;
            results.push(MoveResult {
                timestamp: mv.timestamp,
                valid,
                rejected,
            });
            last_valid = valid;
            self.last_move = mv;
        }

        let (autonomous_state, simulated_state) = if results.is_empty() {
            (None, None)
        } else {
            (
                Some(self.build_state(RecipientRole::AutonomousProxy, !last_valid)),
                Some(self.build_state(RecipientRole::SimulatedProxy, true)),
            )
        };

        Ok(BatchOutcome {
            results,
            autonomous_state,
            simulated_state,
        })
    }

    fn execute_and_reconcile(
        &mut self,
        mv: &mut Move,
        sim: &mut dyn Simulation,
        peers: &mut [PeerEntity],
    ) -> bool {
        mv.in_pose = self.pose;

        // The client's bound inputs drive the callback; anything it did not
        // send keeps the authoritative value.
        let mut bound = mv.bound_in.clone();
        bound.fill_missing_from(&self.bound);

        let mut pose = self.pose;
        if mv.delta_time >= MIN_DELTA_TIME {
            let snapshot = if self.config.rollback_server_pawns && !peers.is_empty() {
                Some(rollback(peers, mv.timestamp))
            } else {
                None
            };
            execute_move(
                sim,
                &mut pose,
                &mut bound,
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
        self.bound = bound;

        let claimed = &mv.out_pose;
        let valid = pose.velocity_within(claimed, self.config.max_velocity_error)
            && pose.location_within(claimed, self.config.max_location_error)
            && pose.rotation_within(claimed, self.config.max_rotation_error)
            && pose.control_rotation_within(claimed, self.config.max_control_rotation_error)
            && pose.input_mode == claimed.input_mode;

        if valid {
            // Within tolerance the client's reported values win, keeping
            // both machines bit-identical for the replayed trajectory.
            self.pose = *claimed;
        } else {
            log::debug!(
                "move at {:.3} out of tolerance, keeping authoritative values",
                mv.timestamp
            );
            self.pose = pose;
        }
        valid
    }

    fn build_state(&self, recipient: RecipientRole, full_batch: bool) -> State {
        let mut state = State::new(
            self.last_processed_timestamp,
            self.entity,
            recipient,
            self.pose,
            self.config.quantize,
        );
        state.contains_full_batch = full_batch;
        state.input_flags = self.last_move.input.flags;
        state.bound = self.bound.clone();
        state
    }
}
