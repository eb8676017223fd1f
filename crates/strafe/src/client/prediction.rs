use std::collections::VecDeque;

use crate::config::SyncConfig;
use crate::data::{BoundSet, InputFlags, Move, MoveInput, Pose, quantize_unit_vector};
use crate::net::{WireMoveBatch, encode_move};
use crate::sim::{MIN_DELTA_TIME, Simulation, execute_move};

const TIMESTAMP_MATCH_TOLERANCE: f32 = 1e-5;

/// Ordered buffer of not-yet-acknowledged moves for the local predicting
/// entity. Timestamps are non-decreasing; on overflow the oldest entry is
/// dropped, which silently loses un-replayable history and is therefore
/// surfaced through a warning and a counter.
#[derive(Debug, Default)]
pub struct MoveQueue {
    moves: VecDeque<Move>,
    max_size: usize,
    dropped: u64,
}

impl MoveQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            moves: VecDeque::with_capacity(max_size),
            max_size,
            dropped: 0,
        }
    }

    pub fn push(&mut self, mv: Move) -> bool {
        if !mv.is_valid() {
            return false;
        }
        if let Some(back) = self.moves.back() {
            if mv.timestamp < back.timestamp {
                return false;
            }
        }
        if self.moves.len() >= self.max_size {
            self.moves.pop_front();
            self.dropped += 1;
            log::warn!(
                "move queue overflow, dropped oldest unacknowledged move ({} total)",
                self.dropped
            );
        }
        self.moves.push_back(mv);
        true
    }

    pub fn front(&self) -> Option<&Move> {
        self.moves.front()
    }

    pub fn back(&self) -> Option<&Move> {
        self.moves.back()
    }

    pub fn back_mut(&mut self) -> Option<&mut Move> {
        self.moves.back_mut()
    }

    pub fn pop_front(&mut self) -> Option<Move> {
        self.moves.pop_front()
    }

    /// Drops every move older than the acknowledged timestamp. The move
    /// matching it exactly is kept (it is the replay source).
    pub fn discard_older_than(&mut self, timestamp: f32) {
        while let Some(front) = self.moves.front() {
            if front.timestamp < timestamp - TIMESTAMP_MATCH_TOLERANCE {
                self.moves.pop_front();
            } else {
                break;
            }
        }
    }

    /// Finds the move whose timestamp matches a replicated state's.
    pub fn find_source(&self, timestamp: f32) -> Option<usize> {
        self.moves
            .iter()
            .position(|m| (m.timestamp - timestamp).abs() <= TIMESTAMP_MATCH_TOLERANCE)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Move> {
        self.moves.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Move> {
        self.moves.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn dropped_moves(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }
}

/// Drives local prediction: builds a move every tick, executes it through
/// the simulation callback immediately, and keeps the queue compact by
/// combining moves while the input is unchanged.
pub struct PredictionEngine {
    config: SyncConfig,
    queue: MoveQueue,
    last_move_time: f32,
    last_enqueue_time: f32,
    last_send_time: f32,
    /// Newest timestamp included in a transmitted batch. A queue entry that
    /// was already sent may no longer be combined into.
    last_sent_timestamp: f32,
    last_encoded: Move,
    no_combine_flags: InputFlags,
    force_next_enqueue: bool,
}

impl PredictionEngine {
    pub fn new(config: SyncConfig) -> Self {
        let queue = MoveQueue::new(config.move_queue_max_size);
        Self {
            config,
            queue,
            last_move_time: -1.0,
            last_enqueue_time: -1.0,
            last_send_time: -1.0,
            last_sent_timestamp: -1.0,
            last_encoded: Move::empty(),
            no_combine_flags: InputFlags::empty(),
            force_next_enqueue: false,
        }
    }

    pub fn queue(&self) -> &MoveQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut MoveQueue {
        &mut self.queue
    }

    /// Input flags that force a new queue entry while active (abilities
    /// that must not be time-smeared by combining).
    pub fn set_no_combine_flags(&mut self, flags: InputFlags) {
        self.no_combine_flags = flags;
    }

    /// Requests that the next move starts a new queue entry regardless of
    /// the combining policy.
    pub fn request_enqueue(&mut self) {
        self.force_next_enqueue = true;
    }

    /// Builds and executes the move for this tick, then appends it to the
    /// queue or combines it into the tail. The first tick only establishes
    /// the time baseline; prediction starts with the second.
    pub fn tick(
        &mut self,
        sim: &mut dyn Simulation,
        pose: &mut Pose,
        bound: &mut BoundSet,
        input: MoveInput,
        now: f32,
    ) {
        let delta_time = if self.last_move_time >= 0.0 {
            (now - self.last_move_time).max(0.0)
        } else {
            0.0
        };
        self.last_move_time = now;

        let mut input = input;
        input.input_vector =
            quantize_unit_vector(input.input_vector, self.config.move_wire.input_vector_quantize);

        let mut mv = Move::new(now, delta_time, input);
        mv.in_pose = *pose;
        mv.bound_in = bound.clone();

        if delta_time >= MIN_DELTA_TIME {
            execute_move(
                sim,
                pose,
                bound,
                &input,
                delta_time,
                self.config.max_time_step,
                self.config.max_iterations,
            );
            pose.quantize(&self.config.quantize);
        }
        mv.out_pose = *pose;
        mv.bound_out = bound.clone();

        if self.can_combine(&mv, now) {
            if let Some(back) = self.queue.back_mut() {
                back.combine_with(&mv);
                return;
            }
        }
        self.queue.push(mv);
        self.last_enqueue_time = now;
        self.force_next_enqueue = false;
    }

    fn can_combine(&self, mv: &Move, now: f32) -> bool {
        if self.force_next_enqueue {
            return false;
        }
        if mv.input.flags.intersects(self.no_combine_flags) {
            return false;
        }
        let Some(back) = self.queue.back() else {
            return false;
        };
        // Already transmitted entries are frozen.
        if back.timestamp <= self.last_sent_timestamp {
            return false;
        }
        // Combining only keeps the queue compact while input is unchanged.
        if back.input.input_vector != mv.input.input_vector
            || back.input.flags != mv.input.flags
        {
            return false;
        }
        if back.delta_time + mv.delta_time > self.config.max_client_delta_time {
            return false;
        }
        // Flush interval elapsed: the entry must go out as it is.
        if self.last_enqueue_time >= 0.0
            && now - self.last_enqueue_time >= self.config.min_send_interval()
        {
            return false;
        }
        true
    }

    /// Flushes pending moves as one reliable, ordered wire batch, gated by
    /// the send rate. Fewer sends happen naturally while moves combine, but
    /// no batch is held longer than the send interval.
    pub fn flush(&mut self, now: f32) -> Option<WireMoveBatch> {
        if self.last_send_time >= 0.0
            && now - self.last_send_time < self.config.min_send_interval()
        {
            return None;
        }
        let pending: Vec<&Move> = self
            .queue
            .iter()
            .filter(|m| m.timestamp > self.last_sent_timestamp)
            .collect();
        if pending.is_empty() {
            return None;
        }

        let mut moves = Vec::with_capacity(pending.len());
        for mv in pending {
            let previous = if self.last_encoded.is_valid() {
                Some(&self.last_encoded)
            } else {
                None
            };
            moves.push(encode_move(mv, previous, &self.config.move_wire));
            self.last_encoded = mv.clone();
        }
        self.last_sent_timestamp = self.last_encoded.timestamp;
        self.last_send_time = now;
        Some(WireMoveBatch { moves })
    }
}
