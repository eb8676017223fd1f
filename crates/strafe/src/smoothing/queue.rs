use std::collections::VecDeque;

use crate::data::State;

/// Ordered buffer of received states for one observed entity. Append-only
/// at the tail; stale or duplicate entries are refused and the oldest entry
/// is evicted once the configured capacity is reached.
#[derive(Debug)]
pub struct StateQueue {
    states: VecDeque<State>,
    max_size: usize,
}

impl StateQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            states: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Returns false for invalid or stale states (timestamp not newer than
    /// the newest entry); those are ignored, never inserted.
    pub fn push(&mut self, state: State) -> bool {
        if !state.is_valid() {
            return false;
        }
        if let Some(newest) = self.states.back() {
            if state.timestamp <= newest.timestamp {
                return false;
            }
        }
        if self.states.len() >= self.max_size {
            self.states.pop_front();
        }
        self.states.push_back(state);
        true
    }

    pub fn get(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    pub fn newest(&self) -> Option<&State> {
        self.states.back()
    }

    pub fn oldest(&self) -> Option<&State> {
        self.states.front()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Finds the pair of adjacent entries enclosing `time`, scanning from
    /// the newest end since the search time usually trails it closely.
    pub fn bracket(&self, time: f32) -> Option<(usize, usize)> {
        if self.states.len() < 2 {
            return None;
        }
        for start in (0..self.states.len() - 1).rev() {
            let target = start + 1;
            if self.states[start].timestamp <= time && time <= self.states[target].timestamp {
                return Some((start, target));
            }
        }
        None
    }
}
