mod interpolate;
mod queue;

pub use interpolate::{CubicInterpolator, Interpolator, LinearInterpolator, lerp_angle, lerp_rotator};
pub use queue::StateQueue;

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::data::{BoundDataRegistry, BoundSet, State};
use crate::sim::MIN_DELTA_TIME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMethod {
    None,
    Linear,
    Cubic,
    Custom1,
    Custom2,
    Custom3,
    Custom4,
}

/// One smoothing product: the derived working state plus the bookkeeping a
/// listener needs to react to discrete events the interpolation stepped
/// over.
#[derive(Debug)]
pub struct SmoothResult {
    pub state: State,
    pub start_index: Option<usize>,
    pub target_index: Option<usize>,
    pub ratio: f32,
    pub extrapolated: bool,
    /// Queue indices that fell between last tick's target and this tick's
    /// start.
    pub skipped: Vec<usize>,
}

/// A raw blend product from `sample_at`, before per-tick bookkeeping.
pub struct SmoothSample {
    pub state: State,
    pub bracket: Option<(usize, usize)>,
    pub ratio: f32,
    pub extrapolated: bool,
}

/// Derives a renderable state for one remotely observed entity from its
/// received state queue, at a point `simulation_delay` seconds in the past.
pub struct SmoothingEngine {
    config: SyncConfig,
    registry: BoundDataRegistry,
    queue: StateQueue,
    custom: [Option<Box<dyn Interpolator>>; 4],
    prev_target_timestamp: f32,
    observed_bound: BoundSet,
}

impl SmoothingEngine {
    pub fn new(config: SyncConfig, registry: BoundDataRegistry) -> Self {
        let queue = StateQueue::new(config.state_queue_max_size);
        let observed_bound = registry.empty_set();
        Self {
            config,
            registry,
            queue,
            custom: [None, None, None, None],
            prev_target_timestamp: -1.0,
            observed_bound,
        }
    }

    /// Registers the interpolator behind one of the custom method slots.
    pub fn set_custom_interpolator(
        &mut self,
        method: InterpolationMethod,
        interpolator: Box<dyn Interpolator>,
    ) {
        if let Some(slot) = custom_slot(method) {
            self.custom[slot] = Some(interpolator);
        }
    }

    pub fn push_state(&mut self, state: State) -> bool {
        self.queue.push(state)
    }

    pub fn queue(&self) -> &StateQueue {
        &self.queue
    }

    pub fn simulation_delay(&self) -> f32 {
        self.config.simulation_delay
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.prev_target_timestamp = -1.0;
        self.observed_bound = self.registry.empty_set();
    }

    /// Pure bracket search and blend at an arbitrary point in the queue's
    /// timeline. Used by the per-tick smoothing below and by peer rollback,
    /// which samples at `move_timestamp - simulation_delay`.
    pub fn sample_at(&self, time: f32) -> Option<SmoothSample> {
        let newest = self.queue.newest()?;

        if newest.timestamp < time {
            // The queue has fallen behind the requested time.
            if self.config.allow_extrapolation {
                let mut state = newest.clone();
                let ahead = time - newest.timestamp;
                state.pose.location += state.pose.velocity * ahead;
                state.timestamp = time;
                state.extrapolated = true;
                return Some(SmoothSample {
                    state,
                    bracket: None,
                    ratio: 1.0,
                    extrapolated: true,
                });
            }
            return Some(SmoothSample {
                state: newest.clone(),
                bracket: None,
                ratio: 1.0,
                extrapolated: false,
            });
        }

        if self.config.interpolation_method == InterpolationMethod::None {
            return Some(SmoothSample {
                state: newest.clone(),
                bracket: None,
                ratio: 1.0,
                extrapolated: false,
            });
        }

        let Some((start_index, target_index)) = self.queue.bracket(time) else {
            // Not enough history behind the requested time yet.
            let oldest = self.queue.oldest()?;
            return Some(SmoothSample {
                state: oldest.clone(),
                bracket: None,
                ratio: 0.0,
                extrapolated: false,
            });
        };

        let start = self.queue.get(start_index)?;
        let target = self.queue.get(target_index)?;
        let duration = target.timestamp - start.timestamp;
        let ratio = if duration > MIN_DELTA_TIME {
            ((time - start.timestamp) / duration).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let pose = self.interpolator_for(self.config.interpolation_method).interpolate(
            start,
            target,
            ratio,
        );

        // Discrete fields are never blended; they come wholesale from the
        // temporally closer endpoint.
        let nearer = if ratio < 0.5 { start } else { target };
        let mut state = target.clone();
        state.timestamp = time;
        state.pose = pose;
        state.pose.input_mode = nearer.pose.input_mode;
        state.input_flags = nearer.input_flags;
        state.contains_full_batch = nearer.contains_full_batch;
        state.bound = nearer.bound.clone();
        state.extrapolated = false;

        Some(SmoothSample {
            state,
            bracket: Some((start_index, target_index)),
            ratio,
            extrapolated: false,
        })
    }

    /// Produces the smoothing result for a render tick at `now`, tracking
    /// states the bracket stepped over since the previous tick so listeners
    /// never miss a force-update transition.
    pub fn tick(&mut self, now: f32) -> Option<SmoothResult> {
        let time = now - self.config.simulation_delay;
        let sample = self.sample_at(time)?;

        let boundary = match sample.bracket {
            Some((start_index, _)) => self.queue.get(start_index)?.timestamp,
            None => self
                .queue
                .newest()
                .map(|s| s.timestamp.min(sample.state.timestamp))?,
        };

        let mut skipped = Vec::new();
        if self.prev_target_timestamp >= 0.0 {
            for index in 0..self.queue.len() {
                let ts = self.queue.get(index).map(|s| s.timestamp)?;
                if ts > self.prev_target_timestamp && ts < boundary {
                    skipped.push(index);
                }
            }
        }

        let mut state = sample.state;
        self.apply_skipped_transitions(&mut state, &skipped);

        for index in 0..self.registry.len() {
            self.observed_bound
                .set_raw(index, state.bound.raw().get(index).copied().flatten());
        }

        self.prev_target_timestamp = match sample.bracket {
            Some((_, target_index)) => self.queue.get(target_index)?.timestamp,
            None => boundary,
        };

        Some(SmoothResult {
            state,
            start_index: sample.bracket.map(|(s, _)| s),
            target_index: sample.bracket.map(|(_, t)| t),
            ratio: sample.ratio,
            extrapolated: sample.extrapolated,
            skipped,
        })
    }

    /// Surfaces force-update values the bracket stepped over: if a skipped
    /// state carried a transition and the chosen endpoint already returned
    /// to the previously observed value, the transition value is presented
    /// this tick instead of being lost.
    fn apply_skipped_transitions(&self, state: &mut State, skipped: &[usize]) {
        for (index, slot) in self.registry.slots().iter().enumerate() {
            if !slot.force_update {
                continue;
            }
            let observed = self.observed_bound.raw().get(index).copied().flatten();
            let current = state.bound.raw().get(index).copied().flatten();
            let unchanged = match (observed, current) {
                (Some(a), Some(b)) => a.approx_eq(&b),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                continue;
            }
            for &skipped_index in skipped.iter().rev() {
                let Some(value) = self
                    .queue
                    .get(skipped_index)
                    .and_then(|s| s.bound.raw().get(index).copied().flatten())
                else {
                    continue;
                };
                let differs = match observed {
                    Some(prev) => !value.approx_eq(&prev),
                    None => true,
                };
                if differs {
                    state.bound.set_raw(index, Some(value));
                    break;
                }
            }
        }
    }

    fn interpolator_for(&self, method: InterpolationMethod) -> &dyn Interpolator {
        static LINEAR: LinearInterpolator = LinearInterpolator;
        static CUBIC: CubicInterpolator = CubicInterpolator;
        match method {
            InterpolationMethod::Cubic => &CUBIC,
            InterpolationMethod::Custom1
            | InterpolationMethod::Custom2
            | InterpolationMethod::Custom3
            | InterpolationMethod::Custom4 => custom_slot(method)
                .and_then(|slot| self.custom[slot].as_deref())
                .unwrap_or(&LINEAR),
            _ => &LINEAR,
        }
    }
}

fn custom_slot(method: InterpolationMethod) -> Option<usize> {
    match method {
        InterpolationMethod::Custom1 => Some(0),
        InterpolationMethod::Custom2 => Some(1),
        InterpolationMethod::Custom3 => Some(2),
        InterpolationMethod::Custom4 => Some(3),
        _ => None,
    }
}
