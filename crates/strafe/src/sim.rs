use crate::data::{BoundSet, MoveInput, Pose};

/// Minimum delta time for calculations to avoid potential divide-by-zero.
pub const MIN_DELTA_TIME: f32 = 1e-6;

/// The application-supplied movement logic. Must be deterministic: identical
/// `(pose, bound, input, delta_time)` must always produce identical results,
/// since client replay and server verification both depend on reproducing
/// the exact same trajectory from the same inputs.
pub trait Simulation {
    fn simulate(
        &mut self,
        pose: &mut Pose,
        bound: &mut BoundSet,
        input: &MoveInput,
        delta_time: f32,
        iteration: u32,
        sub_stepped: bool,
    );
}

/// Runs one move through the callback, sub-stepping when `delta_time`
/// exceeds `max_time_step`. At most `max_iterations` calls are made; when
/// the remainder would fit into two steps it is folded evenly into the
/// final two so no single sub-step exceeds the limit, and if the iteration
/// budget runs out the rest is executed in one oversized final step.
pub fn execute_move(
    sim: &mut dyn Simulation,
    pose: &mut Pose,
    bound: &mut BoundSet,
    input: &MoveInput,
    delta_time: f32,
    max_time_step: f32,
    max_iterations: u32,
) {
    if delta_time < MIN_DELTA_TIME {
        return;
    }
    if delta_time <= max_time_step || max_iterations <= 1 {
        sim.simulate(pose, bound, input, delta_time, 1, false);
        return;
    }

    let mut remaining = delta_time;
    let mut iteration = 0u32;
    loop {
        iteration += 1;
        if iteration >= max_iterations {
            sim.simulate(pose, bound, input, remaining, iteration, true);
            return;
        }
        if remaining > 2.0 * max_time_step {
            sim.simulate(pose, bound, input, max_time_step, iteration, true);
            remaining -= max_time_step;
        } else {
            let half = remaining * 0.5;
            sim.simulate(pose, bound, input, half, iteration, true);
            sim.simulate(pose, bound, input, half, iteration + 1, true);
            return;
        }
    }
}
