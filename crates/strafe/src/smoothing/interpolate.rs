use glam::Vec3;

use crate::data::{Pose, State, normalize_angle};

/// Blends two queued states into an intermediate pose. Implementations
/// receive the full states so they can use timestamps and velocities;
/// discrete fields (input mode, flags, bound data) are handled by the
/// engine and whatever an interpolator writes to them is overridden.
pub trait Interpolator {
    fn interpolate(&self, start: &State, target: &State, ratio: f32) -> Pose;
}

/// Wrap-aware blend between two angles in degrees, along the shortest arc.
pub fn lerp_angle(from: f32, to: f32, ratio: f32) -> f32 {
    normalize_angle(from + normalize_angle(to - from) * ratio)
}

pub fn lerp_rotator(from: Vec3, to: Vec3, ratio: f32) -> Vec3 {
    Vec3::new(
        lerp_angle(from.x, to.x, ratio),
        lerp_angle(from.y, to.y, ratio),
        lerp_angle(from.z, to.z, ratio),
    )
}

/// Component-wise linear blend of all continuous channels.
#[derive(Debug, Default)]
pub struct LinearInterpolator;

impl Interpolator for LinearInterpolator {
    fn interpolate(&self, start: &State, target: &State, ratio: f32) -> Pose {
        Pose {
            velocity: start.pose.velocity.lerp(target.pose.velocity, ratio),
            location: start.pose.location.lerp(target.pose.location, ratio),
            rotation: lerp_rotator(start.pose.rotation, target.pose.rotation, ratio),
            control_rotation: lerp_rotator(
                start.pose.control_rotation,
                target.pose.control_rotation,
                ratio,
            ),
            input_mode: start.pose.input_mode,
        }
    }
}

/// Hermite blend of the location using the two states' velocities as
/// tangents, scaled by the bracket duration. Better fidelity for
/// physically driven motion; the remaining channels blend linearly.
#[derive(Debug, Default)]
pub struct CubicInterpolator;

impl Interpolator for CubicInterpolator {
    fn interpolate(&self, start: &State, target: &State, ratio: f32) -> Pose {
        let duration = (target.timestamp - start.timestamp).max(0.0);
        let location = hermite(
            start.pose.location,
            start.pose.velocity * duration,
            target.pose.location,
            target.pose.velocity * duration,
            ratio,
        );
        Pose {
            velocity: start.pose.velocity.lerp(target.pose.velocity, ratio),
            location,
            rotation: lerp_rotator(start.pose.rotation, target.pose.rotation, ratio),
            control_rotation: lerp_rotator(
                start.pose.control_rotation,
                target.pose.control_rotation,
                ratio,
            ),
            input_mode: start.pose.input_mode,
        }
    }
}

fn hermite(p0: Vec3, t0: Vec3, p1: Vec3, t1: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;

    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    p0 * h00 + t0 * h10 + p1 * h01 + t1 * h11
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EntityId, QuantizeConfig, RecipientRole};

    fn state(timestamp: f32, location: Vec3, velocity: Vec3) -> State {
        State::new(
            timestamp,
            EntityId(1),
            RecipientRole::SimulatedProxy,
            Pose {
                location,
                velocity,
                rotation: Vec3::new(0.0, 0.0, 0.0),
                ..Pose::default()
            },
            QuantizeConfig::default(),
        )
    }

    #[test]
    fn linear_boundary_values() {
        let start = state(1.0, Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let target = state(1.1, Vec3::new(10.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let interp = LinearInterpolator;

        let at_start = interp.interpolate(&start, &target, 0.0);
        assert_eq!(at_start.location, start.pose.location);
        assert_eq!(at_start.velocity, start.pose.velocity);

        let at_target = interp.interpolate(&start, &target, 1.0);
        assert_eq!(at_target.location, target.pose.location);
        assert_eq!(at_target.velocity, target.pose.velocity);
    }

    #[test]
    fn linear_midpoint() {
        let start = state(1.0, Vec3::ZERO, Vec3::ZERO);
        let target = state(1.1, Vec3::new(10.0, 20.0, -4.0), Vec3::ZERO);
        let mid = LinearInterpolator.interpolate(&start, &target, 0.5);
        assert!((mid.location - Vec3::new(5.0, 10.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn cubic_boundary_values() {
        let start = state(1.0, Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        let target = state(1.1, Vec3::new(10.0, 0.0, 0.0), Vec3::new(100.0, 0.0, 0.0));
        let interp = CubicInterpolator;

        let at_start = interp.interpolate(&start, &target, 0.0);
        assert!((at_start.location - start.pose.location).length() < 1e-4);

        let at_target = interp.interpolate(&start, &target, 1.0);
        assert!((at_target.location - target.pose.location).length() < 1e-4);
    }

    #[test]
    fn cubic_matches_constant_velocity_motion() {
        // Constant 100 u/s along x: the curve should stay on the straight
        // line the velocities describe.
        let start = state(1.0, Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        let target = state(1.1, Vec3::new(10.0, 0.0, 0.0), Vec3::new(100.0, 0.0, 0.0));
        let mid = CubicInterpolator.interpolate(&start, &target, 0.5);
        assert!((mid.location.x - 5.0).abs() < 1e-3);
    }

    #[test]
    fn angle_lerp_takes_shortest_arc() {
        let blended = lerp_angle(170.0, -170.0, 0.5);
        assert!((blended - -180.0).abs() < 1e-4 || (blended - 180.0).abs() < 1e-4);

        let blended = lerp_angle(-10.0, 10.0, 0.5);
        assert!(blended.abs() < 1e-4);
    }
}
