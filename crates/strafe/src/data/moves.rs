use bitflags::bitflags;
use glam::Vec3;

use super::bound::BoundSet;
use super::pose::Pose;

bitflags! {
    /// Boolean move inputs, usually bound to triggerable abilities. Which
    /// bit means what is up to the application; the framework only carries
    /// them and honors the configured no-combine mask.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct InputFlags: u16 {
        const FLAG_1 = 1 << 0;
        const FLAG_2 = 1 << 1;
        const FLAG_3 = 1 << 2;
        const FLAG_4 = 1 << 3;
        const FLAG_5 = 1 << 4;
        const FLAG_6 = 1 << 5;
        const FLAG_7 = 1 << 6;
        const FLAG_8 = 1 << 7;
        const FLAG_9 = 1 << 8;
        const FLAG_10 = 1 << 9;
        const FLAG_11 = 1 << 10;
        const FLAG_12 = 1 << 11;
        const FLAG_13 = 1 << 12;
        const FLAG_14 = 1 << 13;
        const FLAG_15 = 1 << 14;
        const FLAG_16 = 1 << 15;
    }
}

/// The sampled input driving one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveInput {
    /// Direction of movement from the controller, magnitude clamped to 1
    /// per component before serialization.
    pub input_vector: Vec3,
    pub flags: InputFlags,
}

/// One local simulation step: the sampled input plus the resulting output,
/// timestamped. A negative timestamp marks an invalid/empty move created
/// through `Move::empty`, usable as a placeholder but never as a sample.
#[derive(Debug, Clone, Default)]
pub struct Move {
    pub timestamp: f32,
    pub delta_time: f32,
    pub input: MoveInput,
    /// Starting values before execution.
    pub in_pose: Pose,
    /// Results of executing the move through the simulation callback.
    pub out_pose: Pose,
    /// Bound values as sampled when the move was created.
    pub bound_in: BoundSet,
    /// Bound values as they resulted from execution.
    pub bound_out: BoundSet,
}

impl Move {
    pub fn empty() -> Self {
        Self {
            timestamp: -1.0,
            ..Self::default()
        }
    }

    pub fn new(timestamp: f32, delta_time: f32, input: MoveInput) -> Self {
        Self {
            timestamp,
            delta_time,
            input,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.timestamp >= 0.0
    }

    /// Imports a newer move's results into this one. The combined move
    /// covers the real time of both: the timestamp advances to the newer
    /// move's and the delta times accumulate, while the original input
    /// snapshot is kept (combining only happens when input is unchanged).
    pub fn combine_with(&mut self, newer: &Move) {
        self.timestamp = newer.timestamp;
        self.delta_time += newer.delta_time;
        self.input.flags = newer.input.flags;
        self.out_pose = newer.out_pose;
        self.bound_out = newer.bound_out.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_move_is_invalid() {
        assert!(!Move::empty().is_valid());
        assert!(Move::new(0.0, 0.01, MoveInput::default()).is_valid());
    }

    #[test]
    fn combine_accumulates_time_and_takes_newest_output() {
        let mut older = Move::new(1.00, 0.02, MoveInput::default());
        older.out_pose.location = Vec3::new(1.0, 0.0, 0.0);

        let mut newer = Move::new(1.02, 0.02, MoveInput::default());
        newer.out_pose.location = Vec3::new(2.0, 0.0, 0.0);

        older.combine_with(&newer);
        assert_eq!(older.timestamp, 1.02);
        assert!((older.delta_time - 0.04).abs() < 1e-6);
        assert_eq!(older.out_pose.location, Vec3::new(2.0, 0.0, 0.0));
    }
}
