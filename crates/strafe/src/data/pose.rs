use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::quantize::{
    DecimalQuantization, SizeQuantization, angle_tolerance, decimal_tolerance, normalize_angle,
    quantize_decimal_vector, quantize_rotator,
};

/// How the directional input vector is interpreted by the movement logic.
/// Carried through moves and states so client and server resolve input the
/// same way during replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InputMode {
    #[default]
    None = 0,
    AllRelative = 1,
    AllAbsolute = 2,
    AbsoluteZ = 3,
}

impl From<u8> for InputMode {
    fn from(value: u8) -> Self {
        match value {
            1 => InputMode::AllRelative,
            2 => InputMode::AllAbsolute,
            3 => InputMode::AbsoluteZ,
            _ => InputMode::None,
        }
    }
}

/// Quantization levels for the replicated motion channels. Fixed for the
/// lifetime of a connection and identical on both ends; states stamp a copy
/// when created so queued entries stay self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizeConfig {
    pub velocity: DecimalQuantization,
    pub location: DecimalQuantization,
    pub rotation: SizeQuantization,
    pub control_rotation: SizeQuantization,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            velocity: DecimalQuantization::RoundTwoDecimals,
            location: DecimalQuantization::RoundTwoDecimals,
            rotation: SizeQuantization::Short,
            control_rotation: SizeQuantization::Short,
        }
    }
}

/// One entity's replicated motion outputs. Rotations are euler degrees
/// (roll, pitch, yaw) so individual axes can be serialized, compared and
/// blended independently.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub velocity: Vec3,
    pub location: Vec3,
    pub rotation: Vec3,
    pub control_rotation: Vec3,
    pub input_mode: InputMode,
}

impl Pose {
    /// Snaps all channels onto the configured wire grid. Applied locally
    /// after move execution so the predicted state matches what the remote
    /// end reconstructs from the compressed values.
    pub fn quantize(&mut self, config: &QuantizeConfig) {
        self.velocity = quantize_decimal_vector(self.velocity, config.velocity);
        self.location = quantize_decimal_vector(self.location, config.location);
        self.rotation = quantize_rotator(self.rotation, config.rotation);
        self.control_rotation = quantize_rotator(self.control_rotation, config.control_rotation);
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Component-wise deviation checks used by reconciliation and replay.
    pub fn velocity_within(&self, other: &Pose, tolerance: f32) -> bool {
        (self.velocity - other.velocity).abs().max_element() <= tolerance
    }

    pub fn location_within(&self, other: &Pose, tolerance: f32) -> bool {
        (self.location - other.location).abs().max_element() <= tolerance
    }

    pub fn rotation_within(&self, other: &Pose, tolerance: f32) -> bool {
        angles_within(self.rotation, other.rotation, tolerance)
    }

    pub fn control_rotation_within(&self, other: &Pose, tolerance: f32) -> bool {
        angles_within(self.control_rotation, other.control_rotation, tolerance)
    }

    /// Whether every channel of `other` matches within the grid tolerances
    /// of the given quantization config.
    pub fn matches_quantized(&self, other: &Pose, config: &QuantizeConfig) -> bool {
        self.velocity_within(other, decimal_tolerance(config.velocity))
            && self.location_within(other, decimal_tolerance(config.location))
            && self.rotation_within(other, angle_tolerance(config.rotation))
            && self.control_rotation_within(other, angle_tolerance(config.control_rotation))
            && self.input_mode == other.input_mode
    }
}

fn angles_within(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    angle_delta(a.x, b.x) <= tolerance
        && angle_delta(a.y, b.y) <= tolerance
        && angle_delta(a.z, b.z) <= tolerance
}

/// Shortest absolute distance between two angles in degrees.
pub fn angle_delta(a: f32, b: f32) -> f32 {
    normalize_angle(a - b).abs()
}
