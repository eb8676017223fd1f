use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Size-based quantization for values with a known bounded range (angles,
/// unit vectors). Byte compression cannot be quantized back reliably by the
/// receiver and is rejected by config validation for replicated channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeQuantization {
    Byte,
    Short,
    None,
}

/// Decimal-based quantization for unbounded values (locations, velocities).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecimalQuantization {
    RoundWholeNumber,
    RoundOneDecimal,
    RoundTwoDecimals,
    None,
}

const SHORT_ANGLE_STEPS: f32 = 65536.0;
const BYTE_ANGLE_STEPS: f32 = 256.0;
const SHORT_UNIT_MAX: f32 = 32767.0;
const BYTE_UNIT_MAX: f32 = 127.0;

pub fn normalize_angle(deg: f32) -> f32 {
    let mut normalized = deg % 360.0;
    if normalized >= 180.0 {
        normalized -= 360.0;
    } else if normalized < -180.0 {
        normalized += 360.0;
    }
    normalized
}

pub fn quantize_decimal(value: f32, level: DecimalQuantization) -> f32 {
    match level {
        DecimalQuantization::RoundWholeNumber => value.round(),
        DecimalQuantization::RoundOneDecimal => (value * 10.0).round() / 10.0,
        DecimalQuantization::RoundTwoDecimals => (value * 100.0).round() / 100.0,
        DecimalQuantization::None => value,
    }
}

pub fn quantize_decimal_vector(v: Vec3, level: DecimalQuantization) -> Vec3 {
    Vec3::new(
        quantize_decimal(v.x, level),
        quantize_decimal(v.y, level),
        quantize_decimal(v.z, level),
    )
}

/// Snaps an angle in degrees onto the grid the wire encoding would produce,
/// so the local state matches what the remote end reconstructs.
pub fn quantize_angle(deg: f32, level: SizeQuantization) -> f32 {
    let normalized = normalize_angle(deg);
    match level {
        SizeQuantization::Short => {
            let step = 360.0 / SHORT_ANGLE_STEPS;
            normalize_angle((normalized / step).round() * step)
        }
        SizeQuantization::Byte => {
            let step = 360.0 / BYTE_ANGLE_STEPS;
            normalize_angle((normalized / step).round() * step)
        }
        SizeQuantization::None => normalized,
    }
}

pub fn quantize_rotator(rot: Vec3, level: SizeQuantization) -> Vec3 {
    Vec3::new(
        quantize_angle(rot.x, level),
        quantize_angle(rot.y, level),
        quantize_angle(rot.z, level),
    )
}

/// Snaps a component clamped to [-1, 1] onto the configured fixed-point grid.
/// Used for the directional input vector and unit-vector bound data.
pub fn quantize_unit(value: f32, level: SizeQuantization) -> f32 {
    let clamped = value.clamp(-1.0, 1.0);
    match level {
        SizeQuantization::Short => (clamped * SHORT_UNIT_MAX).round() / SHORT_UNIT_MAX,
        SizeQuantization::Byte => (clamped * BYTE_UNIT_MAX).round() / BYTE_UNIT_MAX,
        SizeQuantization::None => clamped,
    }
}

pub fn quantize_unit_vector(v: Vec3, level: SizeQuantization) -> Vec3 {
    Vec3::new(
        quantize_unit(v.x, level),
        quantize_unit(v.y, level),
        quantize_unit(v.z, level),
    )
}

/// Compare tolerance guaranteeing that two values which land on the same
/// grid point are treated as unchanged.
pub fn decimal_tolerance(level: DecimalQuantization) -> f32 {
    match level {
        DecimalQuantization::RoundWholeNumber => 0.5,
        DecimalQuantization::RoundOneDecimal => 0.05,
        DecimalQuantization::RoundTwoDecimals => 0.005,
        DecimalQuantization::None => 1e-6,
    }
}

/// Compare tolerance for angles in degrees. Rotators must be normalized
/// before comparing against this.
pub fn angle_tolerance(level: SizeQuantization) -> f32 {
    match level {
        SizeQuantization::Short => 360.0 / SHORT_ANGLE_STEPS,
        SizeQuantization::Byte => 360.0 / BYTE_ANGLE_STEPS,
        SizeQuantization::None => 1e-4,
    }
}

/// Compare tolerance for unit-range components.
pub fn unit_tolerance(level: SizeQuantization) -> f32 {
    match level {
        SizeQuantization::Short => 1.0 / SHORT_UNIT_MAX,
        SizeQuantization::Byte => 1.0 / BYTE_UNIT_MAX,
        SizeQuantization::None => 1e-6,
    }
}
