use serde::{Deserialize, Serialize};

use crate::data::{QuantizeConfig, SizeQuantization};
use crate::net::{MoveWireConfig, StateWireConfig};
use crate::smoothing::InterpolationMethod;

/// Predefined value sets for common network conditions. Loading a preset
/// overwrites every tuning value; the serialization configs stay untouched
/// because they are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPreset {
    /// Local network, no latency, ideal conditions.
    Lan,
    /// Wired connections, ping < 60 ms, minimal jitter, no packet loss.
    Competitive,
    /// Stable connections, ping < 100 ms, tolerable packet loss.
    Regular,
    /// Unstable connections, ping up to 200 ms, serious packet loss.
    LowEnd,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("client_send_rate must be greater than zero")]
    ZeroSendRate,
    #[error("move_queue_max_size must be greater than zero")]
    EmptyMoveQueue,
    #[error("state_queue_max_size must be at least 2")]
    StateQueueTooSmall,
    #[error("max_time_step must be positive")]
    InvalidTimeStep,
    #[error("max_iterations must be greater than zero")]
    ZeroIterations,
    #[error("simulation_delay must not be negative")]
    NegativeSimulationDelay,
    #[error("byte quantization cannot round-trip rotations reliably")]
    ByteRotationQuantization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    // Simulation stepping.
    pub max_time_step: f32,
    pub max_iterations: u32,

    // Move timing and queueing.
    /// Upper clamp for the delta time of a move executed on the server.
    /// Clients running slower than 1 / this value are effectively slowed.
    pub max_server_delta_time: f32,
    /// Maximum real time a single (possibly combined) client move may
    /// represent.
    pub max_client_delta_time: f32,
    /// Target move batches per second; the send interval is a soft lower
    /// bound, no batch is held longer than its reciprocal.
    pub client_send_rate: u32,
    pub move_queue_max_size: usize,
    pub state_queue_max_size: usize,

    // Reconciliation tolerances.
    pub max_velocity_error: f32,
    pub max_location_error: f32,
    pub max_rotation_error: f32,
    pub max_control_rotation_error: f32,

    // Replay gating.
    pub always_replay: bool,
    pub only_replay_when_moving: bool,
    pub replay_speed_threshold: f32,

    // Traffic optimization.
    pub optimize_traffic: bool,
    pub min_rep_hold_time: f32,
    /// If greater than zero, fully serialize all data anew at this period
    /// as a resync failsafe.
    pub full_serialization_interval: f32,

    // Timestamp verification.
    pub verify_client_timestamps: bool,
    pub max_allowed_timestamp_deviation: f32,
    pub max_strike_count: u32,
    pub strike_reset_interval: f32,

    // Smoothing.
    pub simulation_delay: f32,
    pub interpolation_method: InterpolationMethod,
    pub allow_extrapolation: bool,

    // Peer rollback during move execution.
    pub rollback_server_pawns: bool,
    pub rollback_client_pawns: bool,

    // Wire contract; fixed for the lifetime of a connection.
    pub quantize: QuantizeConfig,
    pub move_wire: MoveWireConfig,
    pub state_wire: StateWireConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_time_step: 0.033334,
            max_iterations: 10,
            max_server_delta_time: 0.05,
            max_client_delta_time: 0.01,
            client_send_rate: 100,
            move_queue_max_size: 64,
            state_queue_max_size: 128,
            max_velocity_error: 0.5,
            max_location_error: 1.0,
            max_rotation_error: 5.0,
            max_control_rotation_error: 5.0,
            always_replay: false,
            only_replay_when_moving: false,
            replay_speed_threshold: 10.0,
            optimize_traffic: true,
            min_rep_hold_time: 0.02,
            full_serialization_interval: 0.0,
            verify_client_timestamps: false,
            max_allowed_timestamp_deviation: 0.08,
            max_strike_count: 2,
            strike_reset_interval: 10.0,
            simulation_delay: 0.15,
            interpolation_method: InterpolationMethod::Linear,
            allow_extrapolation: false,
            rollback_server_pawns: true,
            rollback_client_pawns: true,
            quantize: QuantizeConfig::default(),
            move_wire: MoveWireConfig::default(),
            state_wire: StateWireConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn preset(preset: NetworkPreset) -> Self {
        let base = Self::default();
        match preset {
            NetworkPreset::Lan => Self {
                client_send_rate: 100,
                simulation_delay: 0.05,
                interpolation_method: InterpolationMethod::Linear,
                allow_extrapolation: false,
                ..base
            },
            NetworkPreset::Competitive => Self {
                client_send_rate: 60,
                simulation_delay: 0.1,
                interpolation_method: InterpolationMethod::Linear,
                allow_extrapolation: false,
                ..base
            },
            NetworkPreset::Regular => Self {
                client_send_rate: 30,
                simulation_delay: 0.15,
                interpolation_method: InterpolationMethod::Cubic,
                allow_extrapolation: false,
                ..base
            },
            NetworkPreset::LowEnd => Self {
                client_send_rate: 20,
                simulation_delay: 0.25,
                interpolation_method: InterpolationMethod::Cubic,
                allow_extrapolation: true,
                ..base
            },
        }
    }

    /// Soft lower bound between batch sends, and the flush interval that
    /// forces a new queue entry instead of combining.
    pub fn min_send_interval(&self) -> f32 {
        1.0 / self.client_send_rate.max(1) as f32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_send_rate == 0 {
            return Err(ConfigError::ZeroSendRate);
        }
        if self.move_queue_max_size == 0 {
            return Err(ConfigError::EmptyMoveQueue);
        }
        if self.state_queue_max_size < 2 {
            return Err(ConfigError::StateQueueTooSmall);
        }
        if self.max_time_step <= 0.0 {
            return Err(ConfigError::InvalidTimeStep);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.simulation_delay < 0.0 {
            return Err(ConfigError::NegativeSimulationDelay);
        }
        if self.quantize.rotation == SizeQuantization::Byte
            || self.quantize.control_rotation == SizeQuantization::Byte
            || self.move_wire.out_rotation_quantize == SizeQuantization::Byte
            || self.move_wire.out_control_rotation_quantize == SizeQuantization::Byte
        {
            return Err(ConfigError::ByteRotationQuantization);
        }
        Ok(())
    }
}
