use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::data::{
    BoundDataRegistry, BoundKind, BoundValue, DecimalQuantization, EntityId, InputFlags, Move,
    MoveInput, Pose, QuantizeConfig, RecipientRole, SizeQuantization, State, angle_delta,
    angle_tolerance, decimal_tolerance, quantize_angle, quantize_decimal, quantize_unit,
    unit_tolerance,
};

/// Serialization settings for the client -> server move stream. Fixed for
/// the lifetime of a connection; both ends must agree or decoding fails.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MoveWireConfig {
    pub input_vector_quantize: SizeQuantization,
    pub out_velocity_quantize: DecimalQuantization,
    pub out_location_quantize: DecimalQuantization,
    pub out_rotation_quantize: SizeQuantization,
    pub out_control_rotation_quantize: SizeQuantization,
    pub serialize_input_vector: [bool; 3],
    pub serialize_out_velocity: bool,
    pub serialize_out_location: bool,
    pub serialize_out_rotation: [bool; 3],
    pub serialize_out_control_rotation: [bool; 3],
    /// Flags are serialized in order from bit 1; bits past this count are
    /// dropped on the wire.
    pub num_serialized_input_flags: u32,
}

impl Default for MoveWireConfig {
    fn default() -> Self {
        Self {
            input_vector_quantize: SizeQuantization::Short,
            out_velocity_quantize: DecimalQuantization::RoundTwoDecimals,
            out_location_quantize: DecimalQuantization::RoundTwoDecimals,
            out_rotation_quantize: SizeQuantization::Short,
            out_control_rotation_quantize: SizeQuantization::Short,
            serialize_input_vector: [true; 3],
            serialize_out_velocity: true,
            serialize_out_location: true,
            serialize_out_rotation: [true; 3],
            serialize_out_control_rotation: [true; 3],
            num_serialized_input_flags: 16,
        }
    }
}

/// Serialization settings for the server -> client state stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateWireConfig {
    pub serialize_velocity: bool,
    pub serialize_location: bool,
    pub serialize_rotation: [bool; 3],
    pub serialize_control_rotation: [bool; 3],
    pub serialize_input_mode: bool,
    pub serialize_bound_data: bool,
    /// Input flags replicate to simulated proxies only.
    pub num_serialized_input_flags: u32,
}

impl Default for StateWireConfig {
    fn default() -> Self {
        Self {
            serialize_velocity: true,
            serialize_location: true,
            serialize_rotation: [true; 3],
            serialize_control_rotation: [true; 3],
            serialize_input_mode: true,
            serialize_bound_data: true,
            num_serialized_input_flags: 16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("negative timestamp on wire")]
    InvalidTimestamp,
    #[error("bound slot {slot} expected {expected:?}")]
    BoundKindMismatch { slot: u16, expected: BoundKind },
    #[error("bound slot count {got} does not match registry ({expected})")]
    BoundSlotCount { got: usize, expected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum WireBound {
    Bool(bool),
    HalfByte(u8),
    Byte(u8),
    Int(i32),
    Float(f32),
    Vector([f32; 3]),
    UnitVector([f32; 3]),
    Rotator([f32; 3]),
    EntityRef(u32),
}

pub fn encode_bound_value(value: &BoundValue) -> WireBound {
    match *value {
        BoundValue::Bool(v) => WireBound::Bool(v),
        BoundValue::HalfByte(v) => WireBound::HalfByte(v & 0x0F),
        BoundValue::Byte(v) => WireBound::Byte(v),
        BoundValue::Int(v) => WireBound::Int(v),
        BoundValue::Float(v) => WireBound::Float(v),
        BoundValue::Vector(v) => WireBound::Vector(v.into()),
        BoundValue::UnitVector(v) => WireBound::UnitVector(v.into()),
        BoundValue::Rotator(v) => WireBound::Rotator(v.into()),
        BoundValue::EntityRef(v) => WireBound::EntityRef(v.0),
    }
}

pub fn decode_bound_value(
    wire: &WireBound,
    expected: BoundKind,
    slot: u16,
) -> Result<BoundValue, WireError> {
    let value = match *wire {
        WireBound::Bool(v) => BoundValue::Bool(v),
        WireBound::HalfByte(v) => BoundValue::HalfByte(v & 0x0F),
        WireBound::Byte(v) => BoundValue::Byte(v),
        WireBound::Int(v) => BoundValue::Int(v),
        WireBound::Float(v) => BoundValue::Float(v),
        WireBound::Vector(v) => BoundValue::Vector(v.into()),
        WireBound::UnitVector(v) => BoundValue::UnitVector(v.into()),
        WireBound::Rotator(v) => BoundValue::Rotator(v.into()),
        WireBound::EntityRef(v) => BoundValue::EntityRef(EntityId(v)),
    };
    if value.kind() != expected {
        return Err(WireError::BoundKindMismatch { slot, expected });
    }
    Ok(value)
}

/// One move on the wire. `None` components were either disabled by the
/// connection config or unchanged since the previous move in the stream;
/// the receiver reuses its previous value for them. The timestamp is always
/// sent uncompressed.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WireMove {
    pub timestamp: f32,
    pub input_vector: [Option<f32>; 3],
    pub input_flags: u16,
    pub input_mode: u8,
    pub out_velocity: Option<[f32; 3]>,
    pub out_location: Option<[f32; 3]>,
    pub out_rotation: [Option<f32>; 3],
    pub out_control_rotation: [Option<f32>; 3],
    pub bound: Vec<Option<WireBound>>,
}

/// One reliable, ordered batch of moves; one of these per send interval.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WireMoveBatch {
    pub moves: Vec<WireMove>,
}

impl WireMoveBatch {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(WireError::Serialize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(WireError::Deserialize)
    }
}

/// One replicated state update for a single recipient role.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WireState {
    pub timestamp: f32,
    pub entity: u32,
    pub autonomous: bool,
    pub full_batch: bool,
    pub velocity: Option<[f32; 3]>,
    pub location: Option<[f32; 3]>,
    pub rotation: [Option<f32>; 3],
    pub control_rotation: [Option<f32>; 3],
    pub input_mode: Option<u8>,
    pub input_flags: Option<u16>,
    pub bound: Vec<Option<WireBound>>,
}

impl WireState {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(WireError::Serialize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(WireError::Deserialize)
    }
}

pub fn input_flag_mask(num_serialized: u32) -> u16 {
    if num_serialized >= 16 {
        u16::MAX
    } else {
        (1u16 << num_serialized) - 1
    }
}

fn suppress(current: f32, previous: Option<f32>, tolerance: f32) -> Option<f32> {
    match previous {
        Some(prev) if (current - prev).abs() <= tolerance => None,
        _ => Some(current),
    }
}

fn suppress_angle(current: f32, previous: Option<f32>, tolerance: f32) -> Option<f32> {
    match previous {
        Some(prev) if angle_delta(current, prev) <= tolerance => None,
        _ => Some(current),
    }
}

fn suppress_vector(
    current: [f32; 3],
    previous: Option<[f32; 3]>,
    tolerance: f32,
) -> Option<[f32; 3]> {
    match previous {
        Some(prev)
            if (current[0] - prev[0]).abs() <= tolerance
                && (current[1] - prev[1]).abs() <= tolerance
                && (current[2] - prev[2]).abs() <= tolerance =>
        {
            None
        }
        _ => Some(current),
    }
}

/// Encodes a move against the previous move in the same stream. Values are
/// snapped to the configured grid before the change check so the suppression
/// decision matches what the receiver reconstructs.
pub fn encode_move(mv: &Move, previous: Option<&Move>, config: &MoveWireConfig) -> WireMove {
    let unit_tol = unit_tolerance(config.input_vector_quantize);
    let vel_tol = decimal_tolerance(config.out_velocity_quantize);
    let loc_tol = decimal_tolerance(config.out_location_quantize);
    let rot_tol = angle_tolerance(config.out_rotation_quantize);
    let ctl_tol = angle_tolerance(config.out_control_rotation_quantize);

    let mut input_vector = [None; 3];
    for axis in 0..3 {
        if !config.serialize_input_vector[axis] {
            continue;
        }
        let current = quantize_unit(mv.input.input_vector[axis], config.input_vector_quantize);
        let prev = previous.map(|p| p.input.input_vector[axis]);
        input_vector[axis] = suppress(current, prev, unit_tol);
    }

    let out_velocity = if config.serialize_out_velocity {
        let current = [
            quantize_decimal(mv.out_pose.velocity.x, config.out_velocity_quantize),
            quantize_decimal(mv.out_pose.velocity.y, config.out_velocity_quantize),
            quantize_decimal(mv.out_pose.velocity.z, config.out_velocity_quantize),
        ];
        suppress_vector(
            current,
            previous.map(|p| p.out_pose.velocity.into()),
            vel_tol,
        )
    } else {
        None
    };

    let out_location = if config.serialize_out_location {
        let current = [
            quantize_decimal(mv.out_pose.location.x, config.out_location_quantize),
            quantize_decimal(mv.out_pose.location.y, config.out_location_quantize),
            quantize_decimal(mv.out_pose.location.z, config.out_location_quantize),
        ];
        suppress_vector(
            current,
            previous.map(|p| p.out_pose.location.into()),
            loc_tol,
        )
    } else {
        None
    };

    let mut out_rotation = [None; 3];
    let mut out_control_rotation = [None; 3];
    for axis in 0..3 {
        if config.serialize_out_rotation[axis] {
            let current =
                quantize_angle(mv.out_pose.rotation[axis], config.out_rotation_quantize);
            let prev = previous.map(|p| p.out_pose.rotation[axis]);
            out_rotation[axis] = suppress_angle(current, prev, rot_tol);
        }
        if config.serialize_out_control_rotation[axis] {
            let current = quantize_angle(
                mv.out_pose.control_rotation[axis],
                config.out_control_rotation_quantize,
            );
            let prev = previous.map(|p| p.out_pose.control_rotation[axis]);
            out_control_rotation[axis] = suppress_angle(current, prev, ctl_tol);
        }
    }

    let mut bound = Vec::with_capacity(mv.bound_in.len());
    for (index, value) in mv.bound_in.raw().iter().enumerate() {
        let encoded = match value {
            Some(current) => {
                let prev = previous.and_then(|p| p.bound_in.raw().get(index).copied().flatten());
                match prev {
                    Some(prev) if prev.approx_eq(current) => None,
                    _ => Some(encode_bound_value(current)),
                }
            }
            None => None,
        };
        bound.push(encoded);
    }

    WireMove {
        timestamp: mv.timestamp,
        input_vector,
        input_flags: mv.input.flags.bits() & input_flag_mask(config.num_serialized_input_flags),
        input_mode: mv.out_pose.input_mode as u8,
        out_velocity,
        out_location,
        out_rotation,
        out_control_rotation,
        bound,
    }
}

/// Reconstructs a move, filling every suppressed component from the
/// previous move in the stream ("no new value, reuse previous").
pub fn decode_move(
    wire: &WireMove,
    previous: &Move,
    config: &MoveWireConfig,
    registry: &BoundDataRegistry,
) -> Result<Move, WireError> {
    if !wire.timestamp.is_finite() || wire.timestamp < 0.0 {
        return Err(WireError::InvalidTimestamp);
    }
    if wire.bound.len() != registry.len() {
        return Err(WireError::BoundSlotCount {
            got: wire.bound.len(),
            expected: registry.len(),
        });
    }

    let mut mv = Move::new(wire.timestamp, 0.0, MoveInput::default());
    for axis in 0..3 {
        mv.input.input_vector[axis] = wire.input_vector[axis]
            .unwrap_or(previous.input.input_vector[axis]);
    }
    mv.input.flags = InputFlags::from_bits_truncate(
        wire.input_flags & input_flag_mask(config.num_serialized_input_flags),
    );

    let mut out = previous.out_pose;
    if let Some(v) = wire.out_velocity {
        out.velocity = v.into();
    }
    if let Some(l) = wire.out_location {
        out.location = l.into();
    }
    for axis in 0..3 {
        if let Some(r) = wire.out_rotation[axis] {
            out.rotation[axis] = r;
        }
        if let Some(c) = wire.out_control_rotation[axis] {
            out.control_rotation[axis] = c;
        }
    }
    out.input_mode = wire.input_mode.into();
    mv.out_pose = out;
    mv.in_pose = previous.out_pose;

    let mut bound_in = registry.empty_set();
    for (index, slot) in registry.slots().iter().enumerate() {
        let value = match &wire.bound[index] {
            Some(wire_value) => Some(decode_bound_value(wire_value, slot.kind, index as u16)?),
            None => previous.bound_in.raw().get(index).copied().flatten(),
        };
        bound_in.set_raw(index, value);
    }
    mv.bound_in = bound_in;

    Ok(mv)
}

/// Reconstructs a state, filling suppressed components from the last state
/// received for the same role so no sentinel survives the unpack.
pub fn decode_state(
    wire: &WireState,
    last_known: Option<&State>,
    registry: &BoundDataRegistry,
    quantize: QuantizeConfig,
) -> Result<State, WireError> {
    if !wire.timestamp.is_finite() || wire.timestamp < 0.0 {
        return Err(WireError::InvalidTimestamp);
    }
    if wire.bound.len() != registry.len() {
        return Err(WireError::BoundSlotCount {
            got: wire.bound.len(),
            expected: registry.len(),
        });
    }

    let recipient = if wire.autonomous {
        RecipientRole::AutonomousProxy
    } else {
        RecipientRole::SimulatedProxy
    };
    let mut pose = last_known.map(|s| s.pose).unwrap_or_else(Pose::default);
    if let Some(v) = wire.velocity {
        pose.velocity = v.into();
    }
    if let Some(l) = wire.location {
        pose.location = l.into();
    }
    for axis in 0..3 {
        if let Some(r) = wire.rotation[axis] {
            pose.rotation[axis] = r;
        }
        if let Some(c) = wire.control_rotation[axis] {
            pose.control_rotation[axis] = c;
        }
    }
    if let Some(mode) = wire.input_mode {
        pose.input_mode = mode.into();
    }

    let mut state = State::new(wire.timestamp, EntityId(wire.entity), recipient, pose, quantize);
    state.contains_full_batch = wire.full_batch;
    state.input_flags = match wire.input_flags {
        Some(bits) => InputFlags::from_bits_truncate(bits),
        None => last_known
            .map(|s| s.input_flags)
            .unwrap_or_else(InputFlags::empty),
    };

    let mut bound = registry.empty_set();
    for (index, slot) in registry.slots().iter().enumerate() {
        let value = match &wire.bound[index] {
            Some(wire_value) => Some(decode_bound_value(wire_value, slot.kind, index as u16)?),
            None => last_known.and_then(|s| s.bound.raw().get(index).copied().flatten()),
        };
        bound.set_raw(index, value);
    }
    state.bound = bound;

    Ok(state)
}
