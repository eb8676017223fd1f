mod bound;
mod moves;
mod pose;
mod quantize;
mod state;

pub use bound::{
    BindError, BoundDataRegistry, BoundKind, BoundSet, BoundSlot, BoundSlotId, BoundValue,
    DEFAULT_SLOTS_PER_KIND,
};
pub use moves::{InputFlags, Move, MoveInput};
pub use pose::{InputMode, Pose, QuantizeConfig, angle_delta};
pub use quantize::{
    DecimalQuantization, SizeQuantization, angle_tolerance, decimal_tolerance, normalize_angle,
    quantize_angle, quantize_decimal, quantize_decimal_vector, quantize_rotator, quantize_unit,
    quantize_unit_vector, unit_tolerance,
};
pub use state::{EntityId, RecipientRole, State};
