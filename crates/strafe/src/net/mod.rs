mod channel;
mod wire;

pub use channel::{ChannelId, ReplicationChannel, StateAssembler};
pub use wire::{
    MoveWireConfig, StateWireConfig, WireBound, WireError, WireMove, WireMoveBatch, WireState,
    decode_bound_value, decode_move, decode_state, encode_bound_value, encode_move,
    input_flag_mask,
};
