pub mod client;
pub mod config;
pub mod data;
pub mod net;
pub mod rollback;
pub mod server;
pub mod sim;
pub mod smoothing;

pub use client::{MoveQueue, PredictionEngine, ReplayEngine, ReplayOutcome};
pub use config::{ConfigError, NetworkPreset, SyncConfig};
pub use data::{
    BindError, BoundDataRegistry, BoundKind, BoundSet, BoundSlot, BoundSlotId, BoundValue,
    DecimalQuantization, EntityId, InputFlags, InputMode, Move, MoveInput, Pose, QuantizeConfig,
    RecipientRole, SizeQuantization, State,
};
pub use net::{
    ChannelId, MoveWireConfig, ReplicationChannel, StateAssembler, StateWireConfig, WireError,
    WireMove, WireMoveBatch, WireState,
};
pub use rollback::{PeerEntity, RollbackSnapshot, rollback};
pub use server::{BatchOutcome, MoveResult, ReconciliationEngine, TimestampVerifier, Verdict};
pub use sim::{MIN_DELTA_TIME, Simulation, execute_move};
pub use smoothing::{
    CubicInterpolator, InterpolationMethod, Interpolator, LinearInterpolator, SmoothResult,
    SmoothSample, SmoothingEngine, StateQueue,
};
