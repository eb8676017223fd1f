use serde::{Deserialize, Serialize};

use super::bound::BoundSet;
use super::moves::InputFlags;
use super::pose::{Pose, QuantizeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Who a replicated state is built for. The owning client receives minimal
/// diffs while its prediction holds; observers always receive full batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientRole {
    AutonomousProxy,
    SimulatedProxy,
}

/// One authoritative (or smoothing-derived) snapshot of an entity's motion
/// outputs. Produced fresh each reconciliation pass on the server and each
/// unpack on the client; never mutated once queued except for the working
/// copies the smoothing engine derives.
#[derive(Debug, Clone)]
pub struct State {
    /// Negative = invalid/uninitialized, never a valid sample.
    pub timestamp: f32,
    pub entity: EntityId,
    pub recipient: RecipientRole,
    pub pose: Pose,
    /// Bound input flags, replicated to simulated proxies only.
    pub input_flags: InputFlags,
    /// Whether this update carries every replicated field. A partial update
    /// to the owning client means its source move was accepted.
    pub contains_full_batch: bool,
    pub bound: BoundSet,
    /// Wire grid this state was quantized against, mirrored from the owning
    /// entity's configuration when the state was created.
    pub quantize: QuantizeConfig,
    /// Set only on smoothing products projected past the newest known state.
    pub extrapolated: bool,
}

impl State {
    pub fn empty(entity: EntityId, recipient: RecipientRole) -> Self {
        Self {
            timestamp: -1.0,
            entity,
            recipient,
            pose: Pose::default(),
            input_flags: InputFlags::empty(),
            contains_full_batch: true,
            bound: BoundSet::default(),
            quantize: QuantizeConfig::default(),
            extrapolated: false,
        }
    }

    pub fn new(
        timestamp: f32,
        entity: EntityId,
        recipient: RecipientRole,
        pose: Pose,
        quantize: QuantizeConfig,
    ) -> Self {
        Self {
            timestamp,
            entity,
            recipient,
            pose,
            input_flags: InputFlags::empty(),
            contains_full_batch: true,
            bound: BoundSet::default(),
            quantize,
            extrapolated: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.timestamp >= 0.0
    }
}
