use crate::data::{EntityId, Pose};
use crate::smoothing::SmoothingEngine;

/// A peer entity as seen by a move-executing context: its own received
/// state history plus the pose currently presented to the simulation.
pub struct PeerEntity {
    pub id: EntityId,
    pub smoothing: SmoothingEngine,
    pub pose: Pose,
}

impl PeerEntity {
    pub fn new(id: EntityId, smoothing: SmoothingEngine) -> Self {
        Self {
            id,
            smoothing,
            pose: Pose::default(),
        }
    }
}

/// The pre-rollback poses of every peer that was actually rewound. Must be
/// restored immediately after the single move finishes executing.
#[must_use = "rolled back peers must be restored after the move executes"]
pub struct RollbackSnapshot {
    saved: Vec<(EntityId, Pose)>,
}

impl RollbackSnapshot {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn restore(self, peers: &mut [PeerEntity]) {
        for (id, pose) in self.saved {
            if let Some(peer) = peers.iter_mut().find(|p| p.id == id) {
                peer.pose = pose;
            }
        }
    }
}

/// Rewinds every peer with usable history to its state at
/// `move_timestamp - simulation_delay`, using the same bracket search the
/// smoothing engine applies against that peer's own queue. The executing
/// context then sees the world as the move's author saw it. Peers without
/// any received state are left untouched.
pub fn rollback(peers: &mut [PeerEntity], move_timestamp: f32) -> RollbackSnapshot {
    let mut saved = Vec::new();
    for peer in peers.iter_mut() {
        let time = move_timestamp - peer.smoothing.simulation_delay();
        if let Some(sample) = peer.smoothing.sample_at(time) {
            saved.push((peer.id, peer.pose));
            peer.pose = sample.state.pose;
        }
    }
    RollbackSnapshot { saved }
}
