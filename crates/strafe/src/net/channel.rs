use glam::Vec3;

use crate::data::{
    BoundDataRegistry, BoundValue, InputMode, RecipientRole, State, angle_delta, angle_tolerance,
    decimal_tolerance, quantize_angle, quantize_decimal_vector,
};

use super::wire::{
    StateWireConfig, WireError, WireState, decode_state, encode_bound_value, input_flag_mask,
};
use crate::data::QuantizeConfig;

/// Identifies one observer of an entity. Channels are owned by the
/// replication layer and indexed by this id, not by a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

#[derive(Debug, Clone, Copy)]
struct HoldLock {
    value: BoundValue,
    until: f32,
}

/// Per-observer serialization state. A component is only written to the
/// wire when it changed beyond the quantization tolerance since the last
/// value this channel actually delivered; the receiver reuses its previous
/// value for everything suppressed. Force-update slots lock the sent value
/// for a minimum hold duration after a change so the transition cannot be
/// flapped away before an update observes it.
#[derive(Debug)]
pub struct ReplicationChannel {
    id: ChannelId,
    role: RecipientRole,
    last_velocity: Option<Vec3>,
    last_location: Option<Vec3>,
    last_rotation: [Option<f32>; 3],
    last_control_rotation: [Option<f32>; 3],
    last_input_mode: Option<InputMode>,
    last_input_flags: Option<u16>,
    last_bound: Vec<Option<BoundValue>>,
    holds: Vec<Option<HoldLock>>,
    next_full_serialization: f32,
}

impl ReplicationChannel {
    pub fn new(id: ChannelId, role: RecipientRole, registry: &BoundDataRegistry) -> Self {
        Self {
            id,
            role,
            last_velocity: None,
            last_location: None,
            last_rotation: [None; 3],
            last_control_rotation: [None; 3],
            last_input_mode: None,
            last_input_flags: None,
            last_bound: vec![None; registry.len()],
            holds: vec![None; registry.len()],
            next_full_serialization: 0.0,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn role(&self) -> RecipientRole {
        self.role
    }

    /// Forces the next update to serialize every replicated field anew.
    pub fn mark_dirty(&mut self) {
        self.last_velocity = None;
        self.last_location = None;
        self.last_rotation = [None; 3];
        self.last_control_rotation = [None; 3];
        self.last_input_mode = None;
        self.last_input_flags = None;
        self.last_bound.fill(None);
    }

    /// Builds the wire form of a state for this channel. `optimize_traffic`
    /// off or an elapsed full-serialization interval bypasses the change
    /// suppression entirely.
    pub fn encode_state(
        &mut self,
        state: &State,
        config: &StateWireConfig,
        registry: &BoundDataRegistry,
        optimize_traffic: bool,
        default_hold_time: f32,
        full_serialization_interval: f32,
        now: f32,
    ) -> WireState {
        let mut force_full = !optimize_traffic;
        if full_serialization_interval > 0.0 && now >= self.next_full_serialization {
            self.next_full_serialization = now + full_serialization_interval;
            force_full = true;
        }
        if force_full {
            self.mark_dirty();
        }

        let autonomous = self.role == RecipientRole::AutonomousProxy;
        let quantize = &state.quantize;
        let mut pose = state.pose;
        pose.quantize(quantize);

        // A minimal update to the owning client carries only velocity, input
        // mode and bound data; everything else stays at the predicted value.
        let positional = state.contains_full_batch;

        let velocity = if config.serialize_velocity {
            let current = quantize_decimal_vector(pose.velocity, quantize.velocity);
            let tolerance = decimal_tolerance(quantize.velocity);
            let unchanged = self
                .last_velocity
                .is_some_and(|prev| (current - prev).abs().max_element() <= tolerance);
            self.last_velocity = Some(current);
            if unchanged { None } else { Some(current.into()) }
        } else {
            None
        };

        let location = if positional && config.serialize_location {
            let current = quantize_decimal_vector(pose.location, quantize.location);
            let tolerance = decimal_tolerance(quantize.location);
            let unchanged = self
                .last_location
                .is_some_and(|prev| (current - prev).abs().max_element() <= tolerance);
            self.last_location = Some(current);
            if unchanged { None } else { Some(current.into()) }
        } else {
            None
        };

        let mut rotation = [None; 3];
        let mut control_rotation = [None; 3];
        if positional {
            for axis in 0..3 {
                if config.serialize_rotation[axis] {
                    let current = quantize_angle(pose.rotation[axis], quantize.rotation);
                    let tolerance = angle_tolerance(quantize.rotation);
                    let unchanged = self.last_rotation[axis]
                        .is_some_and(|prev| angle_delta(current, prev) <= tolerance);
                    self.last_rotation[axis] = Some(current);
                    if !unchanged {
                        rotation[axis] = Some(current);
                    }
                }
                if config.serialize_control_rotation[axis] {
                    let current =
                        quantize_angle(pose.control_rotation[axis], quantize.control_rotation);
                    let tolerance = angle_tolerance(quantize.control_rotation);
                    let unchanged = self.last_control_rotation[axis]
                        .is_some_and(|prev| angle_delta(current, prev) <= tolerance);
                    self.last_control_rotation[axis] = Some(current);
                    if !unchanged {
                        control_rotation[axis] = Some(current);
                    }
                }
            }
        }

        let input_mode = if config.serialize_input_mode {
            let unchanged = self.last_input_mode == Some(pose.input_mode);
            self.last_input_mode = Some(pose.input_mode);
            if unchanged { None } else { Some(pose.input_mode as u8) }
        } else {
            None
        };

        let input_flags = if !autonomous && config.num_serialized_input_flags > 0 {
            let masked = state.input_flags.bits()
                & input_flag_mask(config.num_serialized_input_flags);
            let unchanged = self.last_input_flags == Some(masked);
            self.last_input_flags = Some(masked);
            if unchanged { None } else { Some(masked) }
        } else {
            None
        };

        let mut bound = Vec::with_capacity(registry.len());
        if config.serialize_bound_data {
            for (index, slot) in registry.slots().iter().enumerate() {
                if !slot.replicates_to(autonomous) {
                    bound.push(None);
                    continue;
                }
                let Some(current) = state.bound.raw().get(index).copied().flatten() else {
                    bound.push(None);
                    continue;
                };
                if let Some(hold) = self.holds[index] {
                    if now < hold.until {
                        bound.push(Some(encode_bound_value(&hold.value)));
                        continue;
                    }
                    self.holds[index] = None;
                }
                let changed = !matches!(
                    self.last_bound[index],
                    Some(prev) if prev.approx_eq(&current)
                );
                if changed || force_full {
                    self.last_bound[index] = Some(current);
                    if slot.force_update && changed {
                        let hold_time = if slot.min_hold_time > 0.0 {
                            slot.min_hold_time
                        } else {
                            default_hold_time
                        };
                        self.holds[index] = Some(HoldLock {
                            value: current,
                            until: now + hold_time,
                        });
                    }
                    bound.push(Some(encode_bound_value(&current)));
                } else {
                    bound.push(None);
                }
            }
        } else {
            bound.resize(registry.len(), None);
        }

        WireState {
            timestamp: state.timestamp,
            entity: state.entity.0,
            autonomous,
            full_batch: state.contains_full_batch,
            velocity,
            location,
            rotation,
            control_rotation,
            input_mode,
            input_flags,
            bound,
        }
    }
}

/// Receiving counterpart of a replication channel: reassembles full states
/// from suppressed wire updates by completing them from the last state
/// applied for this entity. Stale or duplicate updates (timestamp not newer
/// than the last applied) are dropped silently.
#[derive(Debug)]
pub struct StateAssembler {
    registry: BoundDataRegistry,
    quantize: QuantizeConfig,
    last_known: Option<State>,
    last_applied_timestamp: f32,
}

impl StateAssembler {
    pub fn new(registry: BoundDataRegistry, quantize: QuantizeConfig) -> Self {
        Self {
            registry,
            quantize,
            last_known: None,
            last_applied_timestamp: -1.0,
        }
    }

    /// Returns `Ok(None)` for stale updates; a decode failure is fatal for
    /// the connection.
    pub fn assemble(&mut self, wire: &WireState) -> Result<Option<State>, WireError> {
        if wire.timestamp <= self.last_applied_timestamp {
            return Ok(None);
        }
        let state = decode_state(wire, self.last_known.as_ref(), &self.registry, self.quantize)?;
        self.last_applied_timestamp = state.timestamp;
        self.last_known = Some(state.clone());
        Ok(Some(state))
    }

    pub fn last_known(&self) -> Option<&State> {
        self.last_known.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BoundKind, EntityId, InputFlags, Pose, QuantizeConfig};

    fn test_state(timestamp: f32, registry: &BoundDataRegistry) -> State {
        let mut state = State::new(
            timestamp,
            EntityId(1),
            RecipientRole::SimulatedProxy,
            Pose {
                velocity: Vec3::new(1.0, 0.0, 0.0),
                location: Vec3::new(10.0, 0.0, 0.0),
                ..Pose::default()
            },
            QuantizeConfig::default(),
        );
        state.bound = registry.empty_set();
        state
    }

    #[test]
    fn unchanged_values_suppressed_on_second_update() {
        let registry = BoundDataRegistry::new();
        let config = StateWireConfig::default();
        let mut channel =
            ReplicationChannel::new(ChannelId(1), RecipientRole::SimulatedProxy, &registry);

        let state = test_state(1.0, &registry);
        let first = channel.encode_state(&state, &config, &registry, true, 0.02, 0.0, 1.0);
        assert!(first.velocity.is_some());
        assert!(first.location.is_some());

        let state = test_state(1.05, &registry);
        let second = channel.encode_state(&state, &config, &registry, true, 0.02, 0.0, 1.05);
        assert!(second.velocity.is_none());
        assert!(second.location.is_none());
    }

    #[test]
    fn optimize_traffic_off_serializes_everything() {
        let registry = BoundDataRegistry::new();
        let config = StateWireConfig::default();
        let mut channel =
            ReplicationChannel::new(ChannelId(1), RecipientRole::SimulatedProxy, &registry);

        for timestamp in [1.0, 1.05] {
            let state = test_state(timestamp, &registry);
            let wire =
                channel.encode_state(&state, &config, &registry, false, 0.02, 0.0, timestamp);
            assert!(wire.velocity.is_some());
            assert!(wire.location.is_some());
        }
    }

    #[test]
    fn location_not_marked_delivered_by_minimal_updates() {
        let registry = BoundDataRegistry::new();
        let config = StateWireConfig::default();
        let mut channel =
            ReplicationChannel::new(ChannelId(1), RecipientRole::AutonomousProxy, &registry);

        let mut minimal = test_state(1.0, &registry);
        minimal.recipient = RecipientRole::AutonomousProxy;
        minimal.contains_full_batch = false;
        let wire = channel.encode_state(&minimal, &config, &registry, true, 0.02, 0.0, 1.0);
        assert!(wire.location.is_none());

        // The first full batch must carry the location even though the pose
        // never changed, because no minimal update ever delivered it.
        let mut full = test_state(1.05, &registry);
        full.recipient = RecipientRole::AutonomousProxy;
        let wire = channel.encode_state(&full, &config, &registry, true, 0.02, 0.0, 1.05);
        assert!(wire.location.is_some());
    }

    #[test]
    fn full_serialization_interval_resyncs() {
        let registry = BoundDataRegistry::new();
        let config = StateWireConfig::default();
        let mut channel =
            ReplicationChannel::new(ChannelId(1), RecipientRole::SimulatedProxy, &registry);

        let state = test_state(1.0, &registry);
        channel.encode_state(&state, &config, &registry, true, 0.02, 5.0, 1.0);
        let state = test_state(2.0, &registry);
        let suppressed = channel.encode_state(&state, &config, &registry, true, 0.02, 5.0, 2.0);
        assert!(suppressed.velocity.is_none());

        // Past the interval everything goes out again, changed or not.
        let state = test_state(7.0, &registry);
        let resync = channel.encode_state(&state, &config, &registry, true, 0.02, 5.0, 7.0);
        assert!(resync.velocity.is_some());
        assert!(resync.location.is_some());
    }

    #[test]
    fn force_update_holds_value_for_min_duration() {
        let mut registry = BoundDataRegistry::new();
        let slot = registry
            .bind("hit", BoundKind::Bool, true, true, true, 0.1)
            .unwrap();
        let config = StateWireConfig::default();
        let mut channel =
            ReplicationChannel::new(ChannelId(1), RecipientRole::SimulatedProxy, &registry);

        let mut state = test_state(1.0, &registry);
        state
            .bound
            .set(&registry, slot, BoundValue::Bool(true))
            .unwrap();
        let wire = channel.encode_state(&state, &config, &registry, true, 0.02, 0.0, 1.0);
        assert!(wire.bound[0].is_some());

        // The value flips back immediately, but the hold keeps serializing
        // the transition value until the hold expires.
        let mut state = test_state(1.02, &registry);
        state
            .bound
            .set(&registry, slot, BoundValue::Bool(false))
            .unwrap();
        let wire = channel.encode_state(&state, &config, &registry, true, 0.02, 0.0, 1.02);
        assert_eq!(wire.bound[0], Some(encode_bound_value(&BoundValue::Bool(true))));

        // After the hold window the current value goes out.
        let mut state = test_state(1.2, &registry);
        state
            .bound
            .set(&registry, slot, BoundValue::Bool(false))
            .unwrap();
        let wire = channel.encode_state(&state, &config, &registry, true, 0.02, 0.0, 1.2);
        assert_eq!(
            wire.bound[0],
            Some(encode_bound_value(&BoundValue::Bool(false)))
        );
    }

    #[test]
    fn autonomous_channel_never_sends_input_flags() {
        let registry = BoundDataRegistry::new();
        let config = StateWireConfig::default();
        let mut channel =
            ReplicationChannel::new(ChannelId(2), RecipientRole::AutonomousProxy, &registry);
        let mut state = test_state(1.0, &registry);
        state.recipient = RecipientRole::AutonomousProxy;
        state.input_flags = InputFlags::FLAG_1;
        let wire = channel.encode_state(&state, &config, &registry, true, 0.02, 0.0, 1.0);
        assert!(wire.input_flags.is_none());
        assert!(wire.autonomous);
    }
}
