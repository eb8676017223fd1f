use glam::Vec3;

use super::quantize::{SizeQuantization, quantize_unit_vector};
use super::state::EntityId;

pub const DEFAULT_SLOTS_PER_KIND: usize = 16;

const FLOAT_COMPARE_TOLERANCE: f32 = 1e-6;

/// The value categories that can be wired into the replication machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    Bool,
    HalfByte,
    Byte,
    Int,
    Float,
    Vector,
    UnitVector,
    Rotator,
    EntityRef,
}

/// A single bound value. `HalfByte` carries only its low nibble;
/// `UnitVector` components are clamped to [-1, 1] on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundValue {
    Bool(bool),
    HalfByte(u8),
    Byte(u8),
    Int(i32),
    Float(f32),
    Vector(Vec3),
    UnitVector(Vec3),
    Rotator(Vec3),
    EntityRef(EntityId),
}

impl BoundValue {
    pub fn kind(&self) -> BoundKind {
        match self {
            BoundValue::Bool(_) => BoundKind::Bool,
            BoundValue::HalfByte(_) => BoundKind::HalfByte,
            BoundValue::Byte(_) => BoundKind::Byte,
            BoundValue::Int(_) => BoundKind::Int,
            BoundValue::Float(_) => BoundKind::Float,
            BoundValue::Vector(_) => BoundKind::Vector,
            BoundValue::UnitVector(_) => BoundKind::UnitVector,
            BoundValue::Rotator(_) => BoundKind::Rotator,
            BoundValue::EntityRef(_) => BoundKind::EntityRef,
        }
    }

    /// Normalizes the payload to what survives a wire round trip.
    pub fn canonical(self) -> Self {
        match self {
            BoundValue::HalfByte(v) => BoundValue::HalfByte(v & 0x0F),
            BoundValue::UnitVector(v) => {
                BoundValue::UnitVector(quantize_unit_vector(v, SizeQuantization::Short))
            }
            other => other,
        }
    }

    /// Equality with float tolerance; discrete kinds compare exactly.
    pub fn approx_eq(&self, other: &BoundValue) -> bool {
        match (self, other) {
            (BoundValue::Bool(a), BoundValue::Bool(b)) => a == b,
            (BoundValue::HalfByte(a), BoundValue::HalfByte(b)) => a & 0x0F == b & 0x0F,
            (BoundValue::Byte(a), BoundValue::Byte(b)) => a == b,
            (BoundValue::Int(a), BoundValue::Int(b)) => a == b,
            (BoundValue::EntityRef(a), BoundValue::EntityRef(b)) => a == b,
            (BoundValue::Float(a), BoundValue::Float(b)) => {
                (a - b).abs() <= FLOAT_COMPARE_TOLERANCE
            }
            (BoundValue::Vector(a), BoundValue::Vector(b))
            | (BoundValue::UnitVector(a), BoundValue::UnitVector(b))
            | (BoundValue::Rotator(a), BoundValue::Rotator(b)) => {
                (*a - *b).abs().max_element() <= FLOAT_COMPARE_TOLERANCE
            }
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("no free {kind:?} slot (capacity {capacity})")]
    CapacityExhausted { kind: BoundKind, capacity: usize },
    #[error("slot name {0:?} is already bound")]
    DuplicateName(String),
    #[error("slot {slot} holds {expected:?}, got {got:?}")]
    KindMismatch {
        slot: u16,
        expected: BoundKind,
        got: BoundKind,
    },
    #[error("slot {0} is not bound")]
    UnknownSlot(u16),
}

/// Replication behavior of one bound slot.
#[derive(Debug, Clone)]
pub struct BoundSlot {
    pub name: String,
    pub kind: BoundKind,
    /// Replicate to the owning (predicting) client.
    pub to_autonomous: bool,
    /// Replicate to observers.
    pub to_simulated: bool,
    /// Hold the serialized value for `min_hold_time` after a change so at
    /// least one replication cycle observes every discrete transition.
    pub force_update: bool,
    pub min_hold_time: f32,
}

impl BoundSlot {
    pub fn replicates_to(&self, autonomous: bool) -> bool {
        if autonomous { self.to_autonomous } else { self.to_simulated }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundSlotId(pub u16);

/// Assigns application variables to interchangeable typed slots. Binding
/// order is part of the wire contract: both ends must bind the same slots
/// in the same order before the connection starts exchanging data.
#[derive(Debug, Clone, Default)]
pub struct BoundDataRegistry {
    slots: Vec<BoundSlot>,
    slots_per_kind: Option<usize>,
}

impl BoundDataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_per_kind(slots_per_kind: usize) -> Self {
        Self {
            slots: Vec::new(),
            slots_per_kind: Some(slots_per_kind),
        }
    }

    pub fn bind(
        &mut self,
        name: &str,
        kind: BoundKind,
        to_autonomous: bool,
        to_simulated: bool,
        force_update: bool,
        min_hold_time: f32,
    ) -> Result<BoundSlotId, BindError> {
        if self.slots.iter().any(|s| s.name == name) {
            return Err(BindError::DuplicateName(name.to_string()));
        }
        let capacity = self.slots_per_kind.unwrap_or(DEFAULT_SLOTS_PER_KIND);
        let used = self.slots.iter().filter(|s| s.kind == kind).count();
        if used >= capacity {
            return Err(BindError::CapacityExhausted { kind, capacity });
        }
        let id = BoundSlotId(self.slots.len() as u16);
        self.slots.push(BoundSlot {
            name: name.to_string(),
            kind,
            to_autonomous,
            to_simulated,
            force_update,
            min_hold_time,
        });
        Ok(id)
    }

    pub fn slot(&self, id: BoundSlotId) -> Option<&BoundSlot> {
        self.slots.get(id.0 as usize)
    }

    pub fn slots(&self) -> &[BoundSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn empty_set(&self) -> BoundSet {
        BoundSet {
            values: vec![None; self.slots.len()],
        }
    }
}

/// The values of the currently bound slots. `None` means "value not
/// received" and is distinct from any legitimate payload; a set crossing a
/// frame boundary is completed from the last known good values first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundSet {
    values: Vec<Option<BoundValue>>,
}

impl BoundSet {
    pub fn set(
        &mut self,
        registry: &BoundDataRegistry,
        id: BoundSlotId,
        value: BoundValue,
    ) -> Result<(), BindError> {
        let slot = registry
            .slot(id)
            .ok_or(BindError::UnknownSlot(id.0))?;
        if slot.kind != value.kind() {
            return Err(BindError::KindMismatch {
                slot: id.0,
                expected: slot.kind,
                got: value.kind(),
            });
        }
        let entry = self
            .values
            .get_mut(id.0 as usize)
            .ok_or(BindError::UnknownSlot(id.0))?;
        *entry = Some(value.canonical());
        Ok(())
    }

    pub fn get(&self, id: BoundSlotId) -> Option<BoundValue> {
        self.values.get(id.0 as usize).copied().flatten()
    }

    pub fn raw(&self) -> &[Option<BoundValue>] {
        &self.values
    }

    pub fn set_raw(&mut self, index: usize, value: Option<BoundValue>) {
        if index < self.values.len() {
            self.values[index] = value.map(BoundValue::canonical);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Completes unreceived slots from another set so no sentinel survives
    /// past a frame boundary.
    pub fn fill_missing_from(&mut self, fallback: &BoundSet) {
        for (index, value) in self.values.iter_mut().enumerate() {
            if value.is_none() {
                *value = fallback.values.get(index).copied().flatten();
            }
        }
    }

    /// Whether every slot replicated for the given role carries a value.
    pub fn is_complete_for(&self, registry: &BoundDataRegistry, autonomous: bool) -> bool {
        registry
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.replicates_to(autonomous))
            .all(|(index, _)| self.values.get(index).copied().flatten().is_some())
    }

    /// Whether the replicated slots of both sets carry matching values.
    /// A sentinel on either side counts as a mismatch.
    pub fn matches_for(
        &self,
        other: &BoundSet,
        registry: &BoundDataRegistry,
        autonomous: bool,
    ) -> bool {
        for (index, slot) in registry.slots().iter().enumerate() {
            if !slot.replicates_to(autonomous) {
                continue;
            }
            let a = self.values.get(index).copied().flatten();
            let b = other.values.get(index).copied().flatten();
            match (a, b) {
                (Some(a), Some(b)) if a.approx_eq(&b) => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> (BoundDataRegistry, BoundSlotId, BoundSlotId) {
        let mut registry = BoundDataRegistry::new();
        let sprint = registry
            .bind("sprint", BoundKind::Bool, true, true, true, 0.1)
            .unwrap();
        let stamina = registry
            .bind("stamina", BoundKind::Float, true, false, false, 0.0)
            .unwrap();
        (registry, sprint, stamina)
    }

    #[test]
    fn bind_assigns_slots_in_order() {
        let (registry, sprint, stamina) = test_registry();
        assert_eq!(sprint.0, 0);
        assert_eq!(stamina.0, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn bind_rejects_exhausted_kind() {
        let mut registry = BoundDataRegistry::with_capacity_per_kind(1);
        registry
            .bind("a", BoundKind::Int, true, true, false, 0.0)
            .unwrap();
        let err = registry
            .bind("b", BoundKind::Int, true, true, false, 0.0)
            .unwrap_err();
        assert!(matches!(err, BindError::CapacityExhausted { .. }));
        // Other kinds still have room.
        registry
            .bind("c", BoundKind::Bool, true, true, false, 0.0)
            .unwrap();
    }

    #[test]
    fn set_rejects_kind_mismatch() {
        let (registry, sprint, _) = test_registry();
        let mut set = registry.empty_set();
        let err = set
            .set(&registry, sprint, BoundValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, BindError::KindMismatch { .. }));
        set.set(&registry, sprint, BoundValue::Bool(true)).unwrap();
        assert_eq!(set.get(sprint), Some(BoundValue::Bool(true)));
    }

    #[test]
    fn missing_values_filled_from_fallback() {
        let (registry, sprint, stamina) = test_registry();
        let mut last_known = registry.empty_set();
        last_known
            .set(&registry, sprint, BoundValue::Bool(false))
            .unwrap();
        last_known
            .set(&registry, stamina, BoundValue::Float(0.5))
            .unwrap();

        let mut received = registry.empty_set();
        received
            .set(&registry, sprint, BoundValue::Bool(true))
            .unwrap();

        assert!(!received.is_complete_for(&registry, true));
        received.fill_missing_from(&last_known);
        assert!(received.is_complete_for(&registry, true));
        assert_eq!(received.get(stamina), Some(BoundValue::Float(0.5)));
        assert_eq!(received.get(sprint), Some(BoundValue::Bool(true)));
    }

    #[test]
    fn half_byte_masked_to_low_nibble() {
        assert!(
            BoundValue::HalfByte(0x1F).approx_eq(&BoundValue::HalfByte(0x0F))
        );
        let canonical = BoundValue::HalfByte(0xFF).canonical();
        assert_eq!(canonical, BoundValue::HalfByte(0x0F));
    }

    #[test]
    fn matches_skips_non_replicated_slots() {
        let (registry, sprint, stamina) = test_registry();
        let mut a = registry.empty_set();
        let mut b = registry.empty_set();
        a.set(&registry, sprint, BoundValue::Bool(true)).unwrap();
        b.set(&registry, sprint, BoundValue::Bool(true)).unwrap();
        a.set(&registry, stamina, BoundValue::Float(1.0)).unwrap();
        b.set(&registry, stamina, BoundValue::Float(0.0)).unwrap();

        // Stamina only replicates to the autonomous proxy.
        assert!(a.matches_for(&b, &registry, false));
        assert!(!a.matches_for(&b, &registry, true));
    }
}
