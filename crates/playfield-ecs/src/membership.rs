//! Capability-matched membership.
//!
//! For every registered system the index keeps the set of entities whose
//! component set is a superset of the system's required set. The
//! [`World`](crate::world::World) calls [`MembershipIndex::refresh`] on every
//! component add/remove, so the sets are correct the moment a mutation
//! returns, not just at frame boundaries.

use std::collections::BTreeSet;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::store::ComponentStore;
use crate::system::SystemId;

/// One system's requirements and its live matched set.
#[derive(Debug)]
struct Slot {
    system: SystemId,
    required: Vec<ComponentTypeId>,
    optional: Vec<ComponentTypeId>,
    /// Ordered by id, i.e. by creation order.
    matched: BTreeSet<EntityId>,
}

impl Slot {
    fn satisfied_by(&self, store: &ComponentStore, entity: EntityId) -> bool {
        self.required.iter().all(|&ty| store.has(ty, entity))
    }
}

/// Matched sets for all registered systems.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    slots: Vec<Slot>,
}

impl MembershipIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot for `system`, seeding it from the currently live entities.
    pub(crate) fn register(
        &mut self,
        system: SystemId,
        required: Vec<ComponentTypeId>,
        optional: Vec<ComponentTypeId>,
        live: impl Iterator<Item = EntityId>,
        store: &ComponentStore,
    ) {
        let mut slot = Slot {
            system,
            required,
            optional,
            matched: BTreeSet::new(),
        };
        slot.matched = live.filter(|&e| slot.satisfied_by(store, e)).collect();
        self.slots.retain(|s| s.system != system);
        self.slots.push(slot);
    }

    /// Drop the slot for `system`. Returns `false` if it was not registered.
    pub(crate) fn unregister(&mut self, system: SystemId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.system != system);
        before != self.slots.len()
    }

    /// Re-run matching for `entity` after a component of type `changed` was
    /// attached or detached.
    ///
    /// Only slots that require `changed` can flip, so others are skipped.
    /// The test is O(|required|) per affected slot.
    pub(crate) fn refresh(
        &mut self,
        entity: EntityId,
        changed: ComponentTypeId,
        store: &ComponentStore,
    ) {
        for slot in &mut self.slots {
            if !slot.required.contains(&changed) {
                continue;
            }
            if slot.satisfied_by(store, entity) {
                slot.matched.insert(entity);
            } else {
                slot.matched.remove(&entity);
            }
        }
    }

    /// A freshly spawned entity holds nothing, so it only satisfies slots
    /// with an empty required set.
    pub(crate) fn admit_empty(&mut self, entity: EntityId) {
        for slot in &mut self.slots {
            if slot.required.is_empty() {
                slot.matched.insert(entity);
            }
        }
    }

    /// Remove `entity` from every matched set.
    pub(crate) fn forget(&mut self, entity: EntityId) {
        for slot in &mut self.slots {
            slot.matched.remove(&entity);
        }
    }

    /// Drop every entity from every slot, keeping the slots themselves.
    pub(crate) fn clear_members(&mut self) {
        for slot in &mut self.slots {
            slot.matched.clear();
        }
    }

    /// The matched set of `system`, if registered.
    pub fn matched(&self, system: SystemId) -> Option<&BTreeSet<EntityId>> {
        self.slots
            .iter()
            .find(|s| s.system == system)
            .map(|s| &s.matched)
    }

    /// The required component types of `system`.
    pub fn required(&self, system: SystemId) -> Option<&[ComponentTypeId]> {
        self.slots
            .iter()
            .find(|s| s.system == system)
            .map(|s| s.required.as_slice())
    }

    /// The optional component types of `system`.
    pub fn optional(&self, system: SystemId) -> Option<&[ComponentTypeId]> {
        self.slots
            .iter()
            .find(|s| s.system == system)
            .map(|s| s.optional.as_slice())
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slots are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
