//! Entity identifiers and the entity registry.
//!
//! An [`EntityId`] is a 64-bit handle drawn from a strictly increasing
//! counter. Identities are never recycled, so a handle that outlives its
//! entity can never alias a newer one: staleness is detected simply by the id
//! no longer being live in the [`EntityRegistry`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque entity identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    ///
    /// The result is only meaningful if it was produced by
    /// [`to_raw`](Self::to_raw) on an id from the same registry.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// The registry's record for a live entity. Owns no component data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Unique identity.
    pub id: EntityId,
    /// Human-readable name. Defaults to `Entity_<id>`.
    pub name: String,
    /// Inactive entities stay registered but are skipped by
    /// [`EntityRegistry::active`].
    pub active: bool,
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Issues entity identities and maintains the name index.
///
/// The registry only tracks identity. Tearing down an entity's components is
/// the [`World`](crate::world::World)'s job; it calls [`retire`](Self::retire)
/// once the components are gone.
#[derive(Debug)]
pub struct EntityRegistry {
    next_id: u64,
    /// Live entities keyed by id; `BTreeMap` keeps creation order.
    live: BTreeMap<EntityId, Entity>,
    by_name: HashMap<String, EntityId>,
}

impl EntityRegistry {
    /// Create an empty registry. The first identity issued is `#1`.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Allocate a new entity.
    ///
    /// If `name` collides with a live entity's name, the name index is
    /// overwritten and the newest entity wins lookups by that name.
    pub fn create(&mut self, name: Option<&str>) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;

        let name = match name {
            Some(n) if !n.is_empty() => n.to_owned(),
            _ => format!("Entity_{}", id.0),
        };
        if let Some(previous) = self.by_name.insert(name.clone(), id) {
            tracing::warn!(
                name = %name,
                previous = %previous,
                entity = %id,
                "duplicate entity name; newest entity now owns the name"
            );
        }
        self.live.insert(
            id,
            Entity {
                id,
                name,
                active: true,
            },
        );
        id
    }

    /// Release an identity. Returns the entity record if it was live.
    ///
    /// The name index entry is dropped only if it still points at this
    /// entity (a newer entity may have taken the name over).
    pub fn retire(&mut self, id: EntityId) -> Option<Entity> {
        let mut entity = self.live.remove(&id)?;
        if self.by_name.get(&entity.name) == Some(&id) {
            self.by_name.remove(&entity.name);
        }
        entity.active = false;
        Some(entity)
    }

    /// Whether `id` refers to a live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    /// Look up a live entity record.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.live.get(&id)
    }

    /// Mutable access to a live entity record (e.g. to toggle `active`).
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.live.get_mut(&id)
    }

    /// Look up a live entity by name.
    pub fn get_by_name(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// All live entity ids, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.live.keys().copied()
    }

    /// All live entity records, in creation order.
    pub fn all(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.live.values()
    }

    /// Live entities whose `active` flag is set, in creation order.
    pub fn active(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.live.values().filter(|e| e.active)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether there are no live entities.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let mut reg = EntityRegistry::new();
        let ids: Vec<EntityId> = (0..100).map(|_| reg.create(None)).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn retired_ids_are_never_reused() {
        let mut reg = EntityRegistry::new();
        let a = reg.create(None);
        reg.retire(a);
        let b = reg.create(None);
        assert_ne!(a, b);
        assert!(!reg.is_alive(a));
        assert!(reg.is_alive(b));
    }

    #[test]
    fn default_name_uses_id() {
        let mut reg = EntityRegistry::new();
        let e = reg.create(None);
        assert_eq!(reg.get(e).unwrap().name, format!("Entity_{}", e.to_raw()));
        assert_eq!(reg.get_by_name(&format!("Entity_{}", e.to_raw())), Some(e));
    }

    #[test]
    fn duplicate_name_last_registered_wins() {
        let mut reg = EntityRegistry::new();
        let first = reg.create(Some("player"));
        let second = reg.create(Some("player"));
        assert_eq!(reg.get_by_name("player"), Some(second));

        // Retiring the older entity must not unlink the newer owner.
        reg.retire(first);
        assert_eq!(reg.get_by_name("player"), Some(second));

        reg.retire(second);
        assert_eq!(reg.get_by_name("player"), None);
    }

    #[test]
    fn active_filters_inactive_entities() {
        let mut reg = EntityRegistry::new();
        let a = reg.create(Some("a"));
        let b = reg.create(Some("b"));
        reg.get_mut(a).unwrap().active = false;
        let active: Vec<EntityId> = reg.active().map(|e| e.id).collect();
        assert_eq!(active, vec![b]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn retire_unknown_is_none() {
        let mut reg = EntityRegistry::new();
        assert!(reg.retire(EntityId::from_raw(42)).is_none());
    }

    #[test]
    fn entity_id_roundtrip() {
        let id = EntityId::from_raw(7);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
        assert_eq!(format!("{id}"), "#7");
    }
}
