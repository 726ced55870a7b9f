//! The system contract.
//!
//! A system declares a [`Signature`] (required and optional component types)
//! and runs once per frame over its matched set. Systems are stateless between
//! frames as far as the world is concerned; any configuration they carry is
//! fixed at construction.

use std::fmt;

use crate::component::{Component, ComponentKey};
use crate::entity::EntityId;
use crate::world::{ComponentEvent, World};

// ---------------------------------------------------------------------------
// SystemId
// ---------------------------------------------------------------------------

/// Identity of a registered system, issued by the
/// [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(u32);

impl SystemId {
    /// Reconstruct from a raw value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Required and optional component types of a system.
///
/// An entity is matched iff it holds every required type. Optional types are
/// informational only and never gate membership. An empty required set
/// matches every live entity.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    required: Vec<ComponentKey>,
    optional: Vec<ComponentKey>,
}

impl Signature {
    /// An empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `T` to the required set.
    pub fn require<T: Component>(mut self) -> Self {
        let key = ComponentKey::of::<T>();
        if !self.required.contains(&key) {
            self.required.push(key);
        }
        self
    }

    /// Add `T` to the optional set.
    pub fn optional<T: Component>(mut self) -> Self {
        let key = ComponentKey::of::<T>();
        if !self.optional.contains(&key) {
            self.optional.push(key);
        }
        self
    }

    /// The required component keys.
    pub fn required(&self) -> &[ComponentKey] {
        &self.required
    }

    /// The optional component keys.
    pub fn optional_keys(&self) -> &[ComponentKey] {
        &self.optional
    }
}

// ---------------------------------------------------------------------------
// SystemContext
// ---------------------------------------------------------------------------

/// What a system sees while it runs.
pub struct SystemContext<'a> {
    /// The world, mutable. Component mutations made here update membership
    /// immediately; reactions are dispatched after the system returns.
    pub world: &'a mut World,
    id: SystemId,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(world: &'a mut World, id: SystemId) -> Self {
        Self { world, id }
    }

    /// This system's id.
    pub fn id(&self) -> SystemId {
        self.id
    }

    /// A snapshot of the matched set, in creation order.
    ///
    /// The snapshot is detached from the world, so the system may add or
    /// remove components while iterating it. Entities that stop matching
    /// mid-iteration are still in the snapshot; re-check with
    /// [`World::get`] before use.
    pub fn entities(&self) -> Vec<EntityId> {
        self.world
            .matched(self.id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `entity` is currently in the matched set.
    pub fn matches(&self, entity: EntityId) -> bool {
        self.world
            .matched(self.id)
            .is_some_and(|set| set.contains(&entity))
    }
}

// ---------------------------------------------------------------------------
// System trait
// ---------------------------------------------------------------------------

/// A behavior unit run once per frame.
pub trait System {
    /// Name used in logs, faults and timing reports.
    fn name(&self) -> &str;

    /// The component types this system needs.
    fn signature(&self) -> Signature;

    /// Per-frame work. `dt` is the smoothed frame delta in seconds.
    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()>;

    /// Called for every component attach anywhere in the world, whether or
    /// not the entity matches this system.
    fn on_component_added(
        &mut self,
        _ctx: &mut SystemContext<'_>,
        _event: &ComponentEvent,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every component detach anywhere in the world.
    fn on_component_removed(
        &mut self,
        _ctx: &mut SystemContext<'_>,
        _event: &ComponentEvent,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
