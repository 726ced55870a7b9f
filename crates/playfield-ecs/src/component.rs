//! Component contract and type registration.
//!
//! Every component type implements [`Component`]. The first time a type is
//! stored (or named in a system signature) it is assigned a stable
//! [`ComponentTypeId`] by the [`ComponentRegistry`]; that id is the key for
//! column lookups and membership matching.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::entity::EntityId;
use crate::resource::Resources;

// ---------------------------------------------------------------------------
// Component trait
// ---------------------------------------------------------------------------

/// Context handed to component lifecycle hooks.
pub struct HookContext<'a> {
    /// The entity the component is being attached to / detached from.
    pub entity: EntityId,
    /// World resources, so a hook can release external state it owns.
    pub resources: &'a mut Resources,
}

/// A typed bag of attributes attached to one entity.
///
/// Hooks may run several times over an entity's life (a component can be
/// overwritten, removed and re-added), so they must tolerate repetition.
pub trait Component: Any {
    /// Human-readable type name used in logs and diagnostics.
    const NAME: &'static str;

    /// Called after the component is stored on an entity.
    fn on_add(&mut self, _ctx: &mut HookContext<'_>) {}

    /// Called right before the component is dropped from an entity.
    fn on_remove(&mut self, _ctx: &mut HookContext<'_>) {}
}

/// Object-safe view of a [`Component`], used where the concrete type is not
/// known statically (bulk removal, change events).
pub trait ErasedComponent: Any {
    /// The component's [`Component::NAME`].
    fn type_name(&self) -> &'static str;
    /// Dispatch to [`Component::on_remove`].
    fn run_on_remove(&mut self, ctx: &mut HookContext<'_>);
    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Component> ErasedComponent for T {
    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn run_on_remove(&mut self, ctx: &mut HookContext<'_>) {
        self.on_remove(ctx);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Index into per-type tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentKey
// ---------------------------------------------------------------------------

/// A compile-time reference to a component type, resolved to a
/// [`ComponentTypeId`] when a system is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl ComponentKey {
    /// The key for component type `T`.
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    /// The component's registered name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// [`Component::NAME`] of the type.
    pub name: &'static str,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentTypeId`]s and their metadata.
///
/// Registration is idempotent: registering a type twice returns the id
/// assigned the first time.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register component type `T`.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        self.register_key(ComponentKey::of::<T>())
    }

    /// Register a type by key (used when resolving system signatures).
    pub fn register_key(&mut self, key: ComponentKey) -> ComponentTypeId {
        if let Some(&existing) = self.by_type.get(&key.type_id) {
            return existing;
        }
        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: key.name,
            type_id: key.type_id,
        });
        self.by_type.insert(key.type_id, id);
        id
    }

    /// Look up a registered type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Metadata for a registered id.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
