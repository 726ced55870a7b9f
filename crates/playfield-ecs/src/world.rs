//! The ECS world: entities, components, membership and resources together.
//!
//! [`World`] is the explicit context object that replaces process-wide
//! singletons. It owns the [`EntityRegistry`], the [`ComponentStore`], the
//! [`MembershipIndex`] and the [`Resources`] map, and is the only place where
//! component mutations happen, so it can keep every system's matched set in
//! sync synchronously.
//!
//! Per-system reactions (`on_component_added` / `on_component_removed`) cannot
//! run while the world is mutably borrowed by the mutation itself, so every
//! add/remove also appends a [`ComponentEvent`] to a change log. The
//! [`Scheduler`](crate::scheduler::Scheduler) drains that log after each
//! system update and at the start of each tick.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::fmt;

use crate::component::{Component, ComponentTypeId, ErasedComponent, HookContext, ComponentRegistry};
use crate::entity::{Entity, EntityId, EntityRegistry};
use crate::membership::MembershipIndex;
use crate::resource::Resources;
use crate::store::ComponentStore;
use crate::system::{Signature, SystemId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentEvent
// ---------------------------------------------------------------------------

/// Whether a component was attached or detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

/// One entry of the world's change log.
pub struct ComponentEvent {
    /// Attach or detach.
    pub kind: ChangeKind,
    /// The entity whose component set changed.
    pub entity: EntityId,
    /// The registered id of the component type.
    pub component: ComponentTypeId,
    /// [`Component::NAME`] of the type.
    pub name: &'static str,
    type_id: TypeId,
    /// The detached value, for `Removed` events.
    removed: Option<Box<dyn ErasedComponent>>,
}

impl ComponentEvent {
    /// Whether this event concerns component type `T`.
    pub fn is<T: Component>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// The detached value, if this is a `Removed` event for type `T`.
    pub fn removed<T: Component>(&self) -> Option<&T> {
        self.removed
            .as_deref()
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }
}

impl fmt::Debug for ComponentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEvent")
            .field("kind", &self.kind)
            .field("entity", &self.entity)
            .field("component", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Entities, their components and the shared resources of one simulation run.
#[derive(Debug, Default)]
pub struct World {
    entities: EntityRegistry,
    components: ComponentRegistry,
    store: ComponentStore,
    membership: MembershipIndex,
    resources: Resources,
    /// Pending reactions. Only recorded while at least one system is
    /// registered; nothing else consumes the log.
    changes: Vec<ComponentEvent>,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    // -- entities -------------------------------------------------------------

    /// Create an entity with the default `Entity_<id>` name.
    pub fn spawn(&mut self) -> EntityId {
        self.spawn_inner(None)
    }

    /// Create an entity with a human-readable name.
    pub fn spawn_named(&mut self, name: &str) -> EntityId {
        self.spawn_inner(Some(name))
    }

    fn spawn_inner(&mut self, name: Option<&str>) -> EntityId {
        let id = self.entities.create(name);
        self.membership.admit_empty(id);
        tracing::trace!(entity = %id, "spawned");
        id
    }

    /// Destroy an entity: detach every component (running `on_remove`), drop
    /// it from every matched set, then retire the identity.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity { entity });
        }
        self.remove_all(entity);
        self.membership.forget(entity);
        self.entities.retire(entity);
        tracing::trace!(entity = %entity, "despawned");
        Ok(())
    }

    /// Destroy every live entity. Resources and system slots are kept.
    pub fn clear(&mut self) {
        let ids: Vec<EntityId> = self.entities.ids().collect();
        for id in ids {
            // Every id came from the live set, so despawn cannot fail here.
            let _ = self.despawn(id);
        }
        self.membership.clear_members();
    }

    /// Whether `entity` is live.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    /// The registry record for a live entity.
    pub fn entity(&self, entity: EntityId) -> Option<&Entity> {
        self.entities.get(entity)
    }

    /// Look up a live entity by name.
    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.entities.get_by_name(name)
    }

    /// Toggle an entity's `active` flag.
    pub fn set_active(&mut self, entity: EntityId, active: bool) -> Result<(), EcsError> {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(EcsError::DeadEntity { entity })?;
        record.active = active;
        Ok(())
    }

    /// Live entities with the `active` flag set, in creation order.
    pub fn active_entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.active()
    }

    /// All live entities, in creation order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.all()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -- components -----------------------------------------------------------

    /// Attach `value` to `entity`, replacing any component of the same type.
    ///
    /// A replaced value gets its `on_remove` hook; the new value gets
    /// `on_add`. Membership is updated before this returns and exactly one
    /// `Added` event is logged.
    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> Result<&mut T, EcsError> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity { entity });
        }
        let ty = self.components.register::<T>();
        let replaced = self.store.insert(ty, entity, value);
        self.membership.refresh(entity, ty, &self.store);
        self.record_added(entity, ty, T::NAME, TypeId::of::<T>());
        if let Some(mut old) = replaced {
            old.on_remove(&mut HookContext {
                entity,
                resources: &mut self.resources,
            });
        }

        let Self {
            store, resources, ..
        } = self;
        let stored = store
            .get_mut::<T>(ty, entity)
            .ok_or(EcsError::DeadEntity { entity })?;
        stored.on_add(&mut HookContext { entity, resources });
        Ok(stored)
    }

    /// Shared access to a component. Absence is not an error.
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let ty = self.components.lookup::<T>()?;
        self.store.get::<T>(ty, entity)
    }

    /// Mutable access to a component.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let ty = self.components.lookup::<T>()?;
        self.store.get_mut::<T>(ty, entity)
    }

    /// Whether `entity` holds a `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.components
            .lookup::<T>()
            .is_some_and(|ty| self.store.has(ty, entity))
    }

    /// Detach the `T` from `entity`, running its `on_remove` hook.
    ///
    /// Returns `false` if there was nothing to remove.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> bool {
        let Some(ty) = self.components.lookup::<T>() else {
            return false;
        };
        let Some(old) = self.store.take::<T>(ty, entity) else {
            return false;
        };
        self.retire(entity, ty, T::NAME, TypeId::of::<T>(), Box::new(old));
        true
    }

    /// Detach every component of `entity`. Returns how many were removed.
    pub fn remove_all(&mut self, entity: EntityId) -> usize {
        let types = self.store.types_of(entity);
        let mut removed = 0;
        for ty in types {
            let Some(old) = self.store.take_erased(ty, entity) else {
                continue;
            };
            let (name, type_id) = match self.components.get_info(ty) {
                Some(info) => (info.name, info.type_id),
                None => (old.type_name(), old.as_any().type_id()),
            };
            self.retire(entity, ty, name, type_id, old);
            removed += 1;
        }
        removed
    }

    /// Names of the component types attached to `entity`.
    pub fn entity_components(&self, entity: EntityId) -> Vec<&'static str> {
        self.store
            .types_of(entity)
            .into_iter()
            .filter_map(|ty| self.components.get_info(ty).map(|info| info.name))
            .collect()
    }

    /// The registered id of `T`, if it has been stored or named in a
    /// signature.
    pub fn component_id<T: Component>(&self) -> Option<ComponentTypeId> {
        self.components.lookup::<T>()
    }

    /// Number of stored `T` components.
    pub fn count<T: Component>(&self) -> usize {
        self.components
            .lookup::<T>()
            .map_or(0, |ty| self.store.count(ty))
    }

    /// Bookkeeping for a value that just left the store. Membership and the
    /// change log are settled before `on_remove` runs, so a panicking hook
    /// cannot leave the entity matched without the component.
    fn retire(
        &mut self,
        entity: EntityId,
        component: ComponentTypeId,
        name: &'static str,
        type_id: TypeId,
        mut old: Box<dyn ErasedComponent>,
    ) {
        self.membership.refresh(entity, component, &self.store);
        let Self {
            membership,
            changes,
            resources,
            ..
        } = self;
        let mut ctx = HookContext { entity, resources };
        if membership.is_empty() {
            old.run_on_remove(&mut ctx);
            return;
        }
        changes.push(ComponentEvent {
            kind: ChangeKind::Removed,
            entity,
            component,
            name,
            type_id,
            removed: Some(old),
        });
        if let Some(value) = changes.last_mut().and_then(|ev| ev.removed.as_mut()) {
            value.run_on_remove(&mut ctx);
        }
    }

    fn record_added(
        &mut self,
        entity: EntityId,
        component: ComponentTypeId,
        name: &'static str,
        type_id: TypeId,
    ) {
        if self.membership.is_empty() {
            return;
        }
        self.changes.push(ComponentEvent {
            kind: ChangeKind::Added,
            entity,
            component,
            name,
            type_id,
            removed: None,
        });
    }

    // -- membership -----------------------------------------------------------

    /// Create the matched set for `system`, seeded from current entities.
    pub(crate) fn register_system(&mut self, system: SystemId, signature: &Signature) {
        let required = signature
            .required()
            .iter()
            .map(|&key| self.components.register_key(key))
            .collect();
        let optional = signature
            .optional_keys()
            .iter()
            .map(|&key| self.components.register_key(key))
            .collect();
        self.membership
            .register(system, required, optional, self.entities.ids(), &self.store);
    }

    pub(crate) fn unregister_system(&mut self, system: SystemId) -> bool {
        let found = self.membership.unregister(system);
        if self.membership.is_empty() {
            self.changes.clear();
        }
        found
    }

    /// The entities currently matching `system`'s required set.
    pub fn matched(&self, system: SystemId) -> Option<&BTreeSet<EntityId>> {
        self.membership.matched(system)
    }

    /// Read access to the whole membership index.
    pub fn membership(&self) -> &MembershipIndex {
        &self.membership
    }

    pub(crate) fn drain_changes(&mut self) -> Vec<ComponentEvent> {
        std::mem::take(&mut self.changes)
    }

    /// Number of logged changes not yet dispatched to system reactions.
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    // -- resources ------------------------------------------------------------

    /// Insert a resource, returning the one it replaced.
    pub fn insert_resource<R: 'static>(&mut self, value: R) -> Option<R> {
        self.resources.insert(value)
    }

    /// Shared access to a resource.
    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources.get::<R>()
    }

    /// Mutable access to a resource.
    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut::<R>()
    }

    /// Like [`resource_mut`](Self::resource_mut) but absence is an error, for
    /// systems that cannot run without it.
    pub fn require_resource_mut<R: 'static>(&mut self) -> Result<&mut R, EcsError> {
        self.resources
            .get_mut::<R>()
            .ok_or(EcsError::ResourceMissing {
                name: std::any::type_name::<R>(),
            })
    }

    /// Remove and return a resource.
    pub fn remove_resource<R: 'static>(&mut self) -> Option<R> {
        self.resources.remove::<R>()
    }

    /// Whether a resource of type `R` is present.
    pub fn has_resource<R: 'static>(&self) -> bool {
        self.resources.contains::<R>()
    }

    /// Run `f` with `R` temporarily taken out of the resource map, so `f` can
    /// use the resource and the rest of the world at the same time.
    ///
    /// While `f` runs, `R` is absent: component hooks looking for it will not
    /// find it.
    pub fn resource_scope<R: 'static, U>(
        &mut self,
        f: impl FnOnce(&mut World, &mut R) -> U,
    ) -> Result<U, EcsError> {
        let mut value = self.resources.remove::<R>().ok_or(EcsError::ResourceMissing {
            name: std::any::type_name::<R>(),
        })?;
        let out = f(self, &mut value);
        self.resources.insert(value);
        Ok(out)
    }

    /// Direct access to the resource map.
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::panic::AssertUnwindSafe;

    #[derive(Debug, PartialEq)]
    struct Pos(i32);
    impl Component for Pos {
        const NAME: &'static str = "pos";
    }

    #[derive(Debug, PartialEq)]
    struct Vel(i32);
    impl Component for Vel {
        const NAME: &'static str = "vel";
    }

    #[derive(Default)]
    struct HookLog {
        added: u32,
        removed: u32,
    }

    /// Counts hook calls in a resource so tests can observe them.
    struct Tracked;
    impl Component for Tracked {
        const NAME: &'static str = "tracked";
        fn on_add(&mut self, ctx: &mut HookContext<'_>) {
            if let Some(log) = ctx.resources.get_mut::<HookLog>() {
                log.added += 1;
            }
        }
        fn on_remove(&mut self, ctx: &mut HookContext<'_>) {
            if let Some(log) = ctx.resources.get_mut::<HookLog>() {
                log.removed += 1;
            }
        }
    }

    fn moving_sig() -> Signature {
        Signature::new().require::<Pos>().require::<Vel>()
    }

    #[test]
    fn insert_get_has_remove() {
        let mut world = World::new();
        let e = world.spawn();
        assert!(!world.has::<Pos>(e));
        world.insert(e, Pos(1)).unwrap().0 += 1;
        assert_eq!(world.get::<Pos>(e), Some(&Pos(2)));
        assert!(world.remove::<Pos>(e));
        assert!(!world.remove::<Pos>(e));
        assert!(world.get::<Pos>(e).is_none());
    }

    #[test]
    fn insert_on_dead_entity_fails() {
        let mut world = World::new();
        let e = world.spawn();
        world.despawn(e).unwrap();
        assert!(matches!(
            world.insert(e, Pos(0)),
            Err(EcsError::DeadEntity { .. })
        ));
        assert!(world.despawn(e).is_err());
    }

    #[test]
    fn hooks_fire_on_add_overwrite_and_remove() {
        let mut world = World::new();
        world.insert_resource(HookLog::default());
        let e = world.spawn();
        world.insert(e, Tracked).unwrap();
        world.insert(e, Tracked).unwrap();
        let log = world.resource::<HookLog>().unwrap();
        assert_eq!((log.added, log.removed), (2, 1));

        world.despawn(e).unwrap();
        let log = world.resource::<HookLog>().unwrap();
        assert_eq!((log.added, log.removed), (2, 2));
    }

    #[test]
    fn membership_updates_synchronously() {
        let mut world = World::new();
        let sys = SystemId::from_raw(0);
        world.register_system(sys, &moving_sig());

        let e = world.spawn();
        world.insert(e, Pos(0)).unwrap();
        assert!(!world.matched(sys).unwrap().contains(&e));
        world.insert(e, Vel(0)).unwrap();
        assert!(world.matched(sys).unwrap().contains(&e));
        world.remove::<Pos>(e);
        assert!(!world.matched(sys).unwrap().contains(&e));
    }

    #[test]
    fn registration_seeds_existing_entities() {
        let mut world = World::new();
        let a = world.spawn();
        world.insert(a, Pos(0)).unwrap();
        world.insert(a, Vel(0)).unwrap();
        let b = world.spawn();
        world.insert(b, Pos(0)).unwrap();

        let sys = SystemId::from_raw(3);
        world.register_system(sys, &moving_sig());
        let matched: Vec<_> = world.matched(sys).unwrap().iter().copied().collect();
        assert_eq!(matched, vec![a]);
    }

    #[test]
    fn empty_signature_matches_every_entity() {
        let mut world = World::new();
        let sys = SystemId::from_raw(1);
        world.register_system(sys, &Signature::new());
        let a = world.spawn();
        let b = world.spawn();
        world.insert(b, Pos(0)).unwrap();
        assert_eq!(world.matched(sys).unwrap().len(), 2);
        world.despawn(a).unwrap();
        assert_eq!(world.matched(sys).unwrap().len(), 1);
    }

    #[test]
    fn change_log_records_removed_values() {
        let mut world = World::new();
        world.register_system(SystemId::from_raw(0), &moving_sig());
        let e = world.spawn();
        world.insert(e, Pos(9)).unwrap();
        world.remove::<Pos>(e);

        let changes = world.drain_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert!(changes[1].is::<Pos>());
        assert_eq!(changes[1].removed::<Pos>(), Some(&Pos(9)));
        assert_eq!(world.pending_changes(), 0);
    }

    #[test]
    fn no_change_log_without_systems() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Pos(0)).unwrap();
        assert_eq!(world.pending_changes(), 0);
    }

    #[test]
    fn entity_components_lists_names() {
        let mut world = World::new();
        let e = world.spawn_named("mover");
        world.insert(e, Pos(0)).unwrap();
        world.insert(e, Vel(0)).unwrap();
        assert_eq!(world.entity_components(e), vec!["pos", "vel"]);
        assert_eq!(world.find("mover"), Some(e));
    }

    #[test]
    fn clear_runs_hooks_and_empties_world() {
        let mut world = World::new();
        world.insert_resource(HookLog::default());
        for _ in 0..3 {
            let e = world.spawn();
            world.insert(e, Tracked).unwrap();
        }
        world.clear();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.resource::<HookLog>().unwrap().removed, 3);
    }

    #[test]
    fn resource_scope_lends_resource_out() {
        let mut world = World::new();
        world.insert_resource(5u32);
        let e = world.spawn();
        let seen = Rc::new(Cell::new(0));
        let seen2 = Rc::clone(&seen);
        world
            .resource_scope::<u32, _>(|w, n| {
                assert!(!w.has_resource::<u32>());
                w.insert(e, Pos(*n as i32)).unwrap();
                *n += 1;
                seen2.set(*n);
            })
            .unwrap();
        assert_eq!(seen.get(), 6);
        assert_eq!(world.resource::<u32>(), Some(&6));
        assert!(world.resource_scope::<u64, _>(|_, _| ()).is_err());
    }

    /// Panics on the way out, after the value has already left the store.
    struct Brittle;
    impl Component for Brittle {
        const NAME: &'static str = "brittle";
        fn on_remove(&mut self, _ctx: &mut HookContext<'_>) {
            panic!("brittle component refused to leave");
        }
    }

    #[test]
    fn panicking_remove_hook_still_drops_membership() {
        let mut world = World::new();
        let sys = SystemId::from_raw(0);
        world.register_system(sys, &Signature::new().require::<Brittle>());
        let e = world.spawn();
        world.insert(e, Brittle).unwrap();
        assert!(world.matched(sys).unwrap().contains(&e));

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| world.remove::<Brittle>(e)));
        assert!(outcome.is_err());
        assert!(!world.has::<Brittle>(e));
        assert!(!world.matched(sys).unwrap().contains(&e));
        assert_eq!(world.drain_changes().len(), 2);
    }

    #[test]
    fn panicking_hook_during_remove_all_keeps_sets_consistent() {
        let mut world = World::new();
        let sys = SystemId::from_raw(0);
        world.register_system(sys, &Signature::new().require::<Brittle>().require::<Pos>());
        let e = world.spawn();
        world.insert(e, Pos(1)).unwrap();
        world.insert(e, Brittle).unwrap();

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| world.remove_all(e)));
        assert!(outcome.is_err());
        assert!(!world.has::<Brittle>(e));
        assert!(!world.matched(sys).unwrap().contains(&e));
    }

    #[test]
    fn optional_components_are_resolved_at_registration() {
        let mut world = World::new();
        let sys = SystemId::from_raw(2);
        world.register_system(sys, &Signature::new().require::<Pos>().optional::<Vel>());
        let vel = world.component_id::<Vel>().unwrap();
        assert_eq!(world.membership().optional(sys), Some(&[vel][..]));

        let a = world.spawn();
        world.insert(a, Pos(0)).unwrap();
        let b = world.spawn();
        world.insert(b, Pos(0)).unwrap();
        world.insert(b, Vel(0)).unwrap();
        let matched: Vec<_> = world.matched(sys).unwrap().iter().copied().collect();
        assert_eq!(matched, vec![a, b]);
    }

    #[test]
    fn set_active_filters_active_entities() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        world.set_active(a, false).unwrap();
        let active: Vec<_> = world.active_entities().map(|e| e.id).collect();
        assert_eq!(active, vec![b]);
    }
}
