//! Per-type component columns.
//!
//! Each registered component type gets one [`Column`] mapping entity ids to
//! values. Lookups are a type-id index into `columns` followed by a hash
//! lookup, so `get`/`has` are O(1). The store knows nothing about hooks or
//! membership; the [`World`](crate::world::World) layers those on top.

use std::any::Any;
use std::collections::HashMap;

use crate::component::{Component, ComponentTypeId, ErasedComponent};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// Type-erased operations the store needs on every column.
trait AnyColumn {
    fn contains(&self, entity: EntityId) -> bool;
    fn take_erased(&mut self, entity: EntityId) -> Option<Box<dyn ErasedComponent>>;
    fn len(&self) -> usize;
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Storage for one component type.
struct Column<T> {
    items: HashMap<EntityId, T>,
}

impl<T> Column<T> {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T: Component> AnyColumn for Column<T> {
    fn contains(&self, entity: EntityId) -> bool {
        self.items.contains_key(&entity)
    }

    fn take_erased(&mut self, entity: EntityId) -> Option<Box<dyn ErasedComponent>> {
        self.items
            .remove(&entity)
            .map(|v| Box::new(v) as Box<dyn ErasedComponent>)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// All component columns, indexed by [`ComponentTypeId`].
#[derive(Default)]
pub struct ComponentStore {
    columns: Vec<Option<Box<dyn AnyColumn>>>,
}

impl ComponentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn column<T: Component>(&self, ty: ComponentTypeId) -> Option<&Column<T>> {
        self.columns
            .get(ty.index())
            .and_then(|c| c.as_deref())
            .and_then(|c| c.as_any().downcast_ref::<Column<T>>())
    }

    fn column_mut<T: Component>(&mut self, ty: ComponentTypeId) -> Option<&mut Column<T>> {
        self.columns
            .get_mut(ty.index())
            .and_then(|c| c.as_deref_mut())
            .and_then(|c| c.as_any_mut().downcast_mut::<Column<T>>())
    }

    fn column_or_insert<T: Component>(&mut self, ty: ComponentTypeId) -> &mut Column<T> {
        let idx = ty.index();
        if idx >= self.columns.len() {
            self.columns.resize_with(idx + 1, || None);
        }
        let slot = &mut self.columns[idx];
        if slot.is_none() {
            *slot = Some(Box::new(Column::<T>::new()));
        }
        slot.as_deref_mut()
            .and_then(|c| c.as_any_mut().downcast_mut::<Column<T>>())
            .expect("component type id bound to a different Rust type")
    }

    /// Store `value` for `entity`, returning the value it replaced.
    pub fn insert<T: Component>(
        &mut self,
        ty: ComponentTypeId,
        entity: EntityId,
        value: T,
    ) -> Option<T> {
        self.column_or_insert::<T>(ty).items.insert(entity, value)
    }

    /// Shared access to a component.
    pub fn get<T: Component>(&self, ty: ComponentTypeId, entity: EntityId) -> Option<&T> {
        self.column::<T>(ty).and_then(|c| c.items.get(&entity))
    }

    /// Mutable access to a component.
    pub fn get_mut<T: Component>(&mut self, ty: ComponentTypeId, entity: EntityId) -> Option<&mut T> {
        self.column_mut::<T>(ty).and_then(|c| c.items.get_mut(&entity))
    }

    /// Whether `entity` holds a component of type `ty`.
    pub fn has(&self, ty: ComponentTypeId, entity: EntityId) -> bool {
        self.columns
            .get(ty.index())
            .and_then(|c| c.as_deref())
            .is_some_and(|c| c.contains(entity))
    }

    /// Remove and return a typed component.
    pub fn take<T: Component>(&mut self, ty: ComponentTypeId, entity: EntityId) -> Option<T> {
        self.column_mut::<T>(ty).and_then(|c| c.items.remove(&entity))
    }

    /// Remove a component without knowing its concrete type.
    pub fn take_erased(
        &mut self,
        ty: ComponentTypeId,
        entity: EntityId,
    ) -> Option<Box<dyn ErasedComponent>> {
        self.columns
            .get_mut(ty.index())
            .and_then(|c| c.as_deref_mut())
            .and_then(|c| c.take_erased(entity))
    }

    /// Component types currently attached to `entity`, in type-id order.
    pub fn types_of(&self, entity: EntityId) -> Vec<ComponentTypeId> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| {
                c.as_deref()
                    .filter(|c| c.contains(entity))
                    .map(|_| ComponentTypeId(idx as u32))
            })
            .collect()
    }

    /// Number of stored components of type `ty`.
    pub fn count(&self, ty: ComponentTypeId) -> usize {
        self.columns
            .get(ty.index())
            .and_then(|c| c.as_deref())
            .map_or(0, |c| c.len())
    }

    /// Drop every component without running hooks.
    pub fn clear(&mut self) {
        for column in self.columns.iter_mut().flatten() {
            column.clear();
        }
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("columns", &self.columns.iter().flatten().count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;

    #[derive(Debug, PartialEq)]
    struct Hp(u32);
    impl Component for Hp {
        const NAME: &'static str = "hp";
    }

    #[derive(Debug, PartialEq)]
    struct Tag;
    impl Component for Tag {
        const NAME: &'static str = "tag";
    }

    #[test]
    fn insert_overwrite_take() {
        let mut reg = ComponentRegistry::new();
        let hp = reg.register::<Hp>();
        let mut store = ComponentStore::new();
        let e = EntityId::from_raw(1);

        assert!(store.insert(hp, e, Hp(10)).is_none());
        assert_eq!(store.insert(hp, e, Hp(20)), Some(Hp(10)));
        assert_eq!(store.get::<Hp>(hp, e), Some(&Hp(20)));
        store.get_mut::<Hp>(hp, e).unwrap().0 = 5;
        assert_eq!(store.take::<Hp>(hp, e), Some(Hp(5)));
        assert!(!store.has(hp, e));
    }

    #[test]
    fn absent_lookups_are_none() {
        let mut reg = ComponentRegistry::new();
        let hp = reg.register::<Hp>();
        let store = ComponentStore::new();
        assert!(store.get::<Hp>(hp, EntityId::from_raw(3)).is_none());
        assert!(!store.has(hp, EntityId::from_raw(3)));
        assert_eq!(store.count(hp), 0);
    }

    #[test]
    fn types_of_lists_attached_types() {
        let mut reg = ComponentRegistry::new();
        let hp = reg.register::<Hp>();
        let tag = reg.register::<Tag>();
        let mut store = ComponentStore::new();
        let e = EntityId::from_raw(1);
        store.insert(hp, e, Hp(1));
        store.insert(tag, e, Tag);
        assert_eq!(store.types_of(e), vec![hp, tag]);

        let erased = store.take_erased(tag, e).unwrap();
        assert_eq!(erased.type_name(), "tag");
        assert_eq!(store.types_of(e), vec![hp]);
    }
}
