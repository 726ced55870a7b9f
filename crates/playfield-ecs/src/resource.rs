//! Typed singleton storage owned by the [`World`](crate::world::World).
//!
//! Resources hold state that several systems share but that does not belong
//! to any one entity: the physics world, the frame's draw list, a game's
//! score board. There is at most one value per Rust type.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A map from Rust type to a single value of that type.
#[derive(Default)]
pub struct Resources {
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl Resources {
    /// Create an empty resource map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, returning the previous value of the same type.
    pub fn insert<R: 'static>(&mut self, value: R) -> Option<R> {
        self.values
            .insert(TypeId::of::<R>(), Box::new(value))
            .and_then(|old| old.downcast::<R>().ok())
            .map(|b| *b)
    }

    /// Shared access to a resource.
    pub fn get<R: 'static>(&self) -> Option<&R> {
        self.values
            .get(&TypeId::of::<R>())
            .and_then(|b| b.downcast_ref::<R>())
    }

    /// Mutable access to a resource.
    pub fn get_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.values
            .get_mut(&TypeId::of::<R>())
            .and_then(|b| b.downcast_mut::<R>())
    }

    /// Remove and return a resource.
    pub fn remove<R: 'static>(&mut self) -> Option<R> {
        self.values
            .remove(&TypeId::of::<R>())
            .and_then(|b| b.downcast::<R>().ok())
            .map(|b| *b)
    }

    /// Whether a resource of type `R` is present.
    pub fn contains<R: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<R>())
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no resources are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every resource.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("count", &self.values.len())
            .finish()
    }
}
