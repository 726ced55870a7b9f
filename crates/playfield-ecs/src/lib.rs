//! Playfield ECS -- entity/component/system core with synchronous
//! capability-matched membership.
//!
//! A [`World`](world::World) owns entities, their components and shared
//! resources. A [`Scheduler`](scheduler::Scheduler) runs [`System`]s in
//! registration order; every system declares the component types it requires
//! and the world keeps each system's matched set exact after every single
//! component add or remove.
//!
//! # Quick Start
//!
//! ```
//! use playfield_ecs::prelude::*;
//!
//! struct Position(f64);
//! impl Component for Position {
//!     const NAME: &'static str = "position";
//! }
//!
//! struct Velocity(f64);
//! impl Component for Velocity {
//!     const NAME: &'static str = "velocity";
//! }
//!
//! struct Movement;
//! impl System for Movement {
//!     fn name(&self) -> &str {
//!         "movement"
//!     }
//!     fn signature(&self) -> Signature {
//!         Signature::new().require::<Position>().require::<Velocity>()
//!     }
//!     fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()> {
//!         for e in ctx.entities() {
//!             let v = ctx.world.get::<Velocity>(e).map_or(0.0, |v| v.0);
//!             if let Some(p) = ctx.world.get_mut::<Position>(e) {
//!                 p.0 += v * dt;
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! let mut scheduler = Scheduler::new();
//! let movement = scheduler.register(&mut world, Movement);
//!
//! let e = world.spawn_named("ball");
//! world.insert(e, Position(0.0)).unwrap();
//! assert!(world.matched(movement).unwrap().is_empty());
//! world.insert(e, Velocity(2.0)).unwrap();
//! assert!(world.matched(movement).unwrap().contains(&e));
//!
//! scheduler.tick(&mut world, 0.5);
//! assert_eq!(world.get::<Position>(e).map(|p| p.0), Some(1.0));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod events;
pub mod membership;
pub mod profile;
pub mod resource;
pub mod scheduler;
pub mod store;
pub mod system;
pub mod world;

pub use system::System;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity was never allocated or has been destroyed.
    #[error("entity {entity} is not alive")]
    DeadEntity { entity: entity::EntityId },

    /// A system id that is not (or no longer) registered.
    #[error("system {system:?} is not registered")]
    UnknownSystem { system: system::SystemId },

    /// A required resource is not present in the world.
    #[error("resource '{name}' is missing from the world")]
    ResourceMissing { name: &'static str },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common types.
pub mod prelude {
    pub use crate::component::{Component, ComponentKey, ComponentTypeId, HookContext};
    pub use crate::entity::{Entity, EntityId};
    pub use crate::events::{BusEvent, EventBus, EventSender, Subscription};
    pub use crate::profile::PerformanceMetrics;
    pub use crate::resource::Resources;
    pub use crate::scheduler::{FaultKind, Scheduler, SystemFault, TickReport};
    pub use crate::system::{Signature, System, SystemContext, SystemId};
    pub use crate::world::{ChangeKind, ComponentEvent, World};
    pub use crate::EcsError;
}
