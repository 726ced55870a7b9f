//! rapier2d integration.
//!
//! [`PhysicsWorld`] owns one rapier simulation. It is stored as a world
//! resource and stepped by the [`PhysicsSystem`] with a fixed timestep,
//! independent of the render delta. Each body may be owned by an entity
//! (through a [`RigidBody`] component) or be free-standing scenery such as
//! invisible boundary walls.
//!
//! Units are pixels and seconds, y grows downward. rapier is told the typical
//! object size through `IntegrationParameters::length_unit` so its internal
//! tolerances scale to pixel-sized worlds.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Contact events are
//! sorted by body handle before they are returned, so the same inputs yield
//! the same event sequence.

pub mod grounding;
pub mod system;

use std::collections::{HashMap, HashSet};

use playfield_ecs::entity::EntityId;
use rapier2d::prelude::*;

use crate::config::PhysicsConfig;
use crate::math::Vec2;
use crate::EngineError;

pub use grounding::{GroundingPolicy, GroundingTracker, PendingRecheck};
pub use system::{attach_body, PhysicsSystem, RigidBody};

/// Handle to a body in the [`PhysicsWorld`]. Generational: a handle to a
/// removed body never aliases a newer one.
pub type BodyHandle = RigidBodyHandle;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    /// Bounds of a `width` x `height` box centered on `center`.
    pub fn from_center(center: Vec2, width: f64, height: f64) -> Self {
        let half = Vec2::new(width / 2.0, height / 2.0);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        self.min.lerp(self.max, 0.5)
    }

    /// Whether the boxes touch or overlap, after growing `self` by `margin`
    /// on every side.
    pub fn overlaps(&self, other: &Bounds, margin: f64) -> bool {
        !(self.max.x + margin < other.min.x
            || self.min.x - margin > other.max.x
            || self.max.y + margin < other.min.y
            || self.min.y - margin > other.max.y)
    }
}

// ---------------------------------------------------------------------------
// BodyDesc
// ---------------------------------------------------------------------------

/// Collider geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    Rect { width: f64, height: f64 },
    Circle { radius: f64 },
}

/// Whether the solver moves the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Static,
}

/// Everything needed to create a body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    /// Center.
    pub position: Vec2,
    pub rotation: f64,
    pub shape: BodyShape,
    pub kind: BodyKind,
    pub density: f64,
    pub friction: f64,
    pub restitution: f64,
    /// Velocity damping per second (air resistance).
    pub linear_damping: f64,
    pub lock_rotation: bool,
    /// Sensors report contacts but do not block.
    pub sensor: bool,
}

impl BodyDesc {
    /// A dynamic `width` x `height` box centered at (`x`, `y`).
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            position: Vec2::new(x, y),
            rotation: 0.0,
            shape: BodyShape::Rect { width, height },
            kind: BodyKind::Dynamic,
            density: 1.0,
            friction: 0.1,
            restitution: 0.0,
            linear_damping: 0.0,
            lock_rotation: false,
            sensor: false,
        }
    }

    /// A dynamic disc centered at (`x`, `y`).
    pub fn circle(x: f64, y: f64, radius: f64) -> Self {
        Self {
            shape: BodyShape::Circle { radius },
            ..Self::rect(x, y, 0.0, 0.0)
        }
    }

    /// Make the body immovable.
    pub fn fixed(mut self) -> Self {
        self.kind = BodyKind::Static;
        self
    }

    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn damping(mut self, damping: f64) -> Self {
        self.linear_damping = damping;
        self
    }

    pub fn lock_rotation(mut self) -> Self {
        self.lock_rotation = true;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Snapshots and events
// ---------------------------------------------------------------------------

/// Read-only view of a body after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySnapshot {
    pub handle: BodyHandle,
    pub owner: Option<EntityId>,
    pub position: Vec2,
    pub rotation: f64,
    /// px/s.
    pub velocity: Vec2,
    pub bounds: Bounds,
    pub is_static: bool,
    pub is_actor: bool,
}

/// A change in contact between two bodies during one step.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactEvent {
    /// The bodies began touching. Snapshots are taken right after the step.
    Started { a: BodySnapshot, b: BodySnapshot },
    /// The bodies stopped touching. Either may already be gone.
    Ended { a: BodyHandle, b: BodyHandle },
}

impl ContactEvent {
    fn sort_key(&self) -> (u32, u32, u8) {
        let (a, b, tag) = match self {
            ContactEvent::Started { a, b } => (a.handle, b.handle, 0),
            ContactEvent::Ended { a, b } => (*a, *b, 1),
        };
        let (a, b) = (a.into_raw_parts().0, b.into_raw_parts().0);
        (a.min(b), a.max(b), tag)
    }
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

struct BodyMeta {
    owner: Option<EntityId>,
}

/// One rapier simulation plus the bookkeeping that links it to entities.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    bodies: HashMap<BodyHandle, BodyMeta>,
    /// Bodies whose contacts drive grounding.
    actors: HashSet<BodyHandle>,
    /// Kept after removal until the next step so "stopped" events for
    /// removed colliders can still be attributed to their body.
    collider_to_body: HashMap<ColliderHandle, BodyHandle>,
    retired_colliders: Vec<ColliderHandle>,
    fixed_step_secs: f64,
}

impl PhysicsWorld {
    /// Create an empty simulation.
    pub fn new(config: &PhysicsConfig) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::SolverInit(e.to_string()))?;
        let integration_params = IntegrationParameters {
            dt: config.fixed_step_secs() as Real,
            length_unit: config.length_unit as Real,
            ..IntegrationParameters::default()
        };
        Ok(Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![config.gravity[0] as Real, config.gravity[1] as Real],
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            bodies: HashMap::new(),
            actors: HashSet::new(),
            collider_to_body: HashMap::new(),
            retired_colliders: Vec::new(),
            fixed_step_secs: config.fixed_step_secs(),
        })
    }

    /// Insert a body. `owner` links it to an entity; actors take part in
    /// grounding and collectible checks.
    pub fn add_body(&mut self, desc: &BodyDesc, owner: Option<EntityId>, is_actor: bool) -> BodyHandle {
        let builder = match desc.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Static => RigidBodyBuilder::fixed(),
        };
        let mut builder = builder
            .translation(vector![desc.position.x as Real, desc.position.y as Real])
            .rotation(desc.rotation as Real)
            .linear_damping(desc.linear_damping as Real);
        if desc.lock_rotation {
            builder = builder.lock_rotations();
        }
        let handle = self.rigid_body_set.insert(builder.build());

        let shape = match desc.shape {
            BodyShape::Rect { width, height } => {
                SharedShape::cuboid((width / 2.0) as Real, (height / 2.0) as Real)
            }
            BodyShape::Circle { radius } => SharedShape::ball(radius as Real),
        };
        let collider = ColliderBuilder::new(shape)
            .density(desc.density as Real)
            .friction(desc.friction as Real)
            .restitution(desc.restitution as Real)
            .sensor(desc.sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        self.collider_to_body.insert(collider_handle, handle);

        self.bodies.insert(handle, BodyMeta { owner });
        if is_actor {
            self.actors.insert(handle);
        }
        tracing::trace!(?handle, owner = ?owner, is_actor, "body added");
        handle
    }

    /// Remove a body and its colliders. Returns `false` if it was already
    /// gone, which is not an error.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if self.bodies.remove(&handle).is_none() {
            return false;
        }
        self.actors.remove(&handle);
        if let Some(body) = self.rigid_body_set.get(handle) {
            self.retired_colliders.extend_from_slice(body.colliders());
        }
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        tracing::trace!(?handle, "body removed");
        true
    }

    /// Advance the simulation by one fixed step and report contact changes,
    /// sorted by body pair.
    pub fn step(&mut self) -> Vec<ContactEvent> {
        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        let mut events = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let (c1, c2) = (event.collider1(), event.collider2());
            let (Some(&a), Some(&b)) = (self.collider_to_body.get(&c1), self.collider_to_body.get(&c2)) else {
                continue;
            };
            if event.started() {
                if let (Some(a), Some(b)) = (self.snapshot(a), self.snapshot(b)) {
                    events.push(ContactEvent::Started { a, b });
                }
            } else {
                events.push(ContactEvent::Ended { a, b });
            }
        }
        events.sort_by_key(ContactEvent::sort_key);

        for collider in self.retired_colliders.drain(..) {
            self.collider_to_body.remove(&collider);
        }
        events
    }

    /// The fixed step in seconds.
    pub fn fixed_step_secs(&self) -> f64 {
        self.fixed_step_secs
    }

    /// Current state of one body.
    pub fn snapshot(&self, handle: BodyHandle) -> Option<BodySnapshot> {
        let meta = self.bodies.get(&handle)?;
        let body = self.rigid_body_set.get(handle)?;
        let t = body.translation();
        let v = body.linvel();
        Some(BodySnapshot {
            handle,
            owner: meta.owner,
            position: Vec2::new(f64::from(t.x), f64::from(t.y)),
            rotation: f64::from(body.rotation().angle()),
            velocity: Vec2::new(f64::from(v.x), f64::from(v.y)),
            bounds: self.bounds(handle)?,
            is_static: body.is_fixed(),
            is_actor: self.actors.contains(&handle),
        })
    }

    /// Snapshots of every body, ordered by handle.
    pub fn snapshots(&self) -> Vec<BodySnapshot> {
        let mut handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        handles.sort_by_key(|h| h.into_raw_parts());
        handles.into_iter().filter_map(|h| self.snapshot(h)).collect()
    }

    /// World-space bounding box of a body's colliders.
    pub fn bounds(&self, handle: BodyHandle) -> Option<Bounds> {
        let body = self.rigid_body_set.get(handle)?;
        let mut out: Option<Bounds> = None;
        for &ch in body.colliders() {
            let Some(collider) = self.collider_set.get(ch) else {
                continue;
            };
            let local = collider
                .position_wrt_parent()
                .copied()
                .unwrap_or_else(Isometry::identity);
            let aabb = collider.shape().compute_aabb(&(body.position() * local));
            let b = Bounds {
                min: Vec2::new(f64::from(aabb.mins.x), f64::from(aabb.mins.y)),
                max: Vec2::new(f64::from(aabb.maxs.x), f64::from(aabb.maxs.y)),
            };
            out = Some(match out {
                None => b,
                Some(acc) => Bounds {
                    min: Vec2::new(acc.min.x.min(b.min.x), acc.min.y.min(b.min.y)),
                    max: Vec2::new(acc.max.x.max(b.max.x), acc.max.y.max(b.max.y)),
                },
            });
        }
        out
    }

    /// Make every collider of the body a sensor (or solid again).
    pub fn set_sensor(&mut self, handle: BodyHandle, sensor: bool) -> bool {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return false;
        };
        for &ch in body.colliders() {
            if let Some(c) = self.collider_set.get_mut(ch) {
                c.set_sensor(sensor);
            }
        }
        true
    }

    /// Apply an instantaneous impulse (mass × Δv) at the center of mass.
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2) -> bool {
        match self.rigid_body_set.get_mut(handle) {
            Some(body) => {
                body.apply_impulse(vector![impulse.x as Real, impulse.y as Real], true);
                true
            }
            None => false,
        }
    }

    /// Add `delta` (px/s) to a body's linear velocity; the impulse of
    /// mass × `delta` without depending on mass.
    pub fn apply_velocity_change(&mut self, handle: BodyHandle, delta: Vec2) -> bool {
        match self.rigid_body_set.get_mut(handle) {
            Some(body) => {
                let v = *body.linvel() + vector![delta.x as Real, delta.y as Real];
                body.set_linvel(v, true);
                true
            }
            None => false,
        }
    }

    /// Teleport a body.
    pub fn set_position(&mut self, handle: BodyHandle, position: Vec2) -> bool {
        match self.rigid_body_set.get_mut(handle) {
            Some(body) => {
                body.set_translation(vector![position.x as Real, position.y as Real], true);
                true
            }
            None => false,
        }
    }

    /// Overwrite a body's linear velocity (px/s).
    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> bool {
        match self.rigid_body_set.get_mut(handle) {
            Some(body) => {
                body.set_linvel(vector![velocity.x as Real, velocity.y as Real], true);
                true
            }
            None => false,
        }
    }

    /// Mass of a body, 0 for static or missing bodies.
    pub fn mass(&self, handle: BodyHandle) -> f64 {
        self.rigid_body_set
            .get(handle)
            .filter(|b| b.is_dynamic())
            .map_or(0.0, |b| f64::from(b.mass()))
    }

    /// The entity owning a body.
    pub fn owner(&self, handle: BodyHandle) -> Option<EntityId> {
        self.bodies.get(&handle).and_then(|m| m.owner)
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    pub fn is_actor(&self, handle: BodyHandle) -> bool {
        self.actors.contains(&handle)
    }

    /// Actor bodies, ordered by handle.
    pub fn actors(&self) -> Vec<BodyHandle> {
        let mut v: Vec<BodyHandle> = self.actors.iter().copied().collect();
        v.sort_by_key(|h| h.into_raw_parts());
        v
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Remove every body.
    pub fn clear(&mut self) {
        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        for h in handles {
            self.remove_body(h);
        }
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.bodies.len())
            .field("actors", &self.actors.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
