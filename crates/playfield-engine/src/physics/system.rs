//! The rigid-body binding component and the system that steps the solver.

use playfield_ecs::component::{Component, HookContext};
use playfield_ecs::entity::EntityId;
use playfield_ecs::system::{Signature, System, SystemContext};
use playfield_ecs::world::World;
use playfield_ecs::EcsError;

use crate::animation::{Animation, AnimationKind};
use crate::components::Transform;
use crate::config::PhysicsConfig;
use crate::math::Vec2;

use super::grounding::{GroundingPolicy, GroundingTracker};
use super::{BodyDesc, BodyHandle, ContactEvent, PhysicsWorld};

// ---------------------------------------------------------------------------
// RigidBody
// ---------------------------------------------------------------------------

/// Links an entity to a body in the [`PhysicsWorld`] resource.
///
/// Removing the component (directly or by despawning the entity) removes the
/// body from the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    handle: BodyHandle,
    /// Resting on a supporting surface. Maintained by [`PhysicsSystem`].
    pub grounded: bool,
    landings: u64,
}

impl RigidBody {
    pub fn new(handle: BodyHandle) -> Self {
        Self {
            handle,
            grounded: false,
            landings: 0,
        }
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Number of airborne-to-grounded transitions so far.
    pub fn landings(&self) -> u64 {
        self.landings
    }

    /// Mark the body grounded. Returns `true` on a transition from airborne.
    pub fn land(&mut self) -> bool {
        if self.grounded {
            return false;
        }
        self.grounded = true;
        self.landings += 1;
        true
    }
}

impl Component for RigidBody {
    const NAME: &'static str = "rigid_body";

    fn on_remove(&mut self, ctx: &mut HookContext<'_>) {
        match ctx.resources.get_mut::<PhysicsWorld>() {
            Some(physics) => {
                physics.remove_body(self.handle);
            }
            None => tracing::warn!(
                entity = %ctx.entity,
                "rigid body detached without a physics world; body left in solver"
            ),
        }
    }
}

/// Create a body for `entity` and bind it with a [`RigidBody`] component.
/// Seeds a [`Transform`] at the body's position if the entity has none.
pub fn attach_body(
    world: &mut World,
    entity: EntityId,
    desc: &BodyDesc,
    is_actor: bool,
) -> Result<BodyHandle, EcsError> {
    if !world.is_alive(entity) {
        return Err(EcsError::DeadEntity { entity });
    }
    let handle = world
        .require_resource_mut::<PhysicsWorld>()?
        .add_body(desc, Some(entity), is_actor);
    if !world.has::<Transform>(entity) {
        let mut t = Transform::at(desc.position.x, desc.position.y);
        t.rotation = desc.rotation;
        world.insert(entity, t)?;
    }
    world.insert(entity, RigidBody::new(handle))?;
    Ok(handle)
}

// ---------------------------------------------------------------------------
// PhysicsSystem
// ---------------------------------------------------------------------------

/// Steps the solver once per frame with the fixed step, turns contact events
/// into grounding transitions and copies body poses into transforms.
#[derive(Debug)]
pub struct PhysicsSystem {
    policy: GroundingPolicy,
    tracker: GroundingTracker,
}

/// Grounding changes decided while the physics world is borrowed, applied
/// to components afterwards.
enum Grounding {
    Landed(EntityId, BodyHandle),
    Airborne(EntityId, BodyHandle),
}

impl PhysicsSystem {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            policy: GroundingPolicy::from_config(config),
            tracker: GroundingTracker::new(config.regrounding_delay_ms),
        }
    }

    pub fn policy(&self) -> &GroundingPolicy {
        &self.policy
    }

    pub fn tracker(&self) -> &GroundingTracker {
        &self.tracker
    }

    fn resolve_contacts(&mut self, physics: &PhysicsWorld, events: &[ContactEvent], out: &mut Vec<Grounding>) {
        for event in events {
            match event {
                ContactEvent::Started { a, b } => {
                    let (actor, surface) = match (a.is_actor, b.is_actor) {
                        (true, false) => (a, b),
                        (false, true) => (b, a),
                        _ => continue,
                    };
                    let Some(owner) = actor.owner else { continue };
                    if self.policy.is_landing(actor, surface) {
                        out.push(Grounding::Landed(owner, actor.handle));
                    } else {
                        tracing::trace!(entity = %owner, vy = actor.velocity.y, "contact is not a landing");
                    }
                }
                ContactEvent::Ended { a, b } => {
                    let actor = match (physics.is_actor(*a), physics.is_actor(*b)) {
                        (true, false) => *a,
                        (false, true) => *b,
                        _ => continue,
                    };
                    if let Some(owner) = physics.owner(actor) {
                        self.tracker.schedule(owner, actor);
                    }
                }
            }
        }
    }

    fn run_rechecks(&mut self, physics: &PhysicsWorld, elapsed_ms: f64, out: &mut Vec<Grounding>) {
        let due = self.tracker.advance(elapsed_ms);
        if due.is_empty() {
            return;
        }
        let bodies = physics.snapshots();
        for check in due {
            let Some(actor) = physics.snapshot(check.body) else {
                tracing::trace!(entity = %check.entity, "regrounding check for a removed body");
                continue;
            };
            if !self.policy.is_supported(&actor, &bodies) {
                out.push(Grounding::Airborne(check.entity, check.body));
            }
        }
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .require::<Transform>()
            .require::<RigidBody>()
            .optional::<Animation>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()> {
        let bound: Vec<(EntityId, BodyHandle)> = ctx
            .entities()
            .into_iter()
            .filter_map(|e| ctx.world.get::<RigidBody>(e).map(|rb| (e, rb.handle)))
            .collect();

        let mut changes = Vec::new();
        let poses: Vec<(EntityId, Vec2, f64)> = {
            let physics = ctx.world.require_resource_mut::<PhysicsWorld>()?;
            let events = physics.step();
            let physics = &*physics;
            self.resolve_contacts(physics, &events, &mut changes);
            self.run_rechecks(physics, dt * 1000.0, &mut changes);
            bound
                .iter()
                .filter_map(|&(e, h)| physics.snapshot(h).map(|s| (e, s.position, s.rotation)))
                .collect()
        };

        for change in changes {
            match change {
                Grounding::Landed(entity, handle) => {
                    let landed = match ctx.world.get_mut::<RigidBody>(entity) {
                        Some(rb) if rb.handle == handle => rb.land(),
                        _ => false,
                    };
                    if landed {
                        tracing::debug!(%entity, "actor landed");
                        if let Some(anim) = ctx.world.get_mut::<Animation>(entity) {
                            anim.start(AnimationKind::Landing);
                        }
                    }
                }
                Grounding::Airborne(entity, handle) => match ctx.world.get_mut::<RigidBody>(entity) {
                    Some(rb) if rb.handle == handle => {
                        if rb.grounded {
                            tracing::debug!(%entity, "actor airborne");
                        }
                        rb.grounded = false;
                    }
                    _ => tracing::trace!(%entity, "stale regrounding check dropped"),
                },
            }
        }

        for (entity, position, rotation) in poses {
            if let Some(t) = ctx.world.get_mut::<Transform>(entity) {
                t.position = position;
                t.rotation = rotation;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playfield_ecs::scheduler::Scheduler;

    fn setup() -> (World, Scheduler) {
        let mut world = World::new();
        world.insert_resource(PhysicsWorld::new(&PhysicsConfig::default()).unwrap());
        let mut scheduler = Scheduler::new();
        scheduler.register(&mut world, PhysicsSystem::new(&PhysicsConfig::default()));
        (world, scheduler)
    }

    #[test]
    fn removing_the_binding_removes_the_body() {
        let (mut world, _) = setup();
        let e = world.spawn();
        let h = attach_body(&mut world, e, &BodyDesc::rect(0.0, 0.0, 10.0, 10.0), false).unwrap();
        assert!(world.has::<Transform>(e));
        assert!(world.resource::<PhysicsWorld>().unwrap().contains(h));
        world.remove::<RigidBody>(e);
        assert!(!world.resource::<PhysicsWorld>().unwrap().contains(h));

        let e2 = world.spawn();
        let h2 = attach_body(&mut world, e2, &BodyDesc::rect(0.0, 0.0, 10.0, 10.0), false).unwrap();
        world.despawn(e2).unwrap();
        assert!(!world.resource::<PhysicsWorld>().unwrap().contains(h2));
    }

    #[test]
    fn attach_to_dead_entity_fails() {
        let (mut world, _) = setup();
        let e = world.spawn();
        world.despawn(e).unwrap();
        assert!(matches!(
            attach_body(&mut world, e, &BodyDesc::rect(0.0, 0.0, 1.0, 1.0), false),
            Err(EcsError::DeadEntity { .. })
        ));
        assert_eq!(world.resource::<PhysicsWorld>().unwrap().body_count(), 0);
    }

    #[test]
    fn transforms_follow_bodies() {
        let (mut world, mut scheduler) = setup();
        let e = world.spawn();
        attach_body(&mut world, e, &BodyDesc::rect(100.0, 0.0, 10.0, 10.0), false).unwrap();
        for _ in 0..5 {
            scheduler.tick(&mut world, 1.0 / 60.0);
        }
        let t = world.get::<Transform>(e).unwrap();
        assert!(t.position.y > 0.0);
        assert!((t.position.x - 100.0).abs() < 1e-3);
    }

    #[test]
    fn land_only_counts_transitions() {
        let mut rb = RigidBody::new(BodyHandle::from_raw_parts(0, 0));
        assert!(rb.land());
        assert!(!rb.land());
        rb.grounded = false;
        assert!(rb.land());
        assert_eq!(rb.landings(), 2);
    }
}
