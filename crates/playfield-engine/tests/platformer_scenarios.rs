//! Platformer behaviour end to end: grounding transitions, jump gating and
//! collection, driven through the scheduler or a headless host.

use playfield_engine::games::platformer::CollectibleSystem;
use playfield_engine::prelude::*;

const DT: f64 = 1.0 / 60.0;

fn zero_gravity() -> PhysicsConfig {
    PhysicsConfig {
        gravity: [0.0, 0.0],
        ..PhysicsConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Grounding
// ---------------------------------------------------------------------------

/// An actor dropped onto a static floor, with the physics and animation
/// systems registered.
fn drop_scene() -> (World, Scheduler, EntityId) {
    let config = PhysicsConfig::default();
    let mut world = World::new();
    world.insert_resource(PhysicsWorld::new(&config).unwrap());
    let mut scheduler = Scheduler::new();
    scheduler.register(&mut world, PhysicsSystem::new(&config));
    scheduler.register(&mut world, AnimationSystem);

    let floor = world.spawn_named("floor");
    attach_body(&mut world, floor, &BodyDesc::rect(400.0, 550.0, 800.0, 100.0).fixed(), false).unwrap();

    let actor = world.spawn_named("actor");
    let desc = BodyDesc::rect(400.0, 300.0, 50.0, 50.0)
        .density(0.1)
        .restitution(0.0)
        .lock_rotation();
    attach_body(&mut world, actor, &desc, true).unwrap();
    world.insert(actor, Animation::new()).unwrap();
    world.insert(actor, ActorControl::default()).unwrap();
    (world, scheduler, actor)
}

#[test]
fn landing_grounds_the_actor_exactly_once() {
    let (mut world, mut scheduler, actor) = drop_scene();

    let mut first_grounded = None;
    for frame in 0..240 {
        scheduler.tick(&mut world, DT);
        if first_grounded.is_none() && world.get::<RigidBody>(actor).unwrap().grounded {
            first_grounded = Some(frame);
        }
    }
    assert!(first_grounded.is_some(), "actor never landed");

    let rb = world.get::<RigidBody>(actor).unwrap();
    assert!(rb.grounded);
    assert_eq!(rb.landings(), 1);
    assert_eq!(world.get::<Animation>(actor).unwrap().started(), 1);

    let t = world.get::<Transform>(actor).unwrap();
    assert!((t.position.y - 475.0).abs() < 3.0, "resting at {}", t.position.y);
}

#[test]
fn resting_contact_produces_no_new_transition() {
    let (mut world, mut scheduler, actor) = drop_scene();
    for _ in 0..240 {
        scheduler.tick(&mut world, DT);
    }
    for _ in 0..240 {
        scheduler.tick(&mut world, DT);
        assert!(world.get::<RigidBody>(actor).unwrap().grounded);
    }
    assert_eq!(world.get::<RigidBody>(actor).unwrap().landings(), 1);
}

#[test]
fn jumping_leaves_the_ground_and_lands_again() {
    let (mut world, mut scheduler, actor) = drop_scene();
    for _ in 0..240 {
        scheduler.tick(&mut world, DT);
    }
    assert!(jump(&mut world, actor).unwrap());

    let mut airborne = false;
    for _ in 0..240 {
        scheduler.tick(&mut world, DT);
        if !world.get::<RigidBody>(actor).unwrap().grounded {
            airborne = true;
        }
    }
    assert!(airborne, "actor was never marked airborne");

    let rb = world.get::<RigidBody>(actor).unwrap();
    assert!(rb.grounded);
    assert_eq!(rb.landings(), 2);
}

fn settle(world: &mut World, scheduler: &mut Scheduler, frames: usize) {
    for _ in 0..frames {
        assert!(scheduler.tick(world, DT).faults.is_empty());
    }
}

fn grounded(world: &World, actor: EntityId) -> bool {
    world.get::<RigidBody>(actor).unwrap().grounded
}

/// Teleport a resting actor far above the floor. Its contact ends on the
/// next step, which queues a regrounding check.
fn lift(world: &mut World, actor: EntityId) {
    let handle = world.get::<RigidBody>(actor).unwrap().handle();
    let physics = world.resource_mut::<PhysicsWorld>().unwrap();
    assert!(physics.set_position(handle, Vec2::new(400.0, 100.0)));
    assert!(physics.set_velocity(handle, Vec2::ZERO));
}

#[test]
fn losing_contact_goes_airborne_only_after_the_delay() {
    let (mut world, mut scheduler, actor) = drop_scene();
    settle(&mut world, &mut scheduler, 240);
    lift(&mut world, actor);

    settle(&mut world, &mut scheduler, 1);
    assert!(grounded(&world, actor), "flipped before the regrounding delay");
    settle(&mut world, &mut scheduler, 10);
    assert!(!grounded(&world, actor));
}

#[test]
fn pending_check_for_a_despawned_actor_is_dropped() {
    let (mut world, mut scheduler, actor) = drop_scene();
    settle(&mut world, &mut scheduler, 240);
    lift(&mut world, actor);
    settle(&mut world, &mut scheduler, 1);

    world.despawn(actor).unwrap();
    assert_eq!(world.resource::<PhysicsWorld>().unwrap().body_count(), 1);
    // Well past the delay; every tick must stay fault free.
    settle(&mut world, &mut scheduler, 30);
    assert!(!world.is_alive(actor));
}

#[test]
fn pending_check_for_a_replaced_body_leaves_the_new_binding_alone() {
    let (mut world, mut scheduler, actor) = drop_scene();
    settle(&mut world, &mut scheduler, 240);
    let old = world.get::<RigidBody>(actor).unwrap().handle();
    lift(&mut world, actor);
    settle(&mut world, &mut scheduler, 1);

    // New body just above the floor, so it lands before the old check is due.
    let desc = BodyDesc::rect(400.0, 474.0, 50.0, 50.0)
        .density(0.1)
        .restitution(0.0)
        .lock_rotation();
    let fresh = attach_body(&mut world, actor, &desc, true).unwrap();
    assert_ne!(fresh, old);
    {
        let physics = world.resource::<PhysicsWorld>().unwrap();
        assert!(!physics.contains(old));
        assert_eq!(physics.body_count(), 2);
    }

    settle(&mut world, &mut scheduler, 60);
    let rb = world.get::<RigidBody>(actor).unwrap();
    assert_eq!(rb.handle(), fresh);
    assert!(rb.grounded);
    assert_eq!(rb.landings(), 1);
}

#[test]
fn walking_across_a_seam_between_slabs_stays_grounded() {
    let config = PhysicsConfig::default();
    let mut world = World::new();
    world.insert_resource(PhysicsWorld::new(&config).unwrap());
    let mut scheduler = Scheduler::new();
    scheduler.register(&mut world, PhysicsSystem::new(&config));

    // Two slabs meeting at x = 400.
    for (name, x) in [("left_slab", 200.0), ("right_slab", 600.0)] {
        let slab = world.spawn_named(name);
        attach_body(&mut world, slab, &BodyDesc::rect(x, 550.0, 400.0, 100.0).fixed(), false).unwrap();
    }
    let actor = world.spawn_named("walker");
    let desc = BodyDesc::rect(300.0, 400.0, 50.0, 50.0)
        .density(0.1)
        .restitution(0.0)
        .lock_rotation();
    let handle = attach_body(&mut world, actor, &desc, true).unwrap();

    settle(&mut world, &mut scheduler, 120);
    assert!(grounded(&world, actor));

    for frame in 0..90 {
        world
            .resource_mut::<PhysicsWorld>()
            .unwrap()
            .set_velocity(handle, Vec2::new(150.0, 0.0));
        settle(&mut world, &mut scheduler, 1);
        assert!(grounded(&world, actor), "airborne at walk frame {frame}");
    }
    // Fully over the right slab.
    assert!(world.get::<Transform>(actor).unwrap().position.x > 450.0);
    assert_eq!(world.get::<RigidBody>(actor).unwrap().landings(), 1);
}

// ---------------------------------------------------------------------------
// Jump gating through the host
// ---------------------------------------------------------------------------

struct Session {
    host: Host,
    time: ManualTime,
}

impl Session {
    fn platformer() -> Self {
        let time = ManualTime::new();
        let mut host = Host::with_time_source(
            EngineConfig::default(),
            Box::new(HeadlessSurface::new()),
            Box::new(time.clone()),
        );
        host.start(Box::new(Platformer::default())).unwrap();
        Self { host, time }
    }

    fn frames(&mut self, n: usize) {
        for _ in 0..n {
            self.time.advance(1000.0 / 60.0);
            self.host.frame().unwrap();
        }
    }

    fn press_space(&mut self) {
        self.host.key_down(" ", "Space");
        self.frames(1);
        self.host.key_up(" ", "Space");
    }

    fn jumps(&self) -> u32 {
        self.host.world().resource::<PlatformerState>().unwrap().jumps
    }
}

#[test]
fn second_jump_inside_cooldown_is_refused() {
    let mut s = Session::platformer();
    s.frames(120);

    s.press_space();
    s.press_space();
    assert_eq!(s.jumps(), 1);

    // Airborne and past the cooldown: still refused.
    s.frames(20);
    s.press_space();
    assert_eq!(s.jumps(), 1);

    // Back on the ground with the cooldown long gone.
    s.frames(240);
    s.press_space();
    assert_eq!(s.jumps(), 2);
    s.host.shutdown();
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

#[test]
fn touching_five_boxes_scores_five() {
    let config = zero_gravity();
    let mut world = World::new();
    world.insert_resource(PhysicsWorld::new(&config).unwrap());
    world.insert_resource(PlatformerState::new(800.0, 600.0, 100.0));
    let mut scheduler = Scheduler::new();
    scheduler.register(&mut world, PhysicsSystem::new(&config));
    scheduler.register(&mut world, CollectibleSystem);

    let actor = world.spawn_named("actor");
    let actor_body = attach_body(&mut world, actor, &BodyDesc::rect(50.0, 300.0, 50.0, 50.0), true).unwrap();

    let mut boxes = Vec::new();
    for i in 0..5 {
        let e = world.spawn();
        let x = 150.0 + 120.0 * f64::from(i);
        let h = attach_body(&mut world, e, &BodyDesc::rect(x, 300.0, 50.0, 50.0), false).unwrap();
        world.insert(e, Collectible).unwrap();
        boxes.push((e, h));
    }

    scheduler.tick(&mut world, DT);
    let state = world.resource::<PlatformerState>().unwrap();
    assert_eq!(state.score, 0);
    assert_eq!(state.boxes_remaining, 5);

    for (n, &(entity, handle)) in boxes.iter().enumerate() {
        let physics = world.resource_mut::<PhysicsWorld>().unwrap();
        let target = physics.snapshot(handle).unwrap().position;
        physics.set_position(actor_body, Vec2::new(target.x + 20.0, target.y));
        physics.set_velocity(actor_body, Vec2::new(0.0, 0.0));

        scheduler.tick(&mut world, DT);

        assert!(!world.is_alive(entity));
        assert!(!world.resource::<PhysicsWorld>().unwrap().contains(handle));
        let state = world.resource::<PlatformerState>().unwrap();
        assert_eq!(state.score, n as u32 + 1);
        assert_eq!(state.boxes_remaining, 4 - n);
    }

    assert_eq!(world.count::<Collectible>(), 0);
    assert_eq!(world.resource::<PlatformerState>().unwrap().score, 5);
    // Only the actor's body is left.
    assert_eq!(world.resource::<PhysicsWorld>().unwrap().body_count(), 1);
}
