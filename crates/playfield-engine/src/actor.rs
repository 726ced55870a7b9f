//! Player-controlled actors: jump gating and horizontal movement.
//!
//! [`ActorControl`] holds the tuning and the jump gate. The [`jump`] and
//! [`push_horizontal`] actions combine it with the entity's [`RigidBody`]
//! and the [`PhysicsWorld`] resource; input systems call them.

use playfield_ecs::component::Component;
use playfield_ecs::entity::EntityId;
use playfield_ecs::world::World;
use playfield_ecs::EcsError;

use crate::animation::{Animation, AnimationKind};
use crate::math::Vec2;
use crate::physics::{PhysicsWorld, RigidBody};

/// Jump and movement tuning plus the jump gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorControl {
    /// Upward speed a jump adds, px/s.
    pub jump_speed: f64,
    /// Horizontal acceleration while a direction is held, px/s².
    pub move_acceleration: f64,
    /// Minimum time between jumps, seconds.
    pub cooldown: f64,
    cooldown_left: f64,
    can_jump: bool,
}

impl Component for ActorControl {
    const NAME: &'static str = "actor_control";
}

impl Default for ActorControl {
    fn default() -> Self {
        Self::new(720.0, 1500.0)
    }
}

impl ActorControl {
    pub fn new(jump_speed: f64, move_acceleration: f64) -> Self {
        Self {
            jump_speed,
            move_acceleration,
            cooldown: 0.2,
            cooldown_left: 0.0,
            can_jump: true,
        }
    }

    pub fn with_cooldown(mut self, seconds: f64) -> Self {
        self.cooldown = seconds;
        self
    }

    /// Gate open and cooldown elapsed. Grounding is checked separately.
    pub fn can_jump(&self) -> bool {
        self.can_jump && self.cooldown_left <= 0.0
    }

    pub fn cooldown_remaining(&self) -> f64 {
        self.cooldown_left
    }

    /// Consume a jump if `grounded` and the gate allows it.
    pub fn try_jump(&mut self, grounded: bool) -> bool {
        if !grounded || !self.can_jump() {
            return false;
        }
        self.can_jump = false;
        self.cooldown_left = self.cooldown;
        true
    }

    /// Count down the cooldown and reopen the gate once the actor is
    /// grounded with the cooldown elapsed.
    pub fn tick(&mut self, dt: f64, grounded: bool) {
        if self.cooldown_left > 0.0 {
            self.cooldown_left = (self.cooldown_left - dt).max(0.0);
        }
        if grounded && !self.can_jump && self.cooldown_left <= 0.0 {
            self.can_jump = true;
        }
    }
}

/// Make `entity` jump if it is grounded and its gate allows it. Starts the
/// jump animation when the entity has one. Returns whether it jumped.
pub fn jump(world: &mut World, entity: EntityId) -> Result<bool, EcsError> {
    if !world.is_alive(entity) {
        return Err(EcsError::DeadEntity { entity });
    }
    let Some((grounded, handle)) = world.get::<RigidBody>(entity).map(|rb| (rb.grounded, rb.handle())) else {
        return Ok(false);
    };
    let Some(control) = world.get_mut::<ActorControl>(entity) else {
        return Ok(false);
    };
    if !control.try_jump(grounded) {
        tracing::trace!(%entity, grounded, "jump refused");
        return Ok(false);
    }
    let speed = control.jump_speed;

    world
        .require_resource_mut::<PhysicsWorld>()?
        .apply_velocity_change(handle, Vec2::new(0.0, -speed));

    if let Some(anim) = world.get_mut::<Animation>(entity) {
        anim.start(AnimationKind::Jump);
    }
    tracing::debug!(%entity, "jump");
    Ok(true)
}

/// Accelerate `entity` horizontally for `dt` seconds in `direction` (sign
/// only). Refused when the actor already touches the `[min_x, max_x]`
/// boundary it is pushing toward. Returns whether a force was applied.
pub fn push_horizontal(
    world: &mut World,
    entity: EntityId,
    direction: f64,
    dt: f64,
    min_x: f64,
    max_x: f64,
) -> Result<bool, EcsError> {
    if direction == 0.0 {
        return Ok(false);
    }
    let Some(handle) = world.get::<RigidBody>(entity).map(RigidBody::handle) else {
        return Ok(false);
    };
    let Some(accel) = world.get::<ActorControl>(entity).map(|c| c.move_acceleration) else {
        return Ok(false);
    };
    let physics = world.require_resource_mut::<PhysicsWorld>()?;
    let Some(body) = physics.snapshot(handle) else {
        return Ok(false);
    };
    let half_width = body.bounds.width() / 2.0;
    let x = body.position.x;
    let allowed = (direction < 0.0 && x > min_x + half_width)
        || (direction > 0.0 && x < max_x - half_width);
    if !allowed {
        return Ok(false);
    }
    physics.apply_velocity_change(handle, Vec2::new(direction.signum() * accel * dt, 0.0));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::physics::{attach_body, BodyDesc};

    #[test]
    fn jump_gate() {
        let mut c = ActorControl::default();
        assert!(!c.try_jump(false));
        assert!(c.try_jump(true));
        assert!(!c.try_jump(true));
        c.tick(0.1, true);
        assert!(!c.try_jump(true));
        c.tick(0.1, false);
        assert!(!c.can_jump());
        c.tick(0.016, true);
        assert!(c.try_jump(true));
    }

    #[test]
    fn gate_stays_closed_while_airborne() {
        let mut c = ActorControl::default();
        assert!(c.try_jump(true));
        c.tick(1.0, false);
        assert_eq!(c.cooldown_remaining(), 0.0);
        assert!(!c.can_jump());
        c.tick(0.0, true);
        assert!(c.can_jump());
    }

    fn zero_g_world() -> World {
        let cfg = PhysicsConfig {
            gravity: [0.0, 0.0],
            ..PhysicsConfig::default()
        };
        let mut world = World::new();
        world.insert_resource(PhysicsWorld::new(&cfg).unwrap());
        world
    }

    #[test]
    fn boundary_clamp_blocks_only_outward_pushes() {
        let mut world = zero_g_world();
        let e = world.spawn();
        attach_body(&mut world, e, &BodyDesc::rect(25.0, 100.0, 50.0, 50.0), true).unwrap();
        world.insert(e, ActorControl::default()).unwrap();

        assert!(!push_horizontal(&mut world, e, -1.0, 0.016, 0.0, 800.0).unwrap());
        assert!(push_horizontal(&mut world, e, 1.0, 0.016, 0.0, 800.0).unwrap());
        assert!(!push_horizontal(&mut world, e, 0.0, 0.016, 0.0, 800.0).unwrap());
    }

    #[test]
    fn jump_requires_ground() {
        let mut world = zero_g_world();
        let e = world.spawn();
        let h = attach_body(&mut world, e, &BodyDesc::rect(100.0, 100.0, 50.0, 50.0), true).unwrap();
        world.insert(e, ActorControl::default()).unwrap();
        world.insert(e, Animation::new()).unwrap();

        assert!(!jump(&mut world, e).unwrap());
        world.get_mut::<RigidBody>(e).unwrap().grounded = true;
        assert!(jump(&mut world, e).unwrap());
        assert_eq!(world.get::<Animation>(e).unwrap().kind(), Some(AnimationKind::Jump));

        world.resource_mut::<PhysicsWorld>().unwrap().step();
        let v = world.resource::<PhysicsWorld>().unwrap().snapshot(h).unwrap().velocity;
        assert!((v.y + 720.0).abs() < 1.0);
    }
}
