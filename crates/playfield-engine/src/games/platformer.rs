//! Physics platformer: a player jumping between platforms and collecting
//! falling boxes.
//!
//! System order: input, physics, collectibles, box spawner, animation,
//! render. Input runs before the solver step so a jump leaves the ground in
//! the same frame; collection runs after it so overlaps are judged on the
//! new positions.

use playfield_ecs::component::Component;
use playfield_ecs::entity::EntityId;
use playfield_ecs::scheduler::Scheduler;
use playfield_ecs::system::{Signature, System, SystemContext};
use playfield_ecs::world::World;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::actor::{self, ActorControl};
use crate::animation::{Animation, AnimationSystem};
use crate::color::Color;
use crate::components::{Sprite, Transform};
use crate::config::EngineConfig;
use crate::host::Game;
use crate::input::Keyboard;
use crate::math::Vec2;
use crate::physics::{attach_body, BodyDesc, BodyHandle, PhysicsSystem, PhysicsWorld, RigidBody};
use crate::render::{sprite_command, DrawCommand, DrawList};

use super::UI_LAYER;

const JUMP_KEYS: [&str; 3] = ["space", "up", "w"];
const LEFT_KEYS: [&str; 2] = ["a", "left"];
const RIGHT_KEYS: [&str; 2] = ["d", "right"];

const GROUND_COLOR: Color = Color::from_packed(0x4a4a4a);
const PLATFORM_COLOR: Color = Color::from_packed(0x8b5a2b);
const BOX_COLOR: Color = Color::from_packed(0xff9f1c);

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

/// Platformer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformerConfig {
    pub ground_height: f64,
    pub player_size: f64,
    /// px/s.
    pub jump_speed: f64,
    /// px/s².
    pub move_acceleration: f64,
    /// Seconds.
    pub jump_cooldown: f64,
    /// Air resistance on the player, per second.
    pub player_damping: f64,
    /// Boxes per wave.
    pub box_count: usize,
    pub box_size: f64,
    pub wall_thickness: f64,
    /// Platforms as `[x, height above ground, width, thickness]`.
    pub platforms: Vec<[f64; 4]>,
}

impl Default for PlatformerConfig {
    fn default() -> Self {
        Self {
            ground_height: 100.0,
            player_size: 50.0,
            jump_speed: 720.0,
            move_acceleration: 1500.0,
            jump_cooldown: 0.2,
            player_damping: 1.8,
            box_count: 5,
            box_size: 50.0,
            wall_thickness: 50.0,
            platforms: vec![
                [200.0, 150.0, 150.0, 20.0],
                [500.0, 200.0, 120.0, 20.0],
                [700.0, 100.0, 100.0, 20.0],
                [300.0, 300.0, 80.0, 20.0],
            ],
        }
    }
}

/// Shared platformer state, stored as a world resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformerState {
    pub width: f64,
    pub height: f64,
    pub ground_height: f64,
    pub running: bool,
    pub jumps: u32,
    pub score: u32,
    /// Collectibles currently in play.
    pub boxes_remaining: usize,
}

impl PlatformerState {
    pub fn new(width: f64, height: f64, ground_height: f64) -> Self {
        Self {
            width,
            height,
            ground_height,
            running: true,
            jumps: 0,
            score: 0,
            boxes_remaining: 0,
        }
    }

    /// Center line of the ground slab.
    pub fn ground_y(&self) -> f64 {
        self.height - self.ground_height / 2.0
    }
}

/// Marks the player-controlled entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Player;

impl Component for Player {
    const NAME: &'static str = "player";
}

/// Marks an entity the player can collect by touching it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Collectible;

impl Component for Collectible {
    const NAME: &'static str = "collectible";
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Jump on key press, move while keys are held, tick jump cooldowns.
#[derive(Debug, Default)]
pub struct PlatformerInputSystem;

impl System for PlatformerInputSystem {
    fn name(&self) -> &str {
        "platformer_input"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .require::<Player>()
            .require::<RigidBody>()
            .require::<ActorControl>()
            .optional::<Animation>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()> {
        let Some(keyboard) = ctx.world.resource::<Keyboard>().cloned() else {
            return Ok(());
        };
        let Some((running, width)) = ctx
            .world
            .resource::<PlatformerState>()
            .map(|s| (s.running, s.width))
        else {
            return Ok(());
        };
        let presses = keyboard.drain_presses();
        let players = ctx.entities();

        if running && presses.iter().any(|k| JUMP_KEYS.contains(&k.as_str())) {
            for &p in &players {
                if actor::jump(ctx.world, p)? {
                    if let Some(state) = ctx.world.resource_mut::<PlatformerState>() {
                        state.jumps += 1;
                        tracing::debug!(jumps = state.jumps, "jump");
                    }
                    break;
                }
            }
        }

        let direction = if keyboard.any_down(&RIGHT_KEYS) {
            1.0
        } else if keyboard.any_down(&LEFT_KEYS) {
            -1.0
        } else {
            0.0
        };

        for &p in &players {
            let grounded = ctx.world.get::<RigidBody>(p).is_some_and(|rb| rb.grounded);
            if let Some(control) = ctx.world.get_mut::<ActorControl>(p) {
                control.tick(dt, grounded);
            }
            if running && direction != 0.0 {
                actor::push_horizontal(ctx.world, p, direction, dt, 0.0, width)?;
            }
        }
        Ok(())
    }
}

/// Collect boxes the player touches: detect first, then remove in a batch.
#[derive(Debug, Default)]
pub struct CollectibleSystem;

impl System for CollectibleSystem {
    fn name(&self) -> &str {
        "collectibles"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .require::<Transform>()
            .require::<RigidBody>()
            .require::<Collectible>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f64) -> anyhow::Result<()> {
        let collectibles: Vec<(EntityId, BodyHandle)> = ctx
            .entities()
            .into_iter()
            .filter_map(|e| ctx.world.get::<RigidBody>(e).map(|rb| (e, rb.handle())))
            .collect();

        let collected: Vec<(EntityId, BodyHandle)> = {
            let physics = ctx.world.require_resource_mut::<PhysicsWorld>()?;
            let actors: Vec<_> = physics
                .actors()
                .into_iter()
                .filter_map(|h| physics.bounds(h))
                .collect();
            if actors.is_empty() {
                return Ok(());
            }
            collectibles
                .into_iter()
                .filter(|&(_, h)| {
                    physics
                        .bounds(h)
                        .is_some_and(|b| actors.iter().any(|a| a.overlaps(&b, 0.0)))
                })
                .collect()
        };

        for &(entity, handle) in &collected {
            if let Some(physics) = ctx.world.resource_mut::<PhysicsWorld>() {
                physics.set_sensor(handle, true);
                physics.remove_body(handle);
            }
            ctx.world.remove::<RigidBody>(entity);
            ctx.world.remove::<Collectible>(entity);
            // Nothing left to simulate or collect; drop the husk too.
            ctx.world.despawn(entity)?;
            if let Some(state) = ctx.world.resource_mut::<PlatformerState>() {
                state.score += 1;
                tracing::debug!(%entity, score = state.score, "collected");
            }
        }

        let remaining = ctx.entities().len();
        if let Some(state) = ctx.world.resource_mut::<PlatformerState>() {
            state.boxes_remaining = remaining;
        }
        Ok(())
    }
}

/// Drops a new wave of boxes from above the screen once none remain.
#[derive(Debug)]
pub struct BoxSpawnSystem {
    rng: Pcg32,
    count: usize,
    size: f64,
}

impl BoxSpawnSystem {
    pub fn new(seed: u64, count: usize, size: f64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            count,
            size,
        }
    }
}

impl System for BoxSpawnSystem {
    fn name(&self) -> &str {
        "box_spawn"
    }

    fn signature(&self) -> Signature {
        Signature::new()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f64) -> anyhow::Result<()> {
        let Some(width) = ctx
            .world
            .resource::<PlatformerState>()
            .filter(|s| s.boxes_remaining == 0)
            .map(|s| s.width)
        else {
            return Ok(());
        };

        for _ in 0..self.count {
            let x = self.rng.gen_range(0.0..width);
            let e = ctx.world.spawn();
            let desc = BodyDesc::rect(x, -self.size, self.size, self.size)
                .density(0.5)
                .friction(0.4)
                .restitution(0.7);
            attach_body(ctx.world, e, &desc, false)?;
            ctx.world.insert(e, Collectible)?;
            ctx.world
                .insert(e, Sprite::rect(self.size, self.size, BOX_COLOR).with_layer(1))?;
        }
        if let Some(state) = ctx.world.resource_mut::<PlatformerState>() {
            state.boxes_remaining = self.count;
        }
        tracing::info!(count = self.count, "box wave spawned");
        Ok(())
    }
}

/// Draws every sprite, tinting the player by grounding and applying its
/// animation, then the score line.
#[derive(Debug, Default)]
pub struct PlatformerRenderSystem;

impl System for PlatformerRenderSystem {
    fn name(&self) -> &str {
        "platformer_render"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .require::<Transform>()
            .require::<Sprite>()
            .optional::<Animation>()
            .optional::<RigidBody>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f64) -> anyhow::Result<()> {
        let mut frame = DrawList::new();
        for e in ctx.entities() {
            let world = &*ctx.world;
            let (Some(t), Some(s)) = (world.get::<Transform>(e), world.get::<Sprite>(e)) else {
                continue;
            };
            if !s.visible {
                continue;
            }
            let mut t = *t;
            let mut s = *s;
            if let Some(anim) = world.get::<Animation>(e) {
                t.scale = Vec2::new(t.scale.x * anim.scale().x, t.scale.y * anim.scale().y);
                t.rotation += anim.rotation();
            }
            if world.has::<Player>(e) {
                let grounded = world.get::<RigidBody>(e).is_some_and(|rb| rb.grounded);
                s.color = if grounded { Color::GREEN } else { Color::YELLOW };
            }
            frame.push(s.layer, sprite_command(&t, &s));
        }

        if let Some(state) = ctx.world.resource::<PlatformerState>() {
            frame.push(
                UI_LAYER,
                DrawCommand::Text {
                    origin: Vec2::new(10.0, 10.0),
                    text: format!("Score: {}  Jumps: {}", state.score, state.jumps),
                    size: 14.0,
                    color: Color::WHITE,
                },
            );
        }

        match ctx.world.resource_mut::<DrawList>() {
            Some(list) => *list = frame,
            None => {
                ctx.world.insert_resource(frame);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Entities of an assembled level.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub player: EntityId,
    pub ground: EntityId,
    pub platforms: Vec<EntityId>,
    /// Invisible boundary walls; bodies without entities.
    pub walls: [BodyHandle; 2],
}

/// The platformer game mode.
#[derive(Debug, Default)]
pub struct Platformer {
    config: PlatformerConfig,
    level: Option<Level>,
}

impl Platformer {
    pub fn new(config: PlatformerConfig) -> Self {
        Self { config, level: None }
    }

    pub fn level(&self) -> Option<&Level> {
        self.level.as_ref()
    }

    /// Build the level in a `width` x `height` field and register the
    /// systems. Inserts a [`PhysicsWorld`] if the world has none.
    pub fn assemble(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        width: f64,
        height: f64,
        engine: &EngineConfig,
    ) -> anyhow::Result<Level> {
        let cfg = &self.config;
        if !world.has_resource::<PhysicsWorld>() {
            world.insert_resource(PhysicsWorld::new(&engine.physics)?);
        }
        let state = PlatformerState::new(width, height, cfg.ground_height);
        let ground_y = state.ground_y();
        world.insert_resource(state);

        scheduler.register(world, PlatformerInputSystem);
        scheduler.register(world, PhysicsSystem::new(&engine.physics));
        scheduler.register(world, CollectibleSystem);
        scheduler.register(world, BoxSpawnSystem::new(engine.seed, cfg.box_count, cfg.box_size));
        scheduler.register(world, AnimationSystem);
        scheduler.register(world, PlatformerRenderSystem);

        let ground = world.spawn_named("ground");
        let desc = BodyDesc::rect(width / 2.0, ground_y, width, cfg.ground_height)
            .fixed()
            .friction(0.8)
            .restitution(0.2);
        attach_body(world, ground, &desc, false)?;
        world.insert(ground, Sprite::rect(width, cfg.ground_height, GROUND_COLOR))?;

        let top = height - cfg.ground_height;
        let mut platforms = Vec::with_capacity(cfg.platforms.len());
        for (i, &[x, above, w, h]) in cfg.platforms.iter().enumerate() {
            let e = world.spawn_named(&format!("platform_{i}"));
            let desc = BodyDesc::rect(x, ground_y - above, w, h)
                .fixed()
                .friction(0.8)
                .restitution(0.1);
            attach_body(world, e, &desc, false)?;
            world.insert(e, Sprite::rect(w, h, PLATFORM_COLOR))?;
            platforms.push(e);
        }

        let size = cfg.player_size;
        let player = world.spawn_named("player");
        let desc = BodyDesc::rect(width / 2.0, ground_y - 100.0, size, size)
            .density(0.1)
            .friction(0.1)
            .restitution(0.1)
            .damping(cfg.player_damping)
            .lock_rotation();
        attach_body(world, player, &desc, true)?;
        world.insert(player, Player)?;
        world.insert(
            player,
            ActorControl::new(cfg.jump_speed, cfg.move_acceleration).with_cooldown(cfg.jump_cooldown),
        )?;
        world.insert(player, Animation::new())?;
        world.insert(player, Sprite::rect(size, size, Color::YELLOW).with_layer(2))?;

        let t = cfg.wall_thickness;
        let physics = world.require_resource_mut::<PhysicsWorld>()?;
        let walls = [
            physics.add_body(&BodyDesc::rect(-t / 2.0, height / 2.0, t, height).fixed(), None, false),
            physics.add_body(
                &BodyDesc::rect(width + t / 2.0, height / 2.0, t, height).fixed(),
                None,
                false,
            ),
        ];

        tracing::info!(width, height, ground_top = top, platforms = platforms.len(), "platformer assembled");
        let level = Level {
            player,
            ground,
            platforms,
            walls,
        };
        self.level = Some(level.clone());
        Ok(level)
    }

    /// Tear the level down and build it again with fresh physics.
    pub fn reset(&mut self, world: &mut World, scheduler: &mut Scheduler) -> anyhow::Result<Level> {
        let engine = world.resource::<EngineConfig>().cloned().unwrap_or_default();
        let (width, height) = world
            .resource::<PlatformerState>()
            .map_or((engine.host.width, engine.host.height), |s| (s.width, s.height));
        scheduler.clear(world);
        world.clear();
        world.remove_resource::<PlatformerState>();
        world.insert_resource(PhysicsWorld::new(&engine.physics)?);
        self.level = None;
        self.assemble(world, scheduler, width, height, &engine)
    }
}

impl Game for Platformer {
    fn name(&self) -> &str {
        "platformer"
    }

    fn initialize(&mut self, world: &mut World, scheduler: &mut Scheduler) -> anyhow::Result<()> {
        let engine = world.resource::<EngineConfig>().cloned().unwrap_or_default();
        let (width, height) = (engine.host.width, engine.host.height);
        self.assemble(world, scheduler, width, height, &engine)?;
        Ok(())
    }
}
