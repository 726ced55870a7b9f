//! Rhythm game: notes fall down five lanes and the player presses `1`–`5`
//! as they cross the hit line.
//!
//! System order: spawn, note movement, input, cleanup, render.

use playfield_ecs::component::Component;
use playfield_ecs::entity::EntityId;
use playfield_ecs::scheduler::Scheduler;
use playfield_ecs::system::{Signature, System, SystemContext};
use playfield_ecs::world::World;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::components::{Sprite, Transform};
use crate::config::EngineConfig;
use crate::host::Game;
use crate::input::Keyboard;
use crate::math::Vec2;
use crate::render::{draw_sprites, DrawCommand, DrawList};

use super::UI_LAYER;

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

/// Rhythm tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    pub lanes: usize,
    /// px/s.
    pub note_speed: f64,
    pub note_size: f64,
    pub spawn_interval_ms: f64,
    /// Distance of the hit line above the bottom edge.
    pub hit_line_offset: f64,
    pub hit_line_height: f64,
    /// How far a note's center may be from the hit line and still count.
    pub hit_tolerance: f64,
    /// Lane backgrounds, alternating.
    pub lane_colors: Vec<Color>,
    /// Note colors, cycled by lane.
    pub note_colors: Vec<Color>,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            lanes: 5,
            note_speed: 50.0,
            note_size: 50.0,
            spawn_interval_ms: 6000.0,
            hit_line_offset: 100.0,
            hit_line_height: 5.0,
            hit_tolerance: 25.0,
            lane_colors: vec![Color::from_packed(0x2a2a2a), Color::from_packed(0x1a1a1a)],
            note_colors: vec![Color::RED, Color::BLUE, Color::GREEN, Color::YELLOW, Color::MAGENTA],
        }
    }
}

/// Shared rhythm state, stored as a world resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RhythmState {
    pub score: u32,
    pub spawn_timer_ms: f64,
    pub spawn_interval_ms: f64,
    pub width: f64,
    pub height: f64,
    pub lanes: usize,
    pub lane_width: f64,
    pub hit_line_y: f64,
    pub running: bool,
    /// The hit-line entity notes are judged against.
    pub hit_line: Option<EntityId>,
}

impl RhythmState {
    pub fn new(width: f64, height: f64, config: &RhythmConfig) -> Self {
        let lanes = config.lanes.max(1);
        Self {
            score: 0,
            spawn_timer_ms: 0.0,
            spawn_interval_ms: config.spawn_interval_ms,
            width,
            height,
            lanes,
            lane_width: width / lanes as f64,
            hit_line_y: height - config.hit_line_offset,
            running: true,
            hit_line: None,
        }
    }

    /// Left edge of lane `index`.
    pub fn lane_x(&self, index: usize) -> f64 {
        index as f64 * self.lane_width
    }

    pub fn lane_center(&self, index: usize) -> f64 {
        self.lane_x(index) + self.lane_width / 2.0
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// A lane column and the digit key that hits notes in it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lane {
    pub index: usize,
    pub key: u32,
}

impl Component for Lane {
    const NAME: &'static str = "lane";
}

/// The line notes must cross when their key is pressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitLine {
    pub y: f64,
    pub tolerance: f64,
}

impl Component for HitLine {
    const NAME: &'static str = "hit_line";
}

impl HitLine {
    /// Distance between a note's center and the line.
    pub fn distance(&self, note_center_y: f64) -> f64 {
        (note_center_y - self.y).abs()
    }

    pub fn in_zone(&self, note_center_y: f64) -> bool {
        self.distance(note_center_y) <= self.tolerance
    }
}

/// A falling note. Its transform is the note's center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub lane: usize,
    /// px/s.
    pub speed: f64,
    pub size: f64,
    pub active: bool,
    pub hit: bool,
}

impl Component for Note {
    const NAME: &'static str = "note";
}

impl Note {
    pub fn new(lane: usize, speed: f64, size: f64) -> Self {
        Self {
            lane,
            speed,
            size,
            active: true,
            hit: false,
        }
    }

    pub fn mark_hit(&mut self) {
        self.hit = true;
        self.active = false;
    }

    pub fn mark_missed(&mut self) {
        self.active = false;
    }
}

/// Spawn a note at the top of `lane`, just above the screen.
pub fn spawn_note(world: &mut World, lane: usize, config: &RhythmConfig) -> anyhow::Result<EntityId> {
    let center = world
        .resource::<RhythmState>()
        .map(|s| s.lane_center(lane))
        .ok_or_else(|| anyhow::anyhow!("rhythm state missing"))?;
    let color = if config.note_colors.is_empty() {
        Color::WHITE
    } else {
        config.note_colors[lane % config.note_colors.len()]
    };
    let size = config.note_size;
    let e = world.spawn();
    world.insert(e, Transform::at(center, -size / 2.0))?;
    world.insert(e, Note::new(lane, config.note_speed, size))?;
    world.insert(e, Sprite::rect(size, size, color).with_layer(2))?;
    Ok(e)
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Spawns a note in a random lane every spawn interval.
#[derive(Debug)]
pub struct RhythmSpawnSystem {
    rng: Pcg32,
    config: RhythmConfig,
}

impl RhythmSpawnSystem {
    pub fn new(seed: u64, config: RhythmConfig) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            config,
        }
    }
}

impl System for RhythmSpawnSystem {
    fn name(&self) -> &str {
        "rhythm_spawn"
    }

    fn signature(&self) -> Signature {
        Signature::new()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()> {
        let Some(state) = ctx.world.resource_mut::<RhythmState>() else {
            return Ok(());
        };
        if !state.running {
            return Ok(());
        }
        state.spawn_timer_ms += dt * 1000.0;
        if state.spawn_timer_ms < state.spawn_interval_ms {
            return Ok(());
        }
        state.spawn_timer_ms = 0.0;
        let lane = self.rng.gen_range(0..state.lanes);
        let note = spawn_note(ctx.world, lane, &self.config)?;
        tracing::debug!(entity = %note, lane, "note spawned");
        Ok(())
    }
}

/// Moves notes down and marks the ones that fell off the screen as missed.
#[derive(Debug, Default)]
pub struct RhythmNoteSystem;

impl System for RhythmNoteSystem {
    fn name(&self) -> &str {
        "rhythm_notes"
    }

    fn signature(&self) -> Signature {
        Signature::new().require::<Transform>().require::<Note>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()> {
        let height = ctx.world.resource::<RhythmState>().map_or(f64::INFINITY, |s| s.height);
        for e in ctx.entities() {
            let Some(note) = ctx.world.get::<Note>(e).copied().filter(|n| n.active) else {
                continue;
            };
            let Some(t) = ctx.world.get_mut::<Transform>(e) else {
                continue;
            };
            t.translate(Vec2::new(0.0, note.speed * dt));
            let top = t.position.y - note.size / 2.0;
            if top > height {
                if let Some(n) = ctx.world.get_mut::<Note>(e) {
                    n.mark_missed();
                }
                tracing::debug!(entity = %e, lane = note.lane, "note missed");
            }
        }
        Ok(())
    }
}

/// Hits the in-zone note closest to the line in the lane of each pressed
/// digit key.
#[derive(Debug, Default)]
pub struct RhythmInputSystem;

impl System for RhythmInputSystem {
    fn name(&self) -> &str {
        "rhythm_input"
    }

    fn signature(&self) -> Signature {
        Signature::new().require::<Transform>().require::<Note>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f64) -> anyhow::Result<()> {
        let Some(keyboard) = ctx.world.resource::<Keyboard>().cloned() else {
            return Ok(());
        };
        let presses = keyboard.drain_presses();
        if presses.is_empty() {
            return Ok(());
        }
        let hit_line = ctx.world.resource::<RhythmState>().and_then(|s| s.hit_line);
        let Some(line) = hit_line.and_then(|e| ctx.world.get::<HitLine>(e)).copied() else {
            return Ok(());
        };

        for key in presses {
            let Some(lane) = lane_for_key(ctx.world, &key) else {
                continue;
            };
            let target = ctx
                .entities()
                .into_iter()
                .filter_map(|e| {
                    let note = ctx.world.get::<Note>(e)?;
                    let t = ctx.world.get::<Transform>(e)?;
                    (note.active && note.lane == lane && line.in_zone(t.position.y))
                        .then(|| (e, line.distance(t.position.y)))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));

            match target {
                Some((e, _)) => {
                    if let Some(note) = ctx.world.get_mut::<Note>(e) {
                        note.mark_hit();
                    }
                    if let Some(state) = ctx.world.resource_mut::<RhythmState>() {
                        state.score += 1;
                        tracing::info!(score = state.score, lane = lane + 1, "hit");
                    }
                }
                None => tracing::debug!(lane = lane + 1, "miss"),
            }
        }
        Ok(())
    }
}

/// Index of the lane whose [`Lane::key`] is the pressed digit.
fn lane_for_key(world: &World, key: &str) -> Option<usize> {
    let mut chars = key.chars();
    let digit = match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_digit(10)?,
        _ => return None,
    };
    world
        .entities()
        .filter_map(|e| world.get::<Lane>(e.id))
        .find(|lane| lane.key == digit)
        .map(|lane| lane.index)
}

/// Despawns notes that were hit or missed.
#[derive(Debug, Default)]
pub struct RhythmCleanupSystem;

impl System for RhythmCleanupSystem {
    fn name(&self) -> &str {
        "rhythm_cleanup"
    }

    fn signature(&self) -> Signature {
        Signature::new().require::<Note>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f64) -> anyhow::Result<()> {
        let done: Vec<EntityId> = ctx
            .entities()
            .into_iter()
            .filter(|&e| ctx.world.get::<Note>(e).is_some_and(|n| !n.active))
            .collect();
        for e in done {
            ctx.world.despawn(e)?;
        }
        Ok(())
    }
}

/// Draws lanes, the hit line and notes, then the score.
#[derive(Debug, Default)]
pub struct RhythmRenderSystem;

impl System for RhythmRenderSystem {
    fn name(&self) -> &str {
        "rhythm_render"
    }

    fn signature(&self) -> Signature {
        Signature::new().require::<Transform>().require::<Sprite>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f64) -> anyhow::Result<()> {
        let mut frame = DrawList::new();
        draw_sprites(ctx.world, &ctx.entities(), &mut frame);
        let score = ctx.world.resource::<RhythmState>().map_or(0, |s| s.score);
        frame.push(
            UI_LAYER,
            DrawCommand::Text {
                origin: Vec2::new(10.0, 10.0),
                text: format!("Score: {score}"),
                size: 14.0,
                color: Color::WHITE,
            },
        );
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

/// The rhythm game mode.
#[derive(Debug, Default)]
pub struct Rhythm {
    config: RhythmConfig,
}

impl Rhythm {
    pub fn new(config: RhythmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RhythmConfig {
        &self.config
    }

    /// Build lanes and the hit line in a `width` x `height` field and
    /// register the systems. Returns the hit-line entity.
    pub fn assemble(
        &self,
        world: &mut World,
        scheduler: &mut Scheduler,
        width: f64,
        height: f64,
        seed: u64,
    ) -> anyhow::Result<EntityId> {
        let cfg = &self.config;
        let mut state = RhythmState::new(width, height, cfg);

        for i in 0..state.lanes {
            let e = world.spawn_named(&format!("lane_{i}"));
            let color = if cfg.lane_colors.is_empty() {
                Color::BLACK
            } else {
                cfg.lane_colors[i % cfg.lane_colors.len()]
            };
            world.insert(e, Lane { index: i, key: i as u32 + 1 })?;
            world.insert(e, Transform::at(state.lane_center(i), height / 2.0))?;
            world.insert(e, Sprite::rect(state.lane_width, height, color))?;
        }

        let hit_line = world.spawn_named("hit_line");
        world.insert(
            hit_line,
            HitLine {
                y: state.hit_line_y,
                tolerance: cfg.hit_tolerance,
            },
        )?;
        world.insert(hit_line, Transform::at(width / 2.0, state.hit_line_y))?;
        world.insert(
            hit_line,
            Sprite::rect(width, cfg.hit_line_height, Color::WHITE).with_layer(1),
        )?;
        state.hit_line = Some(hit_line);
        world.insert_resource(state);

        scheduler.register(world, RhythmSpawnSystem::new(seed, cfg.clone()));
        scheduler.register(world, RhythmNoteSystem);
        scheduler.register(world, RhythmInputSystem);
        scheduler.register(world, RhythmCleanupSystem);
        scheduler.register(world, RhythmRenderSystem);
        tracing::info!(width, height, lanes = cfg.lanes, "rhythm assembled");
        Ok(hit_line)
    }
}

impl Game for Rhythm {
    fn name(&self) -> &str {
        "rhythm"
    }

    fn initialize(&mut self, world: &mut World, scheduler: &mut Scheduler) -> anyhow::Result<()> {
        let engine = world.resource::<EngineConfig>().cloned().unwrap_or_default();
        self.assemble(world, scheduler, engine.host.width, engine.host.height, engine.seed)?;
        Ok(())
    }
}
