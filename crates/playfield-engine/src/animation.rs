//! Procedural squash/stretch animations.
//!
//! An [`Animation`] component plays at most one [`AnimationKind`] at a time;
//! starting a new one replaces the current one. The render pass multiplies a
//! sprite's size by [`Animation::scale`] and adds [`Animation::rotation`].

use playfield_ecs::component::Component;
use playfield_ecs::system::{Signature, System, SystemContext};

use crate::math::Vec2;

use std::f64::consts::PI;

/// The available effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationKind {
    /// Squash on touchdown, bounce back, settle.
    Landing,
    /// A short uniform pop.
    Jump,
    /// Decaying wobble with a little rotation.
    Bounce,
}

impl AnimationKind {
    /// Default duration in milliseconds.
    pub fn duration_ms(self) -> f64 {
        match self {
            AnimationKind::Landing => 300.0,
            AnimationKind::Jump => 200.0,
            AnimationKind::Bounce => 400.0,
        }
    }

    /// Scale and rotation at `progress` in `[0, 1)`.
    pub fn sample(self, progress: f64) -> (Vec2, f64) {
        let p = progress.clamp(0.0, 1.0);
        match self {
            AnimationKind::Landing => {
                if p < 0.3 {
                    let q = p / 0.3;
                    (Vec2::new(1.0 + 0.3 * q, 1.0 - 0.3 * q), 0.0)
                } else if p < 0.7 {
                    let q = (p - 0.3) / 0.4;
                    let s = 1.0 + (q * PI).sin() * 0.2;
                    (Vec2::new(s, s), 0.0)
                } else {
                    let q = (p - 0.7) / 0.3;
                    let s = 1.0 + 0.1 * (1.0 - q);
                    (Vec2::new(s, s), 0.0)
                }
            }
            AnimationKind::Jump => {
                let s = 1.0 + 0.1 * (p * PI).sin();
                (Vec2::new(s, s), 0.0)
            }
            AnimationKind::Bounce => {
                let decay = 1.0 - p;
                let s = 1.0 + (p * PI * 3.0).sin() * decay * 0.3;
                let r = (p * PI * 2.0).sin() * decay * 0.1;
                (Vec2::new(s, s), r)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Playing {
    kind: AnimationKind,
    duration_ms: f64,
    elapsed_ms: f64,
}

/// Current effect of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    playing: Option<Playing>,
    scale: Vec2,
    rotation: f64,
    started: u64,
}

impl Component for Animation {
    const NAME: &'static str = "animation";
}

impl Default for Animation {
    fn default() -> Self {
        Self::new()
    }
}

impl Animation {
    pub fn new() -> Self {
        Self {
            playing: None,
            scale: Vec2::ONE,
            rotation: 0.0,
            started: 0,
        }
    }

    /// Start `kind` with its default duration, replacing whatever plays.
    pub fn start(&mut self, kind: AnimationKind) {
        self.start_for(kind, kind.duration_ms());
    }

    pub fn start_for(&mut self, kind: AnimationKind, duration_ms: f64) {
        self.playing = Some(Playing {
            kind,
            duration_ms: duration_ms.max(f64::EPSILON),
            elapsed_ms: 0.0,
        });
        self.scale = Vec2::ONE;
        self.rotation = 0.0;
        self.started += 1;
        tracing::trace!(?kind, duration_ms, "animation started");
    }

    /// Advance by `dt` seconds. Finishing restores the neutral pose.
    pub fn update(&mut self, dt: f64) {
        let Some(playing) = self.playing.as_mut() else {
            return;
        };
        playing.elapsed_ms += dt * 1000.0;
        let progress = playing.elapsed_ms / playing.duration_ms;
        if progress >= 1.0 {
            self.playing = None;
            self.scale = Vec2::ONE;
            self.rotation = 0.0;
            return;
        }
        let (scale, rotation) = playing.kind.sample(progress);
        self.scale = scale;
        self.rotation = rotation;
    }

    pub fn is_animating(&self) -> bool {
        self.playing.is_some()
    }

    /// The effect currently playing.
    pub fn kind(&self) -> Option<AnimationKind> {
        self.playing.map(|p| p.kind)
    }

    /// Progress of the current effect in `[0, 1)`, 0 when idle.
    pub fn progress(&self) -> f64 {
        self.playing
            .map_or(0.0, |p| p.elapsed_ms / p.duration_ms)
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Number of effects started over the component's life.
    pub fn started(&self) -> u64 {
        self.started
    }
}

/// Advances every [`Animation`].
#[derive(Debug, Default)]
pub struct AnimationSystem;

impl System for AnimationSystem {
    fn name(&self) -> &str {
        "animation"
    }

    fn signature(&self) -> Signature {
        Signature::new().require::<Animation>()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f64) -> anyhow::Result<()> {
        for e in ctx.entities() {
            if let Some(anim) = ctx.world.get_mut::<Animation>(e) {
                anim.update(dt);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playfield_ecs::scheduler::Scheduler;
    use playfield_ecs::world::World;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn landing_squashes_then_settles() {
        let (s, _) = AnimationKind::Landing.sample(0.15);
        assert!(close(s.x, 1.15) && close(s.y, 0.85));
        let (s, _) = AnimationKind::Landing.sample(0.5);
        assert!(close(s.x, 1.2) && close(s.y, 1.2));
        let (s, _) = AnimationKind::Landing.sample(0.85);
        assert!(close(s.x, 1.05));
    }

    #[test]
    fn bounce_rotates_and_decays() {
        let (_, r) = AnimationKind::Bounce.sample(0.25);
        assert!(r > 0.0);
        let (s, r) = AnimationKind::Bounce.sample(0.999_999);
        assert!((s.x - 1.0).abs() < 1e-4 && r.abs() < 1e-4);
    }

    #[test]
    fn update_runs_to_completion() {
        let mut a = Animation::new();
        a.start(AnimationKind::Jump);
        a.update(0.1);
        assert!(a.is_animating());
        assert!(close(a.progress(), 0.5));
        assert!(close(a.scale().x, 1.1));
        a.update(0.1);
        assert!(!a.is_animating());
        assert_eq!(a.scale(), Vec2::ONE);
        assert_eq!(a.started(), 1);
    }

    #[test]
    fn restarting_replaces_current() {
        let mut a = Animation::new();
        a.start(AnimationKind::Bounce);
        a.update(0.1);
        a.start(AnimationKind::Landing);
        assert_eq!(a.kind(), Some(AnimationKind::Landing));
        assert_eq!(a.progress(), 0.0);
        assert_eq!(a.started(), 2);
    }

    #[test]
    fn system_advances_all_animations() {
        let mut world = World::new();
        let mut scheduler = Scheduler::new();
        scheduler.register(&mut world, AnimationSystem);
        let e = world.spawn();
        world.insert(e, Animation::new()).unwrap().start(AnimationKind::Landing);
        scheduler.tick(&mut world, 0.15);
        let a = world.get::<Animation>(e).unwrap();
        assert!(close(a.progress(), 0.5));
    }
}
