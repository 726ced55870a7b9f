//! Playfield Engine -- frame loop, physics integration and game modes on top
//! of [`playfield_ecs`].
//!
//! A [`Host`](host::Host) drives one run: it ticks the
//! [`FrameClock`](clock::FrameClock), drains keyboard input, runs the
//! scheduler and presents the frame's draw list on a
//! [`RenderSurface`](render::RenderSurface). The physics layer wraps rapier2d,
//! steps it with a fixed timestep and turns contact events into grounded and
//! airborne transitions for actors.
//!
//! # Quick Start
//!
//! ```
//! use playfield_engine::prelude::*;
//!
//! let time = ManualTime::new();
//! let surface = HeadlessSurface::new();
//! let mut host = Host::with_time_source(
//!     EngineConfig::default(),
//!     Box::new(surface.clone()),
//!     Box::new(time.clone()),
//! );
//! host.start(Box::new(Platformer::default())).unwrap();
//!
//! for _ in 0..30 {
//!     time.advance(16.0);
//!     host.frame().unwrap();
//! }
//! assert_eq!(surface.presented(), 30);
//! assert_eq!(host.world().resource::<PlatformerState>().unwrap().boxes_remaining, 5);
//! host.shutdown();
//! ```

#![deny(unsafe_code)]

pub mod actor;
pub mod animation;
pub mod clock;
pub mod color;
pub mod components;
pub mod config;
pub mod games;
pub mod host;
pub mod input;
pub mod logging;
pub mod math;
pub mod physics;
pub mod render;

/// Re-export the ECS crate for convenience.
pub use playfield_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that stop a run from starting or continuing.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The rendering surface could not be created.
    #[error("rendering surface failed to start: {0}")]
    SurfaceInit(#[from] render::SurfaceError),

    /// The physics solver could not be created.
    #[error("physics solver failed to start: {0}")]
    SolverInit(String),

    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// The game's initialize callback failed.
    #[error("game failed to initialize: {0}")]
    GameInit(String),

    /// `start` was called on a running host.
    #[error("host is already running")]
    AlreadyRunning,

    /// A frame was requested from a host that is not running.
    #[error("host is not running")]
    NotRunning,

    #[error(transparent)]
    Ecs(#[from] playfield_ecs::EcsError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use playfield_ecs::prelude::*;

    pub use crate::actor::{jump, push_horizontal, ActorControl};
    pub use crate::animation::{Animation, AnimationKind, AnimationSystem};
    pub use crate::clock::{FrameClock, ManualTime, MonotonicTime, TimeSource};
    pub use crate::color::Color;
    pub use crate::components::{Shape, Sprite, Transform};
    pub use crate::config::{ClockConfig, ConfigError, EngineConfig, HostConfig, PhysicsConfig};
    pub use crate::games::platformer::{Collectible, Player};
    pub use crate::games::rhythm::{HitLine, Lane, Note};
    pub use crate::games::{Platformer, PlatformerConfig, PlatformerState, Rhythm, RhythmConfig, RhythmState};
    pub use crate::host::{Callbacks, Game, Host, LoopHandle};
    pub use crate::input::{KeyEvent, KeyState, Keyboard};
    pub use crate::logging::init_tracing;
    pub use crate::math::Vec2;
    pub use crate::physics::{
        attach_body, BodyDesc, BodyHandle, BodyShape, BodySnapshot, Bounds, ContactEvent,
        GroundingPolicy, PhysicsSystem, PhysicsWorld, RigidBody,
    };
    pub use crate::render::{DrawCommand, DrawList, HeadlessSurface, RenderSurface, SurfaceError};
    pub use crate::EngineError;
}
