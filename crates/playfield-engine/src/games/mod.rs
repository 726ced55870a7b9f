//! Game-mode assemblers.
//!
//! Each mode builds its entities and registers its systems against a world
//! and scheduler, and implements [`Game`](crate::host::Game) so a
//! [`Host`](crate::host::Host) can drive it.

pub mod platformer;
pub mod rhythm;

pub use platformer::{Platformer, PlatformerConfig, PlatformerState};
pub use rhythm::{Rhythm, RhythmConfig, RhythmState};

/// Layer for score and other overlay text.
pub(crate) const UI_LAYER: i32 = 100;
