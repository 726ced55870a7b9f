//! Rendering collaborator contract.
//!
//! The engine never draws. Render systems translate [`Transform`] and
//! [`Sprite`] data into a [`DrawList`] resource once per frame, after the
//! simulation systems; the host hands that list to a [`RenderSurface`] to
//! present. [`HeadlessSurface`] records frames instead of drawing, which is
//! enough for tests and for running games without a display.

use std::cell::RefCell;
use std::rc::Rc;

use playfield_ecs::entity::EntityId;
use playfield_ecs::world::World;

use crate::color::Color;
use crate::components::{Shape, Sprite, Transform};
use crate::math::Vec2;

// ---------------------------------------------------------------------------
// SurfaceError
// ---------------------------------------------------------------------------

/// Failures reported by a rendering surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    /// The surface could not be created or sized.
    #[error("surface initialization failed: {0}")]
    Init(String),
    /// A frame could not be presented.
    #[error("failed to present frame: {0}")]
    Present(String),
}

// ---------------------------------------------------------------------------
// DrawCommand / DrawList
// ---------------------------------------------------------------------------

/// One drawable primitive. Positions are centers in screen space, except
/// text, which is anchored at its top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        center: Vec2,
        width: f64,
        height: f64,
        rotation: f64,
        color: Color,
    },
    Circle {
        center: Vec2,
        radius: f64,
        color: Color,
    },
    Text {
        origin: Vec2,
        text: String,
        size: f64,
        color: Color,
    },
}

/// The primitives for one frame, each tagged with a draw layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    items: Vec<(i32, DrawCommand)>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: i32, command: DrawCommand) {
        self.items.push((layer, command));
    }

    /// Commands in draw order: by layer, then insertion order.
    pub fn sorted(&self) -> Vec<&DrawCommand> {
        let mut items: Vec<&(i32, DrawCommand)> = self.items.iter().collect();
        items.sort_by_key(|(layer, _)| *layer);
        items.into_iter().map(|(_, c)| c).collect()
    }

    /// Every text string in the list, in insertion order.
    pub fn texts(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|(_, c)| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Queue a draw for every visible entity with a [`Transform`] and a
/// [`Sprite`], scaled by the transform.
pub fn draw_sprites(world: &World, entities: &[EntityId], list: &mut DrawList) {
    for &e in entities {
        let (Some(t), Some(s)) = (world.get::<Transform>(e), world.get::<Sprite>(e)) else {
            continue;
        };
        if !s.visible {
            continue;
        }
        list.push(s.layer, sprite_command(t, s));
    }
}

/// The draw command for one sprite at `t`.
pub fn sprite_command(t: &Transform, s: &Sprite) -> DrawCommand {
    match s.shape {
        Shape::Rect { width, height } => DrawCommand::Rect {
            center: t.position,
            width: width * t.scale.x,
            height: height * t.scale.y,
            rotation: t.rotation,
            color: s.color,
        },
        Shape::Circle { radius } => DrawCommand::Circle {
            center: t.position,
            radius: radius * t.scale.x.max(t.scale.y),
            color: s.color,
        },
    }
}

// ---------------------------------------------------------------------------
// RenderSurface
// ---------------------------------------------------------------------------

/// Something that can show a [`DrawList`].
pub trait RenderSurface {
    /// Prepare a `width` x `height` surface cleared to `background`.
    fn init(&mut self, width: f64, height: f64, background: Color) -> Result<(), SurfaceError>;

    /// Show one frame.
    fn present(&mut self, frame: &DrawList) -> Result<(), SurfaceError>;

    /// Release the surface. Called once on host shutdown.
    fn shutdown(&mut self) {}
}

/// Records presented frames in memory. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    inner: Rc<RefCell<HeadlessState>>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    size: Option<(f64, f64)>,
    background: Option<Color>,
    frames: Vec<DrawList>,
    /// Keep at most this many frames; older ones are dropped.
    keep: Option<usize>,
    presented: u64,
    shut_down: bool,
    fail_init: Option<String>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep the most recent `n` frames.
    pub fn keep_last(self, n: usize) -> Self {
        self.inner.borrow_mut().keep = Some(n);
        self
    }

    /// A surface whose `init` fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        let s = Self::default();
        s.inner.borrow_mut().fail_init = Some(reason.to_owned());
        s
    }

    /// The most recently presented frame.
    pub fn last_frame(&self) -> Option<DrawList> {
        self.inner.borrow().frames.last().cloned()
    }

    /// Number of frames presented since creation.
    pub fn presented(&self) -> u64 {
        self.inner.borrow().presented
    }

    pub fn size(&self) -> Option<(f64, f64)> {
        self.inner.borrow().size
    }

    pub fn background(&self) -> Option<Color> {
        self.inner.borrow().background
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.borrow().shut_down
    }
}

impl RenderSurface for HeadlessSurface {
    fn init(&mut self, width: f64, height: f64, background: Color) -> Result<(), SurfaceError> {
        let mut s = self.inner.borrow_mut();
        if let Some(reason) = &s.fail_init {
            return Err(SurfaceError::Init(reason.clone()));
        }
        s.size = Some((width, height));
        s.background = Some(background);
        s.shut_down = false;
        Ok(())
    }

    fn present(&mut self, frame: &DrawList) -> Result<(), SurfaceError> {
        let mut s = self.inner.borrow_mut();
        if s.size.is_none() {
            return Err(SurfaceError::Present("surface not initialized".to_owned()));
        }
        s.frames.push(frame.clone());
        if let Some(keep) = s.keep {
            let excess = s.frames.len().saturating_sub(keep);
            s.frames.drain(..excess);
        }
        s.presented += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.shut_down = true;
        s.size = None;
    }
}
