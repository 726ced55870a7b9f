//! Components shared by every game mode.

use playfield_ecs::component::Component;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::math::Vec2;

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Position, rotation (radians) and scale of an entity. No hierarchy.
///
/// For physically simulated entities the physics layer overwrites
/// `position` and `rotation` every frame; treat them as read-only there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: f64,
    pub scale: Vec2,
}

impl Transform {
    pub fn new(position: Vec2, rotation: f64, scale: Vec2) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Identity rotation and scale at `position`.
    pub fn at(x: f64, y: f64) -> Self {
        Self::new(Vec2::new(x, y), 0.0, Vec2::ONE)
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
    }

    pub fn rotate(&mut self, radians: f64) {
        self.rotation += radians;
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::at(0.0, 0.0)
    }
}

impl Component for Transform {
    const NAME: &'static str = "transform";
}

// ---------------------------------------------------------------------------
// Sprite
// ---------------------------------------------------------------------------

/// Geometry a render system draws for an entity, centered on its transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Rect { width: f64, height: f64 },
    Circle { radius: f64 },
}

/// Visual appearance of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub shape: Shape,
    pub color: Color,
    pub visible: bool,
    /// Draw order; higher layers are drawn later.
    pub layer: i32,
}

impl Sprite {
    pub fn rect(width: f64, height: f64, color: Color) -> Self {
        Self {
            shape: Shape::Rect { width, height },
            color,
            visible: true,
            layer: 0,
        }
    }

    pub fn circle(radius: f64, color: Color) -> Self {
        Self {
            shape: Shape::Circle { radius },
            color,
            visible: true,
            layer: 0,
        }
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }
}

impl Component for Sprite {
    const NAME: &'static str = "sprite";
}
