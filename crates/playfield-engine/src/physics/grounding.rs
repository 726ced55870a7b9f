//! Grounding state machine for actors.
//!
//! An actor becomes grounded when a contact starts with a body it sits on top
//! of. It only becomes airborne again after a contact ends *and* a delayed
//! recheck finds nothing underneath it; the delay absorbs the flicker of
//! contacts ending and restarting while walking across seams.
//!
//! Rechecks carry the body handle they were scheduled for. A recheck whose
//! entity is gone, or whose entity now owns a different body, is dropped.

use playfield_ecs::entity::EntityId;

use crate::config::PhysicsConfig;

use super::{BodyHandle, BodySnapshot, Bounds};

/// Thresholds for the "on top of" test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundingPolicy {
    /// Bottom edge may hover this far above the surface top.
    pub band_above: f64,
    /// Bottom edge may be sunk this far into the surface.
    pub band_below: f64,
    /// Largest upward speed (px/s) that still counts as landing.
    pub max_upward_speed: f64,
}

impl GroundingPolicy {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            band_above: config.landing_band_above,
            band_below: config.landing_band_below,
            max_upward_speed: config.upward_velocity_allowance / config.fixed_step_secs(),
        }
    }

    /// Whether `actor` rests on top of `surface`: its bottom edge lies in
    /// the landing band around the surface's top edge and the two overlap
    /// horizontally.
    pub fn is_on_top(&self, actor: &Bounds, surface: &Bounds) -> bool {
        let bottom = actor.max.y;
        let top = surface.min.y;
        let in_band = bottom >= top - self.band_above && bottom <= top + self.band_below;
        let aligned = actor.max.x > surface.min.x && actor.min.x < surface.max.x;
        in_band && aligned
    }

    /// Whether an actor moving at `velocity_y` (px/s, positive down) may
    /// land. Rising fast means the contact is a head bump or a graze.
    pub fn allows_landing(&self, velocity_y: f64) -> bool {
        velocity_y >= -self.max_upward_speed
    }

    /// The full landing test for a contact that just started.
    pub fn is_landing(&self, actor: &BodySnapshot, surface: &BodySnapshot) -> bool {
        self.allows_landing(actor.velocity.y) && self.is_on_top(&actor.bounds, &surface.bounds)
    }

    /// Whether anything in `bodies` still supports `actor`. Overlap is
    /// tested with the upper band as margin so a resting actor separated
    /// from the floor by solver slop still counts.
    pub fn is_supported(&self, actor: &BodySnapshot, bodies: &[BodySnapshot]) -> bool {
        bodies.iter().any(|other| {
            other.handle != actor.handle
                && actor.bounds.overlaps(&other.bounds, self.band_above)
                && self.is_on_top(&actor.bounds, &other.bounds)
        })
    }
}

// ---------------------------------------------------------------------------
// GroundingTracker
// ---------------------------------------------------------------------------

/// A delayed "is the actor still standing on something" check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRecheck {
    pub entity: EntityId,
    pub body: BodyHandle,
    /// Milliseconds until the check runs.
    pub remaining_ms: f64,
}

/// Debounced rechecks scheduled by ended contacts.
#[derive(Debug, Clone)]
pub struct GroundingTracker {
    delay_ms: f64,
    pending: Vec<PendingRecheck>,
}

impl GroundingTracker {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            pending: Vec::new(),
        }
    }

    /// Queue a recheck for `entity`'s `body`, due after the delay.
    pub fn schedule(&mut self, entity: EntityId, body: BodyHandle) {
        tracing::trace!(%entity, delay_ms = self.delay_ms, "regrounding check scheduled");
        self.pending.push(PendingRecheck {
            entity,
            body,
            remaining_ms: self.delay_ms,
        });
    }

    /// Advance time by `elapsed_ms` and return the checks that came due,
    /// oldest first.
    pub fn advance(&mut self, elapsed_ms: f64) -> Vec<PendingRecheck> {
        let mut due = Vec::new();
        self.pending.retain_mut(|check| {
            check.remaining_ms -= elapsed_ms;
            if check.remaining_ms <= 0.0 {
                due.push(*check);
                false
            } else {
                true
            }
        });
        due
    }

    pub fn pending(&self) -> &[PendingRecheck] {
        &self.pending
    }

    /// Drop every pending check for `entity`.
    pub fn cancel(&mut self, entity: EntityId) {
        self.pending.retain(|c| c.entity != entity);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
