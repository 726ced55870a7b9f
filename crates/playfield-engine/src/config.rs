//! Engine configuration.
//!
//! Every struct has a `Default` matching the tuning the games were built
//! against and deserializes with missing fields filled from that default, so
//! a JSON override only needs to name what it changes:
//!
//! ```
//! use playfield_engine::config::EngineConfig;
//!
//! let cfg = EngineConfig::from_json_str(r#"{ "clock": { "target_fps": 30 } }"#).unwrap();
//! assert_eq!(cfg.clock.target_fps, 30.0);
//! assert_eq!(cfg.physics.regrounding_delay_ms, 100.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::color::Color;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The input was not valid JSON for the config schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the engine cannot run with.
    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive and finite, got {value}")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be non-negative and finite, got {value}")))
    }
}

// ---------------------------------------------------------------------------
// ClockConfig
// ---------------------------------------------------------------------------

/// Frame clock tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Frames per second the clock measures against.
    pub target_fps: f64,
    /// Number of raw deltas averaged into the smoothed delta.
    pub smoothing_window: usize,
    /// Smoothed delta above `target_frame_time * slow_factor` counts as
    /// running slowly.
    pub slow_factor: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            smoothing_window: 10,
            slow_factor: 1.2,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("clock.target_fps", self.target_fps)?;
        positive("clock.slow_factor", self.slow_factor)?;
        if self.smoothing_window == 0 {
            return Err(invalid("clock.smoothing_window", "must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

/// Physics layer tuning. Distances are in pixels, y grows downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity in px/s².
    pub gravity: [f64; 2],
    /// Solver step in milliseconds, independent of the render delta.
    pub fixed_step_ms: f64,
    /// Typical object size in pixels; scales the solver's tolerances.
    pub length_unit: f64,
    /// How far above a surface's top edge an actor's bottom edge may be and
    /// still count as landing.
    pub landing_band_above: f64,
    /// How far below a surface's top edge (sunk in) the bottom edge may be.
    pub landing_band_below: f64,
    /// Largest upward speed, in px per fixed step, that still allows
    /// grounding.
    pub upward_velocity_allowance: f64,
    /// Debounce window before a lost contact makes an actor airborne.
    pub regrounding_delay_ms: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, 1000.0],
            fixed_step_ms: 16.67,
            length_unit: 50.0,
            landing_band_above: 5.0,
            landing_band_below: 15.0,
            upward_velocity_allowance: 5.0,
            regrounding_delay_ms: 100.0,
        }
    }
}

impl PhysicsConfig {
    /// Fixed step in seconds.
    pub fn fixed_step_secs(&self) -> f64 {
        self.fixed_step_ms / 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(invalid("physics.gravity", "components must be finite"));
        }
        positive("physics.fixed_step_ms", self.fixed_step_ms)?;
        positive("physics.length_unit", self.length_unit)?;
        non_negative("physics.landing_band_above", self.landing_band_above)?;
        non_negative("physics.landing_band_below", self.landing_band_below)?;
        non_negative(
            "physics.upward_velocity_allowance",
            self.upward_velocity_allowance,
        )?;
        non_negative("physics.regrounding_delay_ms", self.regrounding_delay_ms)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

/// The embedding surface: size and clear color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub width: f64,
    pub height: f64,
    pub background: Color,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            background: Color::from_packed(0x1e1e1e),
        }
    }
}

impl HostConfig {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("host.width", self.width)?;
        positive("host.height", self.height)
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub host: HostConfig,
    pub clock: ClockConfig,
    pub physics: PhysicsConfig,
    /// Record per-system timings.
    pub profiling: bool,
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Seed for game-mode randomness (spawn positions, lanes).
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            clock: ClockConfig::default(),
            physics: PhysicsConfig::default(),
            profiling: false,
            log_filter: "info".to_owned(),
            seed: 0x5eed,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.host.validate()?;
        self.clock.validate()?;
        self.physics.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
        assert!((PhysicsConfig::default().fixed_step_secs() - 0.01667).abs() < 1e-12);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "physics": { "gravity": [0, 500] }, "seed": 7 }"#,
        )
        .unwrap();
        assert_eq!(cfg.physics.gravity, [0.0, 500.0]);
        assert_eq!(cfg.physics.fixed_step_ms, 16.67);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.clock, ClockConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "clock": { "target_fps": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "clock.target_fps"));

        let err = EngineConfig::from_json_str(r#"{ "clock": { "smoothing_window": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }
}
