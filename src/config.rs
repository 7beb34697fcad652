// src/config.rs
//! Scene-wide tuning knobs.
//!
//! Every field has a default so a partial JSON document is enough:
//!
//! ```json
//! { "gravity": -9.8, "linkset_kind": "Constraint", "region_size": [512.0, 512.0] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};
use crate::linkset::LinksetKind;

/// Configuration options for the physics scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity along world Z (negative is down)
    pub gravity: f32,
    /// Engine substep length
    pub fixed_timestep: f32,
    /// Upper bound of engine substeps per tick
    pub max_substeps: u32,

    /// Region extents in meters (x, y)
    pub region_size: [f32; 2],
    pub default_terrain_height: f32,
    pub water_height: f32,

    /// Linkset implementation used for new linksets
    pub linkset_kind: LinksetKind,

    pub default_friction: f32,
    pub default_restitution: f32,
    pub default_density: f32,
    pub minimum_object_mass: f32,
    pub maximum_object_mass: f32,

    pub avatar_density: f32,
    /// Friction applied while an avatar stands still
    pub avatar_standing_friction: f32,
    pub avatar_friction: f32,
    pub avatar_restitution: f32,
    /// Time scale of the avatar velocity motor
    pub avatar_velocity_timescale: f32,
    pub avatar_jump_velocity: f32,

    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,

    /// How far outside the region an object may drift before it is reset
    pub extreme_horizontal_margin: f32,
    pub extreme_min_z: f32,
    pub extreme_max_z: f32,

    /// Failed linkset rebuild attempts before the operator warning
    pub linkset_incomplete_warn_after: u32,
    /// Collision report interval for subscriptions that pass 0
    pub default_collision_interval_ms: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -9.80665,
            fixed_timestep: 1.0 / 55.0,
            max_substeps: 10,
            region_size: [256.0, 256.0],
            default_terrain_height: 21.0,
            water_height: 20.0,
            linkset_kind: LinksetKind::Compound,
            default_friction: 0.2,
            default_restitution: 0.0,
            default_density: 1000.0,
            minimum_object_mass: 0.0001,
            maximum_object_mass: 10000.01,
            avatar_density: 3.5,
            avatar_standing_friction: 0.95,
            avatar_friction: 0.2,
            avatar_restitution: 0.0,
            avatar_velocity_timescale: 0.2,
            avatar_jump_velocity: 5.0,
            max_linear_velocity: 1000.0,
            max_angular_velocity: 1000.0,
            extreme_horizontal_margin: 1000.0,
            extreme_min_z: -1000.0,
            extreme_max_z: 10000.0,
            linkset_incomplete_warn_after: 30,
            default_collision_interval_ms: 0,
        }
    }
}

impl PhysicsConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json_str(json: &str) -> PhysicsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> PhysicsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PhysicsError::from(e).context(format!("reading {}", path.display())))?;
        Self::from_json_str(&text).map_err(|e| e.context(format!("parsing {}", path.display())))
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return Err(PhysicsError::Config(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        if self.max_substeps == 0 {
            return Err(PhysicsError::Config("max_substeps must be at least 1".into()));
        }
        if self.region_size.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(PhysicsError::Config(format!("invalid region_size {:?}", self.region_size)));
        }
        if !(self.minimum_object_mass > 0.0 && self.minimum_object_mass < self.maximum_object_mass) {
            return Err(PhysicsError::Config(format!(
                "mass bounds [{}, {}] are inverted or non-positive",
                self.minimum_object_mass, self.maximum_object_mass
            )));
        }
        if !self.gravity.is_finite() {
            return Err(PhysicsError::Config("gravity must be finite".into()));
        }
        if self.extreme_min_z >= self.extreme_max_z {
            return Err(PhysicsError::Config("extreme_min_z must be below extreme_max_z".into()));
        }
        Ok(())
    }

    /// Clamp a computed mass into the configured bounds.
    #[inline]
    pub fn clamp_mass(&self, mass: f32) -> f32 {
        mass.clamp(self.minimum_object_mass, self.maximum_object_mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PhysicsConfig::from_json_str(r#"{ "gravity": -3.0, "linkset_kind": "Constraint" }"#).unwrap();
        assert_eq!(config.gravity, -3.0);
        assert_eq!(config.linkset_kind, LinksetKind::Constraint);
        assert_eq!(config.region_size, [256.0, 256.0]);
        assert_eq!(config.max_substeps, 10);
    }

    #[test]
    fn zero_timestep_is_rejected() {
        let err = PhysicsConfig::from_json_str(r#"{ "fixed_timestep": 0.0 }"#).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn mass_is_clamped_into_bounds() {
        let config = PhysicsConfig::default();
        assert_eq!(config.clamp_mass(0.0), config.minimum_object_mass);
        assert_eq!(config.clamp_mass(1.0e9), config.maximum_object_mass);
        assert_eq!(config.clamp_mass(12.0), 12.0);
    }
}
