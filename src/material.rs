// src/material.rs
//! Material table: the viewer picks a material kind, the physics layer derives
//! friction, restitution and density from it.

use serde::{Deserialize, Serialize};

/// Material kinds, numbered as the viewer sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaterialKind {
    Stone,
    Metal,
    Glass,
    #[default]
    Wood,
    Flesh,
    Plastic,
    Rubber,
    Light,
    Avatar,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 9] = [
        MaterialKind::Stone,
        MaterialKind::Metal,
        MaterialKind::Glass,
        MaterialKind::Wood,
        MaterialKind::Flesh,
        MaterialKind::Plastic,
        MaterialKind::Rubber,
        MaterialKind::Light,
        MaterialKind::Avatar,
    ];

    /// Map the wire number to a kind; unknown numbers fall back to wood.
    pub fn from_code(code: u8) -> Self {
        Self::ALL.get(code as usize).copied().unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            MaterialKind::Stone => "stone",
            MaterialKind::Metal => "metal",
            MaterialKind::Glass => "glass",
            MaterialKind::Wood => "wood",
            MaterialKind::Flesh => "flesh",
            MaterialKind::Plastic => "plastic",
            MaterialKind::Rubber => "rubber",
            MaterialKind::Light => "light",
            MaterialKind::Avatar => "avatar",
        }
    }

    /// Physical attributes of this material.
    pub fn attributes(self) -> MaterialAttributes {
        match self {
            MaterialKind::Stone => MaterialAttributes::new(0.8, 0.4, 2500.0),
            MaterialKind::Metal => MaterialAttributes::new(0.3, 0.4, 7000.0),
            MaterialKind::Glass => MaterialAttributes::new(0.2, 0.7, 2500.0),
            MaterialKind::Wood => MaterialAttributes::new(0.6, 0.5, 600.0),
            MaterialKind::Flesh => MaterialAttributes::new(0.9, 0.3, 1500.0),
            MaterialKind::Plastic => MaterialAttributes::new(0.4, 0.7, 1500.0),
            MaterialKind::Rubber => MaterialAttributes::new(0.9, 0.9, 1500.0),
            MaterialKind::Light => MaterialAttributes::new(0.0, 0.0, 1500.0),
            MaterialKind::Avatar => MaterialAttributes::new(0.2, 0.0, 3500.0),
        }
    }
}

/// Physics material properties
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialAttributes {
    /// Friction coefficient (0.0 = no friction)
    pub friction: f32,
    /// Restitution/bounciness (0.0 = no bounce, 1.0 = full bounce)
    pub restitution: f32,
    /// Density in kg/m^3, used for mass calculation
    pub density: f32,
}

impl MaterialAttributes {
    pub const fn new(friction: f32, restitution: f32, density: f32) -> Self {
        Self {
            friction,
            restitution,
            density,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_round_trip_through_the_table() {
        for (code, kind) in MaterialKind::ALL.iter().enumerate() {
            assert_eq!(MaterialKind::from_code(code as u8), *kind);
        }
        assert_eq!(MaterialKind::from_code(200), MaterialKind::Wood);
    }

    #[test]
    fn rubber_bounces_more_than_stone() {
        let rubber = MaterialKind::Rubber.attributes();
        let stone = MaterialKind::Stone.attributes();
        assert!(rubber.restitution > stone.restitution);
        assert!(MaterialKind::Metal.attributes().density > stone.density);
    }
}
