// src/engine/mod.rs
//! Engine adapter contract.
//!
//! The physics core never talks to a solver directly; it goes through
//! [`PhysicsEngine`]. Handles are opaque newtypes. Every mutating call must come
//! from taint time; the adapter itself does not check, the callers in
//! [`crate::world`] do.
//!
//! Calls on a handle the adapter no longer knows are silently ignored (queries
//! return `None`), matching how a taint for a destroyed object must behave.

pub mod rapier;

#[cfg(test)]
pub(crate) mod recording;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::PhysicsResult;
use crate::object::LocalId;
use crate::terrain::Terrain;

pub use self::rapier::RapierEngine;

/// Id used for the terrain in collision records.
pub const TERRAIN_ID: LocalId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u64);

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Moved by the solver
    Dynamic,
    /// Never moves, infinite mass
    Static,
    /// Moved by code, pushes dynamic bodies
    Kinematic,
}

/// Convex collision shape descriptions. Z is up.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeDesc {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    /// Capsule along Z
    Capsule { radius: f32, half_height: f32 },
    /// Cylinder along Z
    Cylinder { radius: f32, half_height: f32 },
    ConvexHull { points: Vec<Vec3> },
}

/// A pose relative to a body's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Frame {
    pub const IDENTITY: Frame = Frame {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// Degrees of freedom held fixed by a world constraint. `true` means locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisLocks {
    pub linear: [bool; 3],
    pub angular: [bool; 3],
}

impl AxisLocks {
    pub const FREE: AxisLocks = AxisLocks {
        linear: [false; 3],
        angular: [false; 3],
    };

    /// Angular locks from a multiplier vector: a component of 0 locks that axis,
    /// anything else leaves it free.
    pub fn from_angular_multiplier(axis: Vec3) -> Self {
        Self {
            linear: [false; 3],
            angular: [axis.x == 0.0, axis.y == 0.0, axis.z == 0.0],
        }
    }

    pub fn all_free(&self) -> bool {
        !self.linear.iter().chain(self.angular.iter()).any(|locked| *locked)
    }
}

/// Engine-computed state of one body after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityProperties {
    pub id: LocalId,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub angular_velocity: Vec3,
}

/// One contact between two objects (or an object and the terrain).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionRecord {
    pub id_a: LocalId,
    pub id_b: LocalId,
    /// World-space contact point
    pub point: Vec3,
    /// World-space normal pointing from `a` to `b`
    pub normal: Vec3,
    pub depth: f32,
}

#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub updates: Vec<EntityProperties>,
    pub collisions: Vec<CollisionRecord>,
    pub substeps: u32,
}

/// Everything the physics core needs from a rigid-body engine.
pub trait PhysicsEngine: Send {
    // ---- shapes ----
    fn create_shape(&mut self, desc: &ShapeDesc) -> PhysicsResult<ShapeId>;
    fn create_compound_shape(&mut self) -> ShapeId;
    fn add_child_shape_to_compound(
        &mut self,
        compound: ShapeId,
        child: ShapeId,
        offset_pos: Vec3,
        offset_rot: Quat,
    ) -> PhysicsResult<()>;
    fn compound_child_count(&self, compound: ShapeId) -> usize;
    fn destroy_shape(&mut self, shape: ShapeId);

    // ---- bodies ----
    fn create_body(&mut self, id: LocalId, shape: ShapeId, position: Vec3, orientation: Quat) -> PhysicsResult<BodyId>;
    fn destroy_body(&mut self, body: BodyId);
    fn has_body(&self, body: BodyId) -> bool;
    fn add_to_world(&mut self, body: BodyId);
    fn remove_from_world(&mut self, body: BodyId);
    fn is_in_world(&self, body: BodyId) -> bool;
    fn set_body_shape(&mut self, body: BodyId, shape: ShapeId) -> PhysicsResult<()>;
    fn set_body_type(&mut self, body: BodyId, body_type: BodyType);

    // ---- state ----
    fn set_transform(&mut self, body: BodyId, position: Vec3, orientation: Quat);
    fn transform(&self, body: BodyId) -> Option<(Vec3, Quat)>;
    fn set_linear_velocity(&mut self, body: BodyId, velocity: Vec3);
    fn linear_velocity(&self, body: BodyId) -> Option<Vec3>;
    fn set_angular_velocity(&mut self, body: BodyId, velocity: Vec3);
    fn angular_velocity(&self, body: BodyId) -> Option<Vec3>;

    // ---- mass & material ----
    fn set_mass_props(&mut self, body: BodyId, mass: f32, inertia: Vec3);
    fn calculate_local_inertia(&self, shape: ShapeId, mass: f32) -> Vec3;
    fn set_material(&mut self, body: BodyId, friction: f32, restitution: f32);
    fn set_gravity_scale(&mut self, body: BodyId, scale: f32);
    fn set_collision_response(&mut self, body: BodyId, enabled: bool);
    fn set_collision_events(&mut self, body: BodyId, enabled: bool);
    fn set_rotation_locked(&mut self, body: BodyId, locked: bool);
    fn set_damping(&mut self, body: BodyId, linear: f32, angular: f32);

    // ---- forces ----
    fn apply_central_force(&mut self, body: BodyId, force: Vec3);
    fn apply_central_impulse(&mut self, body: BodyId, impulse: Vec3);
    fn apply_torque(&mut self, body: BodyId, torque: Vec3);
    fn apply_torque_impulse(&mut self, body: BodyId, impulse: Vec3);

    // ---- constraints ----
    /// Rigid 6-DOF link. Frames are relative to each body's origin.
    fn create_fixed_constraint(
        &mut self,
        body_a: BodyId,
        frame_a: Frame,
        body_b: BodyId,
        frame_b: Frame,
    ) -> PhysicsResult<ConstraintId>;
    /// Pin the listed axes of `body` to a world frame.
    fn create_world_constraint(&mut self, body: BodyId, world_frame: Frame, locks: AxisLocks)
        -> PhysicsResult<ConstraintId>;
    /// Refresh solver state after the masses of the joined bodies changed.
    fn recalculate_constraint(&mut self, constraint: ConstraintId);
    fn destroy_constraint(&mut self, constraint: ConstraintId);
    fn has_constraint(&self, constraint: ConstraintId) -> bool;

    // ---- world ----
    fn set_gravity(&mut self, gravity: Vec3);
    fn set_terrain(&mut self, terrain: &Terrain) -> PhysicsResult<()>;
    /// Advance by `dt` in fixed substeps and report what moved and what touched.
    fn step_simulation(&mut self, dt: f32, max_substeps: u32, fixed_timestep: f32) -> StepOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angular_multiplier_zero_means_locked() {
        let locks = AxisLocks::from_angular_multiplier(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(locks.angular, [true, false, true]);
        assert!(!locks.all_free());
        assert!(AxisLocks::from_angular_multiplier(Vec3::ONE).all_free());
        assert!(AxisLocks::FREE.all_free());
    }
}
