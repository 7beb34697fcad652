// src/engine/rapier.rs
//!
//! Rapier 3D implementation of [`PhysicsEngine`].
//!
//! - One rigid body + one collider per physics object. The collider has zero
//!   density; mass and inertia come from `set_mass_props` as additional mass
//!   properties, so the core stays in charge of linkset mass.
//! - "Remove from world" disables the body; it keeps its handle and state.
//! - Compound shapes keep their child slots and rebuild the shared shape each
//!   time a child is added.
//! - Fixed-timestep substepping with an accumulator, like the solver loop the
//!   simulator expects (`dt`, `max_substeps`, `fixed_timestep`).
//! - Terrain is a heightfield collider rotated into the Z-up world.

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use super::{
    AxisLocks, BodyId, BodyType, CollisionRecord, ConstraintId, EntityProperties, Frame, PhysicsEngine, ShapeDesc,
    ShapeId, StepOutput, TERRAIN_ID,
};
use crate::error::{PhysicsError, PhysicsResult};
use crate::object::LocalId;
use crate::terrain::Terrain;

/// Segments used to approximate a cylinder with a convex hull.
const CYLINDER_SEGMENTS: usize = 16;
const TERRAIN_FRICTION: f32 = 0.3;
const DEFAULT_MAPPING_CAPACITY: usize = 1024;

/* -------------------------------------------------------------------------- */
/*                              Conversions                                    */
/* -------------------------------------------------------------------------- */

#[inline(always)]
fn to_vector(v: Vec3) -> Vector3<Real> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline(always)]
fn from_vector(v: &Vector3<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[inline(always)]
fn to_rotation(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[inline(always)]
fn from_rotation(r: &UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(r.i, r.j, r.k, r.w)
}

#[inline(always)]
fn to_isometry(position: Vec3, rotation: Quat) -> Isometry3<Real> {
    Isometry3::from_parts(Translation3::from(to_vector(position)), to_rotation(rotation))
}

#[inline(always)]
fn frame_isometry(frame: Frame) -> Isometry3<Real> {
    to_isometry(frame.position, frame.rotation)
}

/// Body user data carries both the adapter handle and the object id.
#[inline(always)]
fn pack_user_data(body: BodyId, id: LocalId) -> u128 {
    ((body.0 as u128) << 32) | id as u128
}

#[inline(always)]
fn unpack_user_data(data: u128) -> (BodyId, LocalId) {
    (BodyId((data >> 32) as u64), (data & 0xFFFF_FFFF) as LocalId)
}

/* -------------------------------------------------------------------------- */
/*                              Bookkeeping                                    */
/* -------------------------------------------------------------------------- */

enum ShapeEntry {
    Convex(SharedShape),
    Compound {
        children: Vec<(Isometry3<Real>, SharedShape)>,
        shape: Option<SharedShape>,
    },
}

impl ShapeEntry {
    fn shared(&self) -> Option<&SharedShape> {
        match self {
            ShapeEntry::Convex(shape) => Some(shape),
            ShapeEntry::Compound { shape, .. } => shape.as_ref(),
        }
    }
}

struct BodyEntry {
    rigid_body: RigidBodyHandle,
    collider: ColliderHandle,
    last_linvel: Vec3,
}

/* -------------------------------------------------------------------------- */
/*                              Rapier Engine                                  */
/* -------------------------------------------------------------------------- */

pub struct RapierEngine {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    shapes: HashMap<ShapeId, ShapeEntry>,
    handles: HashMap<BodyId, BodyEntry>,
    constraints: HashMap<ConstraintId, ImpulseJointHandle>,
    /// Fixed body at the origin that world constraints attach to.
    world_anchor: RigidBodyHandle,
    terrain: Option<ColliderHandle>,
    next_handle: u64,
    accumulator: f32,
}

impl RapierEngine {
    pub fn new(gravity: Vec3) -> Self {
        let mut bodies = RigidBodySet::new();
        let world_anchor = bodies.insert(RigidBodyBuilder::fixed().build());

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.max_ccd_substeps = 1;

        Self {
            gravity: to_vector(gravity),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            shapes: HashMap::with_capacity(DEFAULT_MAPPING_CAPACITY),
            handles: HashMap::with_capacity(DEFAULT_MAPPING_CAPACITY),
            constraints: HashMap::new(),
            world_anchor,
            terrain: None,
            next_handle: 1,
            accumulator: 0.0,
        }
    }

    /// Z-up gravity of `gravity_z` m/s^2.
    pub fn with_gravity_z(gravity_z: f32) -> Self {
        Self::new(Vec3::new(0.0, 0.0, gravity_z))
    }

    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    pub fn has_terrain(&self) -> bool {
        self.terrain.is_some()
    }

    fn next_raw(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn rigid_body_mut(&mut self, body: BodyId) -> Option<&mut RigidBody> {
        let handle = self.handles.get(&body)?.rigid_body;
        self.bodies.get_mut(handle)
    }

    fn rigid_body(&self, body: BodyId) -> Option<&RigidBody> {
        let handle = self.handles.get(&body)?.rigid_body;
        self.bodies.get(handle)
    }

    fn collider_mut(&mut self, body: BodyId) -> Option<&mut Collider> {
        let handle = self.handles.get(&body)?.collider;
        self.colliders.get_mut(handle)
    }

    fn shared_shape(&self, shape: ShapeId) -> PhysicsResult<SharedShape> {
        self.shapes
            .get(&shape)
            .and_then(ShapeEntry::shared)
            .cloned()
            .ok_or_else(|| PhysicsError::InvalidHandle(format!("{shape:?}")))
    }

    fn build_convex(desc: &ShapeDesc) -> PhysicsResult<SharedShape> {
        let invalid = |what: &str| PhysicsError::ShapeBuild(format!("{what}: {desc:?}"));
        match desc {
            ShapeDesc::Box { half_extents } => {
                if half_extents.min_element() <= 0.0 {
                    return Err(invalid("non-positive box extent"));
                }
                Ok(SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z))
            }
            ShapeDesc::Sphere { radius } if *radius > 0.0 => Ok(SharedShape::ball(*radius)),
            ShapeDesc::Capsule { radius, half_height } if *radius > 0.0 && *half_height >= 0.0 => {
                Ok(SharedShape::capsule_z(*half_height, *radius))
            }
            ShapeDesc::Cylinder { radius, half_height } if *radius > 0.0 && *half_height > 0.0 => {
                let mut points = Vec::with_capacity(CYLINDER_SEGMENTS * 2);
                for i in 0..CYLINDER_SEGMENTS {
                    let angle = i as f32 / CYLINDER_SEGMENTS as f32 * std::f32::consts::TAU;
                    let (s, c) = angle.sin_cos();
                    points.push(Point3::new(c * radius, s * radius, -half_height));
                    points.push(Point3::new(c * radius, s * radius, *half_height));
                }
                SharedShape::convex_hull(&points).ok_or_else(|| invalid("degenerate cylinder"))
            }
            ShapeDesc::ConvexHull { points } => {
                let points: Vec<Point<Real>> = points.iter().map(|p| Point3::new(p.x, p.y, p.z)).collect();
                SharedShape::convex_hull(&points).ok_or_else(|| invalid("degenerate hull"))
            }
            _ => Err(invalid("non-positive dimension")),
        }
    }

    fn step_once(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    fn collider_owner(&self, handle: ColliderHandle) -> Option<(LocalId, bool)> {
        let collider = self.colliders.get(handle)?;
        let id = collider.user_data as LocalId;
        let events = collider.active_events().contains(ActiveEvents::COLLISION_EVENTS);
        Some((id, events))
    }

    fn collect_collisions(&self, out: &mut Vec<CollisionRecord>) {
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let (Some((id_a, events_a)), Some((id_b, events_b))) =
                (self.collider_owner(pair.collider1), self.collider_owner(pair.collider2))
            else {
                continue;
            };
            if !(events_a || events_b) {
                continue;
            }
            let Some((manifold, contact)) = pair.find_deepest_contact() else {
                continue;
            };
            let Some(collider1) = self.colliders.get(pair.collider1) else {
                continue;
            };
            let point = collider1.position() * contact.local_p1;
            out.push(CollisionRecord {
                id_a,
                id_b,
                point: Vec3::new(point.x, point.y, point.z),
                normal: from_vector(&manifold.data.normal),
                depth: -contact.dist,
            });
        }

        // Sensors (volume detect) intersect instead of touching.
        for (h1, h2, intersecting) in self.narrow_phase.intersection_pairs() {
            if !intersecting {
                continue;
            }
            let (Some((id_a, events_a)), Some((id_b, events_b))) = (self.collider_owner(h1), self.collider_owner(h2))
            else {
                continue;
            };
            if !(events_a || events_b) {
                continue;
            }
            let (Some(c1), Some(c2)) = (self.colliders.get(h1), self.colliders.get(h2)) else {
                continue;
            };
            let p1 = c1.position().translation.vector;
            let p2 = c2.position().translation.vector;
            let normal = (p2 - p1).try_normalize(1.0e-6).unwrap_or_else(Vector3::z);
            let mid = (p1 + p2) * 0.5;
            out.push(CollisionRecord {
                id_a,
                id_b,
                point: from_vector(&mid),
                normal: from_vector(&normal),
                depth: 0.0,
            });
        }
    }

    fn collect_updates(&mut self, elapsed: f32, out: &mut Vec<EntityProperties>) {
        let active: Vec<RigidBodyHandle> = self.island_manager.active_dynamic_bodies().to_vec();
        for handle in active {
            let Some(rb) = self.bodies.get(handle) else {
                continue;
            };
            if !rb.is_enabled() || handle == self.world_anchor {
                continue;
            }
            let (body, id) = unpack_user_data(rb.user_data);
            let position = from_vector(rb.translation());
            let orientation = from_rotation(rb.rotation());
            let velocity = from_vector(rb.linvel());
            let angular_velocity = from_vector(rb.angvel());

            let acceleration = match self.handles.get_mut(&body) {
                Some(entry) => {
                    let accel = if elapsed > 0.0 {
                        (velocity - entry.last_linvel) / elapsed
                    } else {
                        Vec3::ZERO
                    };
                    entry.last_linvel = velocity;
                    accel
                }
                None => Vec3::ZERO,
            };

            out.push(EntityProperties {
                id,
                position,
                orientation,
                velocity,
                acceleration,
                angular_velocity,
            });
        }
    }
}

impl Default for RapierEngine {
    fn default() -> Self {
        Self::with_gravity_z(-9.80665)
    }
}

impl PhysicsEngine for RapierEngine {
    fn create_shape(&mut self, desc: &ShapeDesc) -> PhysicsResult<ShapeId> {
        let shape = Self::build_convex(desc)?;
        let id = ShapeId(self.next_raw());
        self.shapes.insert(id, ShapeEntry::Convex(shape));
        Ok(id)
    }

    fn create_compound_shape(&mut self) -> ShapeId {
        let id = ShapeId(self.next_raw());
        self.shapes.insert(
            id,
            ShapeEntry::Compound {
                children: Vec::new(),
                shape: None,
            },
        );
        id
    }

    fn add_child_shape_to_compound(
        &mut self,
        compound: ShapeId,
        child: ShapeId,
        offset_pos: Vec3,
        offset_rot: Quat,
    ) -> PhysicsResult<()> {
        let child_shape = match self.shapes.get(&child) {
            Some(ShapeEntry::Convex(shape)) => shape.clone(),
            Some(ShapeEntry::Compound { .. }) => {
                return Err(PhysicsError::ShapeBuild("compound shapes cannot be nested".into()))
            }
            None => return Err(PhysicsError::InvalidHandle(format!("{child:?}"))),
        };
        match self.shapes.get_mut(&compound) {
            Some(ShapeEntry::Compound { children, shape }) => {
                children.push((to_isometry(offset_pos, offset_rot), child_shape));
                *shape = Some(SharedShape::compound(children.clone()));
                Ok(())
            }
            _ => Err(PhysicsError::InvalidHandle(format!("{compound:?} is not a compound"))),
        }
    }

    fn compound_child_count(&self, compound: ShapeId) -> usize {
        match self.shapes.get(&compound) {
            Some(ShapeEntry::Compound { children, .. }) => children.len(),
            _ => 0,
        }
    }

    fn destroy_shape(&mut self, shape: ShapeId) {
        self.shapes.remove(&shape);
    }

    fn create_body(&mut self, id: LocalId, shape: ShapeId, position: Vec3, orientation: Quat) -> PhysicsResult<BodyId> {
        let shared = self.shared_shape(shape)?;
        let body = BodyId(self.next_raw());

        let rb = RigidBodyBuilder::new(RigidBodyType::Fixed)
            .position(to_isometry(position, orientation))
            .user_data(pack_user_data(body, id))
            .enabled(false)
            .build();
        let rigid_body = self.bodies.insert(rb);

        let collider = ColliderBuilder::new(shared)
            .density(0.0)
            .user_data(id as u128)
            .build();
        let collider = self.colliders.insert_with_parent(collider, rigid_body, &mut self.bodies);

        self.handles.insert(
            body,
            BodyEntry {
                rigid_body,
                collider,
                last_linvel: Vec3::ZERO,
            },
        );
        Ok(body)
    }

    fn destroy_body(&mut self, body: BodyId) {
        let Some(entry) = self.handles.remove(&body) else {
            return;
        };
        // Joints attached to the body go with it.
        self.constraints.retain(|_, joint| {
            self.impulse_joints
                .get(*joint)
                .map(|j| j.body1 != entry.rigid_body && j.body2 != entry.rigid_body)
                .unwrap_or(false)
        });
        self.bodies.remove(
            entry.rigid_body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn has_body(&self, body: BodyId) -> bool {
        self.handles.contains_key(&body)
    }

    fn add_to_world(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_enabled(true);
            rb.wake_up(true);
        }
    }

    fn remove_from_world(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_enabled(false);
        }
    }

    fn is_in_world(&self, body: BodyId) -> bool {
        self.rigid_body(body).map(|rb| rb.is_enabled()).unwrap_or(false)
    }

    fn set_body_shape(&mut self, body: BodyId, shape: ShapeId) -> PhysicsResult<()> {
        let shared = self.shared_shape(shape)?;
        let collider = self
            .collider_mut(body)
            .ok_or_else(|| PhysicsError::InvalidHandle(format!("{body:?}")))?;
        collider.set_shape(shared);
        Ok(())
    }

    fn set_body_type(&mut self, body: BodyId, body_type: BodyType) {
        let rb_type = match body_type {
            BodyType::Dynamic => RigidBodyType::Dynamic,
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Kinematic => RigidBodyType::KinematicPositionBased,
        };
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_body_type(rb_type, true);
        }
    }

    fn set_transform(&mut self, body: BodyId, position: Vec3, orientation: Quat) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_position(to_isometry(position, orientation), true);
        }
    }

    fn transform(&self, body: BodyId) -> Option<(Vec3, Quat)> {
        let rb = self.rigid_body(body)?;
        Some((from_vector(rb.translation()), from_rotation(rb.rotation())))
    }

    fn set_linear_velocity(&mut self, body: BodyId, velocity: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_linvel(to_vector(velocity), true);
        }
    }

    fn linear_velocity(&self, body: BodyId) -> Option<Vec3> {
        self.rigid_body(body).map(|rb| from_vector(rb.linvel()))
    }

    fn set_angular_velocity(&mut self, body: BodyId, velocity: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_angvel(to_vector(velocity), true);
        }
    }

    fn angular_velocity(&self, body: BodyId) -> Option<Vec3> {
        self.rigid_body(body).map(|rb| from_vector(rb.angvel()))
    }

    fn set_mass_props(&mut self, body: BodyId, mass: f32, inertia: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            let props = MassProperties::new(Point3::origin(), mass.max(0.0), to_vector(inertia.max(Vec3::ZERO)));
            rb.set_additional_mass_properties(props, true);
        }
    }

    fn calculate_local_inertia(&self, shape: ShapeId, mass: f32) -> Vec3 {
        let Ok(shared) = self.shared_shape(shape) else {
            return Vec3::ZERO;
        };
        let unit = shared.mass_properties(1.0);
        if unit.mass() <= 0.0 {
            return Vec3::ZERO;
        }
        // Diagonal of the full tensor, so a rotated principal frame keeps body axes.
        let tensor = unit.reconstruct_inertia_matrix();
        Vec3::new(tensor[(0, 0)], tensor[(1, 1)], tensor[(2, 2)]) * (mass / unit.mass())
    }

    fn set_material(&mut self, body: BodyId, friction: f32, restitution: f32) {
        if let Some(collider) = self.collider_mut(body) {
            collider.set_friction(friction);
            collider.set_restitution(restitution);
        }
    }

    fn set_gravity_scale(&mut self, body: BodyId, scale: f32) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_gravity_scale(scale, true);
        }
    }

    fn set_collision_response(&mut self, body: BodyId, enabled: bool) {
        if let Some(collider) = self.collider_mut(body) {
            collider.set_sensor(!enabled);
        }
    }

    fn set_collision_events(&mut self, body: BodyId, enabled: bool) {
        if let Some(collider) = self.collider_mut(body) {
            collider.set_active_events(if enabled {
                ActiveEvents::COLLISION_EVENTS
            } else {
                ActiveEvents::empty()
            });
        }
    }

    fn set_rotation_locked(&mut self, body: BodyId, locked: bool) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.lock_rotations(locked, true);
        }
    }

    fn set_damping(&mut self, body: BodyId, linear: f32, angular: f32) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_linear_damping(linear);
            rb.set_angular_damping(angular);
        }
    }

    fn apply_central_force(&mut self, body: BodyId, force: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.add_force(to_vector(force), true);
        }
    }

    fn apply_central_impulse(&mut self, body: BodyId, impulse: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.apply_impulse(to_vector(impulse), true);
        }
    }

    fn apply_torque(&mut self, body: BodyId, torque: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.add_torque(to_vector(torque), true);
        }
    }

    fn apply_torque_impulse(&mut self, body: BodyId, impulse: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.apply_torque_impulse(to_vector(impulse), true);
        }
    }

    fn create_fixed_constraint(
        &mut self,
        body_a: BodyId,
        frame_a: Frame,
        body_b: BodyId,
        frame_b: Frame,
    ) -> PhysicsResult<ConstraintId> {
        let (Some(a), Some(b)) = (self.handles.get(&body_a), self.handles.get(&body_b)) else {
            return Err(PhysicsError::InvalidHandle(format!("{body_a:?} / {body_b:?}")));
        };
        let (rb_a, rb_b) = (a.rigid_body, b.rigid_body);
        let joint = GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES)
            .local_frame1(frame_isometry(frame_a))
            .local_frame2(frame_isometry(frame_b))
            .contacts_enabled(false)
            .build();
        let handle = self.impulse_joints.insert(rb_a, rb_b, joint, true);
        let id = ConstraintId(self.next_raw());
        self.constraints.insert(id, handle);
        Ok(id)
    }

    fn create_world_constraint(
        &mut self,
        body: BodyId,
        world_frame: Frame,
        locks: AxisLocks,
    ) -> PhysicsResult<ConstraintId> {
        let rb = self
            .handles
            .get(&body)
            .map(|e| e.rigid_body)
            .ok_or_else(|| PhysicsError::InvalidHandle(format!("{body:?}")))?;

        let axes = [
            (locks.linear[0], JointAxesMask::X),
            (locks.linear[1], JointAxesMask::Y),
            (locks.linear[2], JointAxesMask::Z),
            (locks.angular[0], JointAxesMask::ANG_X),
            (locks.angular[1], JointAxesMask::ANG_Y),
            (locks.angular[2], JointAxesMask::ANG_Z),
        ];
        let mask = axes
            .iter()
            .filter(|(locked, _)| *locked)
            .fold(JointAxesMask::empty(), |m, (_, axis)| m | *axis);
        if mask.is_empty() {
            return Err(PhysicsError::InvalidParameter("world constraint with no locked axis".into()));
        }

        let joint = GenericJointBuilder::new(mask)
            .local_frame1(frame_isometry(world_frame))
            .local_frame2(Isometry3::identity())
            .contacts_enabled(false)
            .build();
        let handle = self.impulse_joints.insert(self.world_anchor, rb, joint, true);
        let id = ConstraintId(self.next_raw());
        self.constraints.insert(id, handle);
        Ok(id)
    }

    fn recalculate_constraint(&mut self, constraint: ConstraintId) {
        let Some(handle) = self.constraints.get(&constraint).copied() else {
            return;
        };
        let Some((b1, b2)) = self.impulse_joints.get(handle).map(|j| (j.body1, j.body2)) else {
            return;
        };
        for rb in [b1, b2] {
            if let Some(rb) = self.bodies.get_mut(rb) {
                rb.wake_up(true);
            }
        }
    }

    fn destroy_constraint(&mut self, constraint: ConstraintId) {
        if let Some(handle) = self.constraints.remove(&constraint) {
            self.impulse_joints.remove(handle, true);
        }
    }

    fn has_constraint(&self, constraint: ConstraintId) -> bool {
        self.constraints
            .get(&constraint)
            .map(|h| self.impulse_joints.get(*h).is_some())
            .unwrap_or(false)
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = to_vector(gravity);
    }

    fn set_terrain(&mut self, terrain: &Terrain) -> PhysicsResult<()> {
        if let Some(old) = self.terrain.take() {
            self.colliders
                .remove(old, &mut self.island_manager, &mut self.bodies, true);
        }

        let rows = terrain.rows();
        let columns = terrain.columns();
        // Heightfield rows run along local Z, which the rotation below maps to -Y.
        let heights = DMatrix::from_fn(rows, columns, |i, j| terrain.sample(j, rows - 1 - i));
        let [size_x, size_y] = terrain.size();
        let position = Isometry3::from_parts(
            Translation3::new(size_x * 0.5, size_y * 0.5, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
        );

        let collider = ColliderBuilder::new(SharedShape::heightfield(heights, Vector3::new(size_x, 1.0, size_y)))
            .position(position)
            .friction(TERRAIN_FRICTION)
            .restitution(0.0)
            .user_data(TERRAIN_ID as u128)
            .build();
        self.terrain = Some(self.colliders.insert(collider));
        log::info!("terrain collider rebuilt ({columns}x{rows} samples over {size_x}x{size_y} m)");
        Ok(())
    }

    fn step_simulation(&mut self, dt: f32, max_substeps: u32, fixed_timestep: f32) -> StepOutput {
        let mut output = StepOutput::default();
        if !(dt.is_finite() && fixed_timestep > 0.0) {
            return output;
        }

        self.integration_parameters.dt = fixed_timestep;
        self.accumulator += dt.max(0.0);

        let max_substeps = max_substeps.max(1);
        while self.accumulator + 1.0e-6 >= fixed_timestep && output.substeps < max_substeps {
            self.step_once();
            self.accumulator -= fixed_timestep;
            output.substeps += 1;
        }
        if output.substeps == max_substeps {
            // Fell behind; drop the backlog instead of spiralling.
            self.accumulator = 0.0;
        }
        self.accumulator = self.accumulator.max(0.0);

        if output.substeps > 0 {
            // Forces applied through the adapter last for one tick.
            for (_, rb) in self.bodies.iter_mut() {
                rb.reset_forces(false);
                rb.reset_torques(false);
            }
            self.collect_updates(output.substeps as f32 * fixed_timestep, &mut output.updates);
            self.collect_collisions(&mut output.collisions);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn dynamic_box(engine: &mut RapierEngine, id: LocalId, at: Vec3) -> BodyId {
        let shape = engine
            .create_shape(&ShapeDesc::Box {
                half_extents: Vec3::splat(0.5),
            })
            .unwrap();
        let body = engine.create_body(id, shape, at, Quat::IDENTITY).unwrap();
        engine.set_body_type(body, BodyType::Dynamic);
        let inertia = engine.calculate_local_inertia(shape, 1.0);
        engine.set_mass_props(body, 1.0, inertia);
        engine.add_to_world(body);
        body
    }

    #[test]
    fn dynamic_body_falls_and_is_reported() {
        let mut engine = RapierEngine::default();
        let body = dynamic_box(&mut engine, 5, Vec3::new(0.0, 0.0, 10.0));

        let mut last = None;
        for _ in 0..30 {
            let out = engine.step_simulation(DT, 4, DT);
            assert_eq!(out.substeps, 1);
            last = out.updates.into_iter().find(|u| u.id == 5);
        }
        let update = last.expect("falling body reports properties");
        let (pos, _) = engine.transform(body).unwrap();
        assert!(pos.z < 10.0);
        assert!((update.position - pos).length() < 1e-5);
        assert!(update.velocity.z < 0.0);
    }

    #[test]
    fn removed_body_does_not_move() {
        let mut engine = RapierEngine::default();
        let body = dynamic_box(&mut engine, 1, Vec3::new(0.0, 0.0, 10.0));
        engine.remove_from_world(body);
        assert!(!engine.is_in_world(body));
        for _ in 0..10 {
            let out = engine.step_simulation(DT, 4, DT);
            assert!(out.updates.is_empty());
        }
        assert_eq!(engine.transform(body).unwrap().0, Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn substeps_accumulate_and_cap() {
        let mut engine = RapierEngine::default();
        assert_eq!(engine.step_simulation(DT * 0.5, 4, DT).substeps, 0);
        assert_eq!(engine.step_simulation(DT * 0.5, 4, DT).substeps, 1);
        assert_eq!(engine.step_simulation(DT * 10.0, 4, DT).substeps, 4);
        assert_eq!(engine.step_simulation(DT * 0.5, 4, DT).substeps, 0);
    }

    #[test]
    fn inertia_scales_with_mass() {
        let mut engine = RapierEngine::default();
        let shape = engine.create_shape(&ShapeDesc::Sphere { radius: 1.0 }).unwrap();
        let one = engine.calculate_local_inertia(shape, 1.0);
        let ten = engine.calculate_local_inertia(shape, 10.0);
        assert!((one.x - 0.4).abs() < 1e-4);
        assert!((ten.x - 4.0).abs() < 1e-3);
    }

    #[test]
    fn compound_collects_children_and_rejects_nesting() {
        let mut engine = RapierEngine::default();
        let part = engine.create_shape(&ShapeDesc::Box { half_extents: Vec3::ONE }).unwrap();
        let compound = engine.create_compound_shape();
        engine
            .add_child_shape_to_compound(compound, part, Vec3::X * 2.0, Quat::IDENTITY)
            .unwrap();
        engine
            .add_child_shape_to_compound(compound, part, -Vec3::X * 2.0, Quat::IDENTITY)
            .unwrap();
        assert_eq!(engine.compound_child_count(compound), 2);
        assert!(engine
            .add_child_shape_to_compound(part, compound, Vec3::ZERO, Quat::IDENTITY)
            .is_err());
        assert!(engine
            .add_child_shape_to_compound(compound, compound, Vec3::ZERO, Quat::IDENTITY)
            .is_err());

        // Off-center children make the compound harder to spin about Y/Z than one box.
        let single = engine.calculate_local_inertia(part, 2.0);
        let both = engine.calculate_local_inertia(compound, 2.0);
        assert!(both.max_element() > single.max_element());
    }

    #[test]
    fn degenerate_shapes_are_errors() {
        let mut engine = RapierEngine::default();
        assert!(engine.create_shape(&ShapeDesc::Sphere { radius: 0.0 }).is_err());
        assert!(engine
            .create_shape(&ShapeDesc::ConvexHull {
                points: vec![Vec3::ZERO, Vec3::X]
            })
            .is_err());
        assert!(engine
            .create_shape(&ShapeDesc::Cylinder {
                radius: 0.5,
                half_height: 1.0
            })
            .is_ok());
    }

    #[test]
    fn box_lands_on_terrain_and_collides() {
        let mut engine = RapierEngine::default();
        engine.set_terrain(&Terrain::flat([64.0, 64.0], 5.0, 0.0)).unwrap();
        let body = dynamic_box(&mut engine, 9, Vec3::new(32.0, 32.0, 7.0));
        engine.set_collision_events(body, true);

        let mut touched = false;
        for _ in 0..240 {
            let out = engine.step_simulation(DT, 4, DT);
            touched |= out
                .collisions
                .iter()
                .any(|c| (c.id_a == 9 && c.id_b == TERRAIN_ID) || (c.id_a == TERRAIN_ID && c.id_b == 9));
        }
        let (pos, _) = engine.transform(body).unwrap();
        assert!(touched);
        assert!((pos.z - 5.5).abs() < 0.1, "resting height {}", pos.z);
    }

    #[test]
    fn fixed_constraint_lifecycle() {
        let mut engine = RapierEngine::default();
        let a = dynamic_box(&mut engine, 1, Vec3::ZERO);
        let b = dynamic_box(&mut engine, 2, Vec3::X * 2.0);
        let c = engine
            .create_fixed_constraint(a, Frame::new(Vec3::X, Quat::IDENTITY), b, Frame::new(-Vec3::X, Quat::IDENTITY))
            .unwrap();
        assert!(engine.has_constraint(c));
        engine.recalculate_constraint(c);
        engine.destroy_constraint(c);
        assert!(!engine.has_constraint(c));

        let w = engine
            .create_world_constraint(a, Frame::IDENTITY, AxisLocks::from_angular_multiplier(Vec3::ZERO))
            .unwrap();
        engine.destroy_body(a);
        assert!(!engine.has_constraint(w));
        assert!(engine
            .create_world_constraint(b, Frame::IDENTITY, AxisLocks::FREE)
            .is_err());
    }
}
