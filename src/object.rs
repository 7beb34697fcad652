// src/object.rs
//! Simulator-facing physics object.
//!
//! A [`PhysObject`] is shared (`Arc`) with the rest of the simulator. It owns the
//! Raw state, the authoritative logical view that any thread can read without
//! touching the engine. Every setter follows the same pattern:
//!
//! 1. reject non-finite input (warn, return an error, no queue entry),
//! 2. write the Raw field so readers see the new value immediately,
//! 3. queue a typed [`ObjectOp`] that replays the change against the engine at
//!    the next taint pass.
//!
//! Engine-side state lives in [`crate::body::PhysBody`] and is only touched at
//! taint time.

use std::fmt;
use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::actors::hover::{HoverKind, HoverParams};
use crate::actors::move_to_target::MoveTarget;
use crate::actors::vehicle::{VehicleFlags, VehicleOp, VehicleParam, VehicleType};
use crate::config::PhysicsConfig;
use crate::engine::AxisLocks;
use crate::error::{PhysicsError, PhysicsResult};
use crate::material::MaterialKind;
use crate::math::{is_finite_quat, is_finite_vec, sanitize_quat};
use crate::taint::TaintSender;
use crate::world::Taint;

/// Simulator-assigned object id. `0` is reserved for the terrain.
pub type LocalId = u32;

/// Default avatar bounding size (width, depth, height).
pub const DEFAULT_AVATAR_SIZE: Vec3 = Vec3::new(0.45, 0.6, 1.9);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Avatar,
    Prim,
}

/// Base geometry of a prim. Size scales it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimShape {
    #[default]
    Box,
    Sphere,
    Cylinder,
    /// Convex hull of a mesh asset, points normalized to a unit cube.
    Mesh { asset: u64 },
}

/// Everything needed to bring an object into the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDesc {
    pub id: LocalId,
    pub position: Vec3,
    pub orientation: Quat,
    pub size: Vec3,
    pub shape: PrimShape,
    pub material: MaterialKind,
    pub physical: bool,
    pub phantom: bool,
    /// Fixed mass instead of density times volume.
    pub mass: Option<f32>,
}

impl ObjectDesc {
    pub fn prim(id: LocalId, position: Vec3, size: Vec3) -> Self {
        Self {
            id,
            position,
            orientation: Quat::IDENTITY,
            size,
            shape: PrimShape::Box,
            material: MaterialKind::default(),
            physical: false,
            phantom: false,
            mass: None,
        }
    }

    pub fn avatar(id: LocalId, position: Vec3) -> Self {
        Self {
            size: DEFAULT_AVATAR_SIZE,
            material: MaterialKind::Avatar,
            physical: true,
            ..Self::prim(id, position, DEFAULT_AVATAR_SIZE)
        }
    }

    pub fn with_shape(mut self, shape: PrimShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_material(mut self, material: MaterialKind) -> Self {
        self.material = material;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn physical(mut self, physical: bool) -> Self {
        self.physical = physical;
        self
    }

    pub fn phantom(mut self, phantom: bool) -> Self {
        self.phantom = phantom;
        self
    }
}

/// The logical (simulator) view of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct RawState {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub acceleration: Vec3,
    /// Persistent force, applied every step while non-zero.
    pub force: Vec3,
    /// Persistent torque, applied every step while non-zero.
    pub torque: Vec3,

    pub size: Vec3,
    pub shape: PrimShape,
    pub mass: f32,
    pub mass_override: Option<f32>,
    pub material: MaterialKind,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub buoyancy: f32,
    pub gravity_modifier: f32,

    pub is_physical: bool,
    pub is_selected: bool,
    pub is_phantom: bool,
    pub is_volume_detect: bool,

    // avatar
    pub flying: bool,
    pub target_velocity: Vec3,

    pub axis_locks: AxisLocks,
    pub vehicle_type: VehicleType,
    /// Collision report interval; `None` when not subscribed.
    pub subscribed_ms: Option<u32>,

    pub is_colliding: bool,
    pub colliding_ground: bool,
    pub colliding_object: bool,

    /// Root of the linkset this object belongs to (itself when it is a root).
    pub linkset_root: Option<LocalId>,
}

impl RawState {
    fn from_desc(kind: ObjectKind, desc: &ObjectDesc, config: &PhysicsConfig) -> Self {
        let attributes = desc.material.attributes();
        let (friction, restitution, density) = match kind {
            ObjectKind::Avatar => (config.avatar_friction, config.avatar_restitution, config.avatar_density),
            ObjectKind::Prim => (attributes.friction, attributes.restitution, attributes.density),
        };
        let mut raw = Self {
            position: desc.position,
            orientation: sanitize_quat(desc.orientation),
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            size: desc.size,
            shape: desc.shape,
            mass: 0.0,
            mass_override: desc.mass,
            material: desc.material,
            density,
            friction,
            restitution,
            buoyancy: 0.0,
            gravity_modifier: 1.0,
            is_physical: desc.physical || kind == ObjectKind::Avatar,
            is_selected: false,
            is_phantom: desc.phantom,
            is_volume_detect: false,
            flying: false,
            target_velocity: Vec3::ZERO,
            axis_locks: AxisLocks::FREE,
            vehicle_type: VehicleType::None,
            subscribed_ms: None,
            is_colliding: false,
            colliding_ground: false,
            colliding_object: false,
            linkset_root: None,
        };
        raw.recompute_mass(kind, config);
        raw
    }

    /// Avatar capsule dimensions `(radius, half_height of the cylinder part)`.
    pub fn capsule_dimensions(&self) -> (f32, f32) {
        let radius = (self.size.x.max(self.size.y) * 0.5).max(0.01);
        let half_height = (self.size.z * 0.5 - radius).max(0.01);
        (radius, half_height)
    }

    pub fn volume(&self, kind: ObjectKind) -> f32 {
        use std::f32::consts::PI;
        let s = self.size;
        match kind {
            ObjectKind::Avatar => {
                let (r, hh) = self.capsule_dimensions();
                PI * r * r * (2.0 * hh) + 4.0 / 3.0 * PI * r * r * r
            }
            ObjectKind::Prim => match self.shape {
                PrimShape::Box | PrimShape::Mesh { .. } => s.x * s.y * s.z,
                PrimShape::Sphere => 4.0 / 3.0 * PI * (s.x * 0.5) * (s.y * 0.5) * (s.z * 0.5),
                PrimShape::Cylinder => PI * (s.x * 0.5) * (s.y * 0.5) * s.z,
            },
        }
    }

    pub fn recompute_mass(&mut self, kind: ObjectKind, config: &PhysicsConfig) {
        let mass = self
            .mass_override
            .unwrap_or_else(|| self.density * self.volume(kind));
        self.mass = config.clamp_mass(mass);
    }
}

/// Engine mutations, replayed at taint time in submission order.
pub enum ObjectOp {
    Create(Arc<PhysObject>),
    Destroy,
    Position(Vec3),
    Orientation(Quat),
    Velocity(Vec3),
    AngularVelocity(Vec3),
    /// Persistent force changed (raw already holds it).
    Force(Vec3),
    /// Persistent torque changed.
    Torque(Vec3),
    AddForce(Vec3),
    AddTorque(Vec3),
    Impulse(Vec3),
    AngularImpulse(Vec3),
    /// Re-derive body type, material, gravity and mass from Raw.
    PhysicalParameters,
    /// Size or base shape changed: rebuild the body.
    Shape,
    Subscribe(u32),
    Unsubscribe,
    TargetVelocity(Vec3),
    AxisLocks(AxisLocks),
    MoveToTarget(Option<MoveTarget>),
    Hover(Option<HoverParams>),
    Vehicle(VehicleOp),
}

impl fmt::Debug for ObjectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectOp::Create(object) => write!(f, "Create({})", object.id()),
            ObjectOp::Destroy => f.write_str("Destroy"),
            ObjectOp::Position(v) => write!(f, "Position({v})"),
            ObjectOp::Orientation(q) => write!(f, "Orientation({q})"),
            ObjectOp::Velocity(v) => write!(f, "Velocity({v})"),
            ObjectOp::AngularVelocity(v) => write!(f, "AngularVelocity({v})"),
            ObjectOp::Force(v) => write!(f, "Force({v})"),
            ObjectOp::Torque(v) => write!(f, "Torque({v})"),
            ObjectOp::AddForce(v) => write!(f, "AddForce({v})"),
            ObjectOp::AddTorque(v) => write!(f, "AddTorque({v})"),
            ObjectOp::Impulse(v) => write!(f, "Impulse({v})"),
            ObjectOp::AngularImpulse(v) => write!(f, "AngularImpulse({v})"),
            ObjectOp::PhysicalParameters => f.write_str("PhysicalParameters"),
            ObjectOp::Shape => f.write_str("Shape"),
            ObjectOp::Subscribe(ms) => write!(f, "Subscribe({ms})"),
            ObjectOp::Unsubscribe => f.write_str("Unsubscribe"),
            ObjectOp::TargetVelocity(v) => write!(f, "TargetVelocity({v})"),
            ObjectOp::AxisLocks(l) => write!(f, "AxisLocks({l:?})"),
            ObjectOp::MoveToTarget(t) => write!(f, "MoveToTarget({t:?})"),
            ObjectOp::Hover(h) => write!(f, "Hover({h:?})"),
            ObjectOp::Vehicle(v) => write!(f, "Vehicle({v:?})"),
        }
    }
}

/// Shared, thread-safe physics object handle.
pub struct PhysObject {
    id: LocalId,
    kind: ObjectKind,
    raw: RwLock<RawState>,
    config: Arc<PhysicsConfig>,
    taints: TaintSender<Taint>,
}

impl fmt::Debug for PhysObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysObject")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PhysObject {
    pub(crate) fn new(
        kind: ObjectKind,
        desc: &ObjectDesc,
        config: Arc<PhysicsConfig>,
        taints: TaintSender<Taint>,
    ) -> Self {
        let raw = RawState::from_desc(kind, desc, &config);
        Self {
            id: desc.id,
            kind,
            raw: RwLock::new(raw),
            config,
            taints,
        }
    }

    #[inline]
    pub fn id(&self) -> LocalId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[inline]
    pub fn is_avatar(&self) -> bool {
        self.kind == ObjectKind::Avatar
    }

    /// Snapshot of the whole Raw state.
    pub fn raw(&self) -> RawState {
        self.raw.read().clone()
    }

    /// Read a few fields under one lock.
    pub fn with_raw<R>(&self, f: impl FnOnce(&RawState) -> R) -> R {
        f(&self.raw.read())
    }

    /// Taint-time write access for engine updates.
    pub(crate) fn write_raw(&self) -> RwLockWriteGuard<'_, RawState> {
        self.raw.write()
    }

    pub fn position(&self) -> Vec3 {
        self.raw.read().position
    }

    pub fn orientation(&self) -> Quat {
        self.raw.read().orientation
    }

    pub fn velocity(&self) -> Vec3 {
        self.raw.read().velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.raw.read().angular_velocity
    }

    pub fn acceleration(&self) -> Vec3 {
        self.raw.read().acceleration
    }

    pub fn mass(&self) -> f32 {
        self.raw.read().mass
    }

    pub fn size(&self) -> Vec3 {
        self.raw.read().size
    }

    pub fn is_physical(&self) -> bool {
        self.raw.read().is_physical
    }

    pub fn is_colliding(&self) -> bool {
        self.raw.read().is_colliding
    }

    pub fn is_colliding_with_ground(&self) -> bool {
        self.raw.read().colliding_ground
    }

    /// Physical and not held by an editor.
    pub fn is_physically_active(&self) -> bool {
        let raw = self.raw.read();
        self.kind == ObjectKind::Avatar || (raw.is_physical && !raw.is_selected)
    }

    pub fn linkset_root(&self) -> Option<LocalId> {
        self.raw.read().linkset_root
    }

    // ------------------------------------------------------------------
    // plumbing
    // ------------------------------------------------------------------

    #[inline]
    fn submit(&self, name: &'static str, op: ObjectOp) {
        self.taints.submit(name, Taint::Object { id: self.id, op });
    }

    fn reject(&self, what: &'static str, value: &dyn fmt::Debug) -> PhysicsError {
        log::warn!("object {}: rejecting non-finite {what} {value:?}", self.id);
        PhysicsError::NonFinite { what, id: self.id }
    }

    fn check_vec(&self, what: &'static str, v: Vec3) -> PhysicsResult<()> {
        if is_finite_vec(v) {
            Ok(())
        } else {
            Err(self.reject(what, &v))
        }
    }

    fn check_scalar(&self, what: &'static str, v: f32) -> PhysicsResult<()> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(self.reject(what, &v))
        }
    }

    fn set_parameter(&self, name: &'static str, f: impl FnOnce(&mut RawState)) {
        {
            let mut raw = self.raw.write();
            f(&mut raw);
            raw.recompute_mass(self.kind, &self.config);
        }
        self.submit(name, ObjectOp::PhysicalParameters);
    }

    // ------------------------------------------------------------------
    // transform & motion
    // ------------------------------------------------------------------

    pub fn set_position(&self, position: Vec3) -> PhysicsResult<()> {
        self.check_vec("position", position)?;
        self.raw.write().position = position;
        self.submit("SetPosition", ObjectOp::Position(position));
        Ok(())
    }

    pub fn set_orientation(&self, orientation: Quat) -> PhysicsResult<()> {
        if !is_finite_quat(orientation) {
            return Err(self.reject("orientation", &orientation));
        }
        let orientation = sanitize_quat(orientation);
        self.raw.write().orientation = orientation;
        self.submit("SetOrientation", ObjectOp::Orientation(orientation));
        Ok(())
    }

    pub fn set_velocity(&self, velocity: Vec3) -> PhysicsResult<()> {
        self.check_vec("velocity", velocity)?;
        self.raw.write().velocity = velocity;
        self.submit("SetVelocity", ObjectOp::Velocity(velocity));
        Ok(())
    }

    pub fn set_angular_velocity(&self, velocity: Vec3) -> PhysicsResult<()> {
        self.check_vec("angular velocity", velocity)?;
        self.raw.write().angular_velocity = velocity;
        self.submit("SetAngularVelocity", ObjectOp::AngularVelocity(velocity));
        Ok(())
    }

    // ------------------------------------------------------------------
    // forces
    // ------------------------------------------------------------------

    /// Persistent force, applied every step until set back to zero.
    pub fn set_force(&self, force: Vec3) -> PhysicsResult<()> {
        self.check_vec("force", force)?;
        self.raw.write().force = force;
        self.submit("SetForce", ObjectOp::Force(force));
        Ok(())
    }

    /// Persistent torque, applied every step until set back to zero.
    pub fn set_torque(&self, torque: Vec3) -> PhysicsResult<()> {
        self.check_vec("torque", torque)?;
        self.raw.write().torque = torque;
        self.submit("SetTorque", ObjectOp::Torque(torque));
        Ok(())
    }

    /// One-shot force for the next step. A push force is delivered as an
    /// impulse instead.
    pub fn add_force(&self, force: Vec3, push: bool) -> PhysicsResult<()> {
        self.check_vec("force", force)?;
        if push {
            self.submit("AddForce", ObjectOp::Impulse(force));
        } else {
            self.submit("AddForce", ObjectOp::AddForce(force));
        }
        Ok(())
    }

    pub fn add_angular_force(&self, torque: Vec3) -> PhysicsResult<()> {
        self.check_vec("angular force", torque)?;
        self.submit("AddAngularForce", ObjectOp::AddTorque(torque));
        Ok(())
    }

    pub fn apply_impulse(&self, impulse: Vec3) -> PhysicsResult<()> {
        self.check_vec("impulse", impulse)?;
        self.submit("ApplyImpulse", ObjectOp::Impulse(impulse));
        Ok(())
    }

    pub fn apply_angular_impulse(&self, impulse: Vec3) -> PhysicsResult<()> {
        self.check_vec("angular impulse", impulse)?;
        self.submit("ApplyAngularImpulse", ObjectOp::AngularImpulse(impulse));
        Ok(())
    }

    // ------------------------------------------------------------------
    // physical parameters
    // ------------------------------------------------------------------

    pub fn set_material(&self, material: MaterialKind) {
        let attributes = material.attributes();
        let avatar = self.is_avatar();
        self.set_parameter("SetMaterial", |raw| {
            raw.material = material;
            if !avatar {
                raw.friction = attributes.friction;
                raw.restitution = attributes.restitution;
                raw.density = attributes.density;
            }
        });
    }

    pub fn set_density(&self, density: f32) -> PhysicsResult<()> {
        self.check_scalar("density", density)?;
        self.set_parameter("SetDensity", |raw| raw.density = density.max(0.0));
        Ok(())
    }

    pub fn set_friction(&self, friction: f32) -> PhysicsResult<()> {
        self.check_scalar("friction", friction)?;
        self.set_parameter("SetFriction", |raw| raw.friction = friction.max(0.0));
        Ok(())
    }

    pub fn set_restitution(&self, restitution: f32) -> PhysicsResult<()> {
        self.check_scalar("restitution", restitution)?;
        self.set_parameter("SetRestitution", |raw| raw.restitution = restitution.clamp(0.0, 1.0));
        Ok(())
    }

    /// 0 = normal weight, 1 = weightless, values in between scale gravity.
    pub fn set_buoyancy(&self, buoyancy: f32) -> PhysicsResult<()> {
        self.check_scalar("buoyancy", buoyancy)?;
        self.set_parameter("SetBuoyancy", |raw| raw.buoyancy = buoyancy.clamp(-1.0, 1.0));
        Ok(())
    }

    pub fn set_gravity_modifier(&self, modifier: f32) -> PhysicsResult<()> {
        self.check_scalar("gravity modifier", modifier)?;
        self.set_parameter("SetGravityModifier", |raw| raw.gravity_modifier = modifier);
        Ok(())
    }

    pub fn set_physical(&self, physical: bool) {
        if self.is_avatar() {
            return;
        }
        self.set_parameter("SetPhysical", |raw| raw.is_physical = physical);
    }

    pub fn set_selected(&self, selected: bool) {
        self.set_parameter("SetSelected", |raw| raw.is_selected = selected);
    }

    pub fn set_phantom(&self, phantom: bool) {
        self.set_parameter("SetPhantom", |raw| raw.is_phantom = phantom);
    }

    pub fn set_volume_detect(&self, volume_detect: bool) {
        self.set_parameter("SetVolumeDetect", |raw| raw.is_volume_detect = volume_detect);
    }

    pub fn set_size(&self, size: Vec3) -> PhysicsResult<()> {
        self.check_vec("size", size)?;
        if size.min_element() <= 0.0 {
            log::warn!("object {}: rejecting non-positive size {size}", self.id);
            return Err(PhysicsError::InvalidParameter(format!("size {size}")));
        }
        {
            let mut raw = self.raw.write();
            raw.size = size;
            raw.recompute_mass(self.kind, &self.config);
        }
        self.submit("SetSize", ObjectOp::Shape);
        Ok(())
    }

    pub fn set_shape(&self, shape: PrimShape) {
        {
            let mut raw = self.raw.write();
            raw.shape = shape;
            raw.recompute_mass(self.kind, &self.config);
        }
        self.submit("SetShape", ObjectOp::Shape);
    }

    // ------------------------------------------------------------------
    // avatar movement
    // ------------------------------------------------------------------

    pub fn set_target_velocity(&self, velocity: Vec3) -> PhysicsResult<()> {
        self.check_vec("target velocity", velocity)?;
        self.raw.write().target_velocity = velocity;
        self.submit("SetTargetVelocity", ObjectOp::TargetVelocity(velocity));
        Ok(())
    }

    pub fn set_flying(&self, flying: bool) {
        self.set_parameter("SetFlying", |raw| raw.flying = flying);
    }

    // ------------------------------------------------------------------
    // collisions
    // ------------------------------------------------------------------

    /// Report collisions at most every `interval_ms` (0 uses the scene default).
    pub fn subscribe_events(&self, interval_ms: u32) {
        let interval = if interval_ms == 0 {
            self.config.default_collision_interval_ms
        } else {
            interval_ms
        };
        self.raw.write().subscribed_ms = Some(interval);
        self.submit("SubscribeEvents", ObjectOp::Subscribe(interval));
    }

    pub fn unsubscribe_events(&self) {
        self.raw.write().subscribed_ms = None;
        self.submit("UnsubscribeEvents", ObjectOp::Unsubscribe);
    }

    pub fn is_subscribed(&self) -> bool {
        self.raw.read().subscribed_ms.is_some()
    }

    // ------------------------------------------------------------------
    // actor-backed behaviors
    // ------------------------------------------------------------------

    /// Lock rotation about the axes whose multiplier component is zero.
    pub fn lock_angular_motion(&self, axis: Vec3) -> PhysicsResult<()> {
        self.check_vec("angular lock", axis)?;
        self.set_axis_locks(AxisLocks::from_angular_multiplier(axis));
        Ok(())
    }

    pub fn set_axis_locks(&self, locks: AxisLocks) {
        self.raw.write().axis_locks = locks;
        self.submit("SetAxisLocks", ObjectOp::AxisLocks(locks));
    }

    pub fn move_to_target(&self, target: Vec3, tau: f32) -> PhysicsResult<()> {
        self.check_vec("move target", target)?;
        self.check_scalar("move tau", tau)?;
        self.submit("MoveToTarget", ObjectOp::MoveToTarget(Some(MoveTarget { target, tau })));
        Ok(())
    }

    pub fn stop_move_to_target(&self) {
        self.submit("StopMoveToTarget", ObjectOp::MoveToTarget(None));
    }

    pub fn set_hover(&self, height: f32, kind: HoverKind, tau: f32) -> PhysicsResult<()> {
        self.check_scalar("hover height", height)?;
        self.check_scalar("hover tau", tau)?;
        self.submit("SetHover", ObjectOp::Hover(Some(HoverParams { height, kind, tau })));
        Ok(())
    }

    pub fn stop_hover(&self) {
        self.submit("StopHover", ObjectOp::Hover(None));
    }

    // ------------------------------------------------------------------
    // vehicles
    // ------------------------------------------------------------------

    pub fn set_vehicle_type(&self, vehicle_type: VehicleType) {
        self.raw.write().vehicle_type = vehicle_type;
        self.submit("SetVehicleType", ObjectOp::Vehicle(VehicleOp::Type(vehicle_type)));
    }

    pub fn set_vehicle_float_param(&self, param: VehicleParam, value: f32) -> PhysicsResult<()> {
        self.check_scalar("vehicle parameter", value)?;
        self.submit("SetVehicleFloatParam", ObjectOp::Vehicle(VehicleOp::Float(param, value)));
        Ok(())
    }

    pub fn set_vehicle_vector_param(&self, param: VehicleParam, value: Vec3) -> PhysicsResult<()> {
        self.check_vec("vehicle parameter", value)?;
        self.submit("SetVehicleVectorParam", ObjectOp::Vehicle(VehicleOp::Vector(param, value)));
        Ok(())
    }

    pub fn set_vehicle_rotation_param(&self, param: VehicleParam, value: Quat) -> PhysicsResult<()> {
        if !is_finite_quat(value) {
            return Err(self.reject("vehicle rotation", &value));
        }
        self.submit(
            "SetVehicleRotationParam",
            ObjectOp::Vehicle(VehicleOp::Rotation(param, sanitize_quat(value))),
        );
        Ok(())
    }

    pub fn set_vehicle_flags(&self, flags: VehicleFlags) {
        self.submit("SetVehicleFlags", ObjectOp::Vehicle(VehicleOp::SetFlags(flags)));
    }

    pub fn remove_vehicle_flags(&self, flags: VehicleFlags) {
        self.submit("RemoveVehicleFlags", ObjectOp::Vehicle(VehicleOp::RemoveFlags(flags)));
    }

    // ------------------------------------------------------------------
    // linking
    // ------------------------------------------------------------------

    pub fn link_to(&self, root: LocalId) {
        self.taints.submit("Link", Taint::Link { child: self.id, root });
    }

    pub fn delink(&self) {
        self.taints.submit("Delink", Taint::Delink { child: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taint::TaintQueue;

    fn prim(queue: &TaintQueue<Taint>) -> PhysObject {
        PhysObject::new(
            ObjectKind::Prim,
            &ObjectDesc::prim(7, Vec3::new(10.0, 10.0, 30.0), Vec3::splat(0.5)),
            Arc::new(PhysicsConfig::default()),
            queue.sender(),
        )
    }

    fn drained(queue: &TaintQueue<Taint>) -> Vec<String> {
        queue
            .begin_pass()
            .map(|e| match e.payload {
                Taint::Object { op, .. } => format!("{}:{op:?}", e.name),
                other => format!("{}:{other:?}", e.name),
            })
            .collect()
    }

    #[test]
    fn setter_writes_raw_before_the_engine_sees_it() {
        let queue = TaintQueue::new();
        let obj = prim(&queue);
        obj.set_position(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(obj.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(queue.pending(), 1);
        assert_eq!(drained(&queue), vec!["SetPosition:Position([1, 2, 3])".to_string()]);
    }

    #[test]
    fn non_finite_input_is_rejected_without_queueing() {
        let queue = TaintQueue::new();
        let obj = prim(&queue);
        let err = obj.set_velocity(Vec3::new(f32::NAN, 0.0, 0.0)).unwrap_err();
        assert!(err.is_non_finite());
        assert!(obj.add_force(Vec3::new(0.0, f32::INFINITY, 0.0), false).is_err());
        assert!(obj.set_orientation(Quat::from_xyzw(f32::NAN, 0.0, 0.0, 1.0)).is_err());
        assert_eq!(obj.velocity(), Vec3::ZERO);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn material_derives_friction_density_and_mass() {
        let queue = TaintQueue::new();
        let obj = prim(&queue);
        obj.set_material(MaterialKind::Metal);
        let raw = obj.raw();
        let metal = MaterialKind::Metal.attributes();
        assert_eq!(raw.friction, metal.friction);
        assert_eq!(raw.restitution, metal.restitution);
        assert!((raw.mass - metal.density * 0.125).abs() < 1e-3);
        assert_eq!(drained(&queue), vec!["SetMaterial:PhysicalParameters".to_string()]);
    }

    #[test]
    fn mass_override_survives_resizing() {
        let queue = TaintQueue::new();
        let obj = PhysObject::new(
            ObjectKind::Prim,
            &ObjectDesc::prim(3, Vec3::ZERO, Vec3::ONE).with_mass(10.0),
            Arc::new(PhysicsConfig::default()),
            queue.sender(),
        );
        assert_eq!(obj.mass(), 10.0);
        obj.set_size(Vec3::splat(2.0)).unwrap();
        assert_eq!(obj.mass(), 10.0);
        assert!(obj.set_size(Vec3::new(1.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn avatars_are_always_physical_capsules() {
        let queue = TaintQueue::new();
        let config = PhysicsConfig::default();
        let avatar = PhysObject::new(
            ObjectKind::Avatar,
            &ObjectDesc::avatar(9, Vec3::new(5.0, 5.0, 25.0)),
            Arc::new(config.clone()),
            queue.sender(),
        );
        avatar.set_physical(false);
        assert!(avatar.is_physical());
        assert!(avatar.is_physically_active());
        let (radius, half_height) = avatar.raw().capsule_dimensions();
        assert!((radius - 0.3).abs() < 1e-6);
        assert!((half_height - 0.65).abs() < 1e-6);
        assert!(avatar.mass() > 0.0 && avatar.mass() < 10.0);
        assert_eq!(avatar.raw().friction, config.avatar_friction);
    }

    #[test]
    fn push_force_becomes_an_impulse() {
        let queue = TaintQueue::new();
        let obj = prim(&queue);
        obj.add_force(Vec3::X, true).unwrap();
        obj.add_force(Vec3::Y, false).unwrap();
        assert_eq!(
            drained(&queue),
            vec!["AddForce:Impulse([1, 0, 0])".to_string(), "AddForce:AddForce([0, 1, 0])".to_string()]
        );
    }
}
