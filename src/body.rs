// src/body.rs
//! Engine-side half of an object.
//!
//! A [`PhysBody`] lives inside the taint world and is only touched at taint
//! time. It owns the engine body and native shape handles, the displacement
//! between the simulator origin and the engine's center of mass, and the
//! collision tracker. Every `force_*` method writes Raw *and* the engine so the
//! two never disagree after a taint runs.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::collision::CollisionTracker;
use crate::config::PhysicsConfig;
use crate::engine::{BodyId, BodyType, EntityProperties, PhysicsEngine, ShapeDesc, ShapeId};
use crate::math::{clamp_length, is_finite_vec, EPSILON};
use crate::object::{LocalId, ObjectKind, PhysObject, PrimShape, RawState};
use crate::terrain::Terrain;

/// Points of hull assets, normalized to a unit cube, keyed by asset id.
pub type MeshAssets = HashMap<u64, Vec<Vec3>>;

/// Number of segments used when a cylinder has to be approximated.
const CYLINDER_SEGMENTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeShape {
    None,
    /// Waiting for a mesh asset.
    Pending(u64),
    Ready(ShapeId),
}

pub struct PhysBody {
    pub(crate) object: Arc<PhysObject>,
    pub(crate) body: Option<BodyId>,
    pub(crate) native_shape: NativeShape,
    /// Linkset compound currently installed on this body (roots only).
    pub(crate) compound_shape: Option<ShapeId>,
    /// Offset from the simulator origin to the engine origin, in body axes.
    pub(crate) displacement: Vec3,
    /// Member of a built compound: out of the world, no collision response.
    pub(crate) ghosted: bool,
    /// Mass to give the engine instead of the object's own (linkset members).
    pub(crate) linkset_mass: Option<f32>,
    pub(crate) collisions: CollisionTracker,
    pub(crate) last_good_position: Vec3,
    standing: bool,
}

impl PhysBody {
    pub fn new(object: Arc<PhysObject>) -> Self {
        let position = object.position();
        let mut collisions = CollisionTracker::default();
        if let Some(interval) = object.with_raw(|raw| raw.subscribed_ms) {
            collisions.subscribe(interval);
        }
        Self {
            object,
            body: None,
            native_shape: NativeShape::None,
            compound_shape: None,
            displacement: Vec3::ZERO,
            ghosted: false,
            linkset_mass: None,
            collisions,
            last_good_position: position,
            standing: false,
        }
    }

    #[inline]
    pub fn id(&self) -> LocalId {
        self.object.id()
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.object.kind()
    }

    #[inline]
    pub fn object(&self) -> &Arc<PhysObject> {
        &self.object
    }

    #[inline]
    pub fn handle(&self) -> Option<BodyId> {
        self.body
    }

    #[inline]
    pub fn has_physical_body(&self) -> bool {
        self.body.is_some()
    }

    #[inline]
    pub fn is_physically_active(&self) -> bool {
        self.object.is_physically_active()
    }

    #[inline]
    pub fn is_ghosted(&self) -> bool {
        self.ghosted
    }

    #[inline]
    pub fn displacement(&self) -> Vec3 {
        self.displacement
    }

    pub fn native_shape_id(&self) -> Option<ShapeId> {
        match self.native_shape {
            NativeShape::Ready(shape) => Some(shape),
            _ => None,
        }
    }

    /// Shape the engine body currently carries.
    pub fn current_shape(&self) -> Option<ShapeId> {
        self.compound_shape.or_else(|| self.native_shape_id())
    }

    /// Mass the engine should see for this body.
    pub fn engine_mass(&self) -> f32 {
        self.linkset_mass.unwrap_or_else(|| self.object.mass())
    }

    fn body_or_warn(&self, what: &str) -> Option<BodyId> {
        if self.body.is_none() {
            log::warn!("{what}: object {} has no physical body", self.id());
        }
        self.body
    }

    // ========================================================================
    // DISPLACEMENT
    // ========================================================================

    /// Simulator pose to engine position.
    #[inline]
    pub fn to_engine(&self, position: Vec3, orientation: Quat) -> Vec3 {
        position + orientation * self.displacement
    }

    /// Engine pose to simulator position.
    #[inline]
    pub fn from_engine(&self, position: Vec3, orientation: Quat) -> Vec3 {
        position - orientation * self.displacement
    }

    /// Change the displacement and push the Raw pose through the new offset.
    pub fn set_displacement(&mut self, engine: &mut dyn PhysicsEngine, displacement: Vec3) {
        self.displacement = displacement;
        let (position, orientation) = self.object.with_raw(|raw| (raw.position, raw.orientation));
        if let Some(body) = self.body {
            engine.set_transform(body, self.to_engine(position, orientation), orientation);
        }
    }

    /// Engine pose translated back to the simulator origin.
    pub fn engine_position(&self, engine: &dyn PhysicsEngine) -> Option<Vec3> {
        let (position, orientation) = engine.transform(self.body?)?;
        Some(self.from_engine(position, orientation))
    }

    // ========================================================================
    // SHAPE & BODY LIFECYCLE
    // ========================================================================

    fn shape_desc(kind: ObjectKind, raw: &RawState, assets: &MeshAssets) -> Result<ShapeDesc, u64> {
        let size = raw.size;
        let desc = match (kind, raw.shape) {
            (ObjectKind::Avatar, _) => {
                let (radius, half_height) = raw.capsule_dimensions();
                ShapeDesc::Capsule { radius, half_height }
            }
            (ObjectKind::Prim, PrimShape::Box) => ShapeDesc::Box {
                half_extents: size * 0.5,
            },
            (ObjectKind::Prim, PrimShape::Sphere) => ShapeDesc::Sphere {
                radius: size.max_element() * 0.5,
            },
            (ObjectKind::Prim, PrimShape::Cylinder) => ShapeDesc::Cylinder {
                radius: size.x.max(size.y) * 0.5,
                half_height: size.z * 0.5,
            },
            (ObjectKind::Prim, PrimShape::Mesh { asset }) => {
                let points = assets.get(&asset).ok_or(asset)?;
                ShapeDesc::ConvexHull {
                    points: points.iter().map(|p| *p * size).collect(),
                }
            }
        };
        Ok(desc)
    }

    /// Box stand-in used when the engine rejects the real shape.
    fn fallback_desc(raw: &RawState) -> ShapeDesc {
        ShapeDesc::Box {
            half_extents: (raw.size * 0.5).max(Vec3::splat(0.005)),
        }
    }

    /// Resolve the native shape. Returns `false` while a mesh is pending.
    pub(crate) fn build_native_shape(&mut self, engine: &mut dyn PhysicsEngine, assets: &MeshAssets) -> bool {
        if let NativeShape::Ready(_) = self.native_shape {
            return true;
        }
        let raw = self.object.raw();
        let desc = match Self::shape_desc(self.kind(), &raw, assets) {
            Ok(desc) => desc,
            Err(asset) => {
                log::debug!("object {}: waiting for mesh asset {asset}", self.id());
                self.native_shape = NativeShape::Pending(asset);
                return false;
            }
        };

        let shape = match engine.create_shape(&desc) {
            Ok(shape) => shape,
            Err(e) => {
                log::warn!("object {}: {e}, using a box", self.id());
                match engine.create_shape(&Self::fallback_desc(&raw)) {
                    Ok(shape) => shape,
                    Err(e) => {
                        log::error!("object {}: fallback shape failed: {e}", self.id());
                        self.native_shape = NativeShape::None;
                        return false;
                    }
                }
            }
        };
        self.native_shape = NativeShape::Ready(shape);
        true
    }

    /// Create the engine body from the native shape. The body starts out of
    /// the world; [`Self::update_physical_parameters`] adds it.
    pub(crate) fn create_engine_body(&mut self, engine: &mut dyn PhysicsEngine) -> bool {
        if self.body.is_some() {
            return true;
        }
        let Some(shape) = self.native_shape_id() else {
            return false;
        };
        let (position, orientation) = self.object.with_raw(|raw| (raw.position, raw.orientation));
        match engine.create_body(self.id(), shape, self.to_engine(position, orientation), orientation) {
            Ok(body) => {
                self.body = Some(body);
                true
            }
            Err(e) => {
                log::error!("object {}: body creation failed: {e}", self.id());
                false
            }
        }
    }

    /// Destroy the body and native shape. Linkset-owned compounds are not
    /// touched.
    pub(crate) fn destroy_engine_body(&mut self, engine: &mut dyn PhysicsEngine) {
        if let Some(body) = self.body.take() {
            engine.remove_from_world(body);
            engine.destroy_body(body);
        }
        if let NativeShape::Ready(shape) = self.native_shape {
            engine.destroy_shape(shape);
        }
        self.native_shape = NativeShape::None;
        self.compound_shape = None;
        self.displacement = Vec3::ZERO;
    }

    // ========================================================================
    // FORCE ACCESSORS (taint time, Raw + engine)
    // ========================================================================

    pub fn force_position(&mut self, engine: &mut dyn PhysicsEngine, position: Vec3) {
        let orientation = {
            let mut raw = self.object.write_raw();
            raw.position = position;
            raw.orientation
        };
        if let Some(body) = self.body_or_warn("ForcePosition") {
            engine.set_transform(body, self.to_engine(position, orientation), orientation);
        }
    }

    pub fn force_orientation(&mut self, engine: &mut dyn PhysicsEngine, orientation: Quat) {
        let position = {
            let mut raw = self.object.write_raw();
            raw.orientation = orientation;
            raw.position
        };
        if let Some(body) = self.body_or_warn("ForceOrientation") {
            engine.set_transform(body, self.to_engine(position, orientation), orientation);
        }
    }

    /// Push the Raw pose into the engine.
    pub fn force_transform_from_raw(&mut self, engine: &mut dyn PhysicsEngine) {
        let (position, orientation) = self.object.with_raw(|raw| (raw.position, raw.orientation));
        if let Some(body) = self.body {
            engine.set_transform(body, self.to_engine(position, orientation), orientation);
        }
    }

    pub fn force_velocity(&mut self, engine: &mut dyn PhysicsEngine, velocity: Vec3) {
        self.object.write_raw().velocity = velocity;
        if let Some(body) = self.body_or_warn("ForceVelocity") {
            engine.set_linear_velocity(body, velocity);
        }
    }

    pub fn force_angular_velocity(&mut self, engine: &mut dyn PhysicsEngine, velocity: Vec3) {
        self.object.write_raw().angular_velocity = velocity;
        if let Some(body) = self.body_or_warn("ForceAngularVelocity") {
            engine.set_angular_velocity(body, velocity);
        }
    }

    fn usable(&self, what: &str, v: Vec3) -> Option<BodyId> {
        if !is_finite_vec(v) {
            log::warn!("{what}: object {} dropping non-finite {v}", self.id());
            return None;
        }
        if v.length_squared() < EPSILON * EPSILON {
            return None;
        }
        self.body_or_warn(what)
    }

    pub fn apply_central_force(&mut self, engine: &mut dyn PhysicsEngine, force: Vec3) {
        if let Some(body) = self.usable("AddForce", force) {
            engine.apply_central_force(body, force);
        }
    }

    pub fn apply_central_impulse(&mut self, engine: &mut dyn PhysicsEngine, impulse: Vec3) {
        if let Some(body) = self.usable("ApplyImpulse", impulse) {
            engine.apply_central_impulse(body, impulse);
        }
    }

    pub fn apply_torque(&mut self, engine: &mut dyn PhysicsEngine, torque: Vec3) {
        if let Some(body) = self.usable("AddTorque", torque) {
            engine.apply_torque(body, torque);
        }
    }

    pub fn apply_torque_impulse(&mut self, engine: &mut dyn PhysicsEngine, impulse: Vec3) {
        if let Some(body) = self.usable("ApplyAngularImpulse", impulse) {
            engine.apply_torque_impulse(body, impulse);
        }
    }

    // ========================================================================
    // PHYSICAL PARAMETERS
    // ========================================================================

    /// Gravity scale when no vehicle overrides it.
    pub fn default_gravity_scale(&self) -> f32 {
        self.object.with_raw(|raw| {
            if self.kind() == ObjectKind::Avatar && raw.flying {
                0.0
            } else {
                raw.gravity_modifier * (1.0 - raw.buoyancy)
            }
        })
    }

    /// Avatar friction switch: high while standing still, low while moving.
    pub fn set_standing(&mut self, engine: &mut dyn PhysicsEngine, config: &PhysicsConfig, standing: bool) {
        if self.standing == standing {
            return;
        }
        self.standing = standing;
        if let Some(body) = self.body {
            let friction = if standing {
                config.avatar_standing_friction
            } else {
                config.avatar_friction
            };
            engine.set_material(body, friction, config.avatar_restitution);
        }
    }

    /// Push mass and inertia. The body must leave the world while its mass
    /// changes, so the order is always remove, set, add.
    pub fn update_physical_mass_properties(&mut self, engine: &mut dyn PhysicsEngine, mass: f32, in_world: bool) {
        let Some(body) = self.body_or_warn("UpdateMassProperties") else {
            return;
        };
        let Some(shape) = self.current_shape() else {
            return;
        };
        if in_world {
            engine.remove_from_world(body);
        }
        if self.is_physically_active() {
            let inertia = engine.calculate_local_inertia(shape, mass);
            engine.set_mass_props(body, mass, inertia);
        } else {
            engine.set_mass_props(body, 0.0, Vec3::ZERO);
        }
        if in_world && !self.ghosted {
            engine.add_to_world(body);
        }
    }

    /// Re-derive everything the engine knows about this body from Raw.
    pub fn update_physical_parameters(&mut self, engine: &mut dyn PhysicsEngine, config: &PhysicsConfig) {
        let Some(body) = self.body else {
            return;
        };
        let raw = self.object.raw();
        let avatar = self.kind() == ObjectKind::Avatar;
        let active = self.is_physically_active();

        engine.remove_from_world(body);

        engine.set_body_type(body, if active { BodyType::Dynamic } else { BodyType::Static });
        if avatar {
            let friction = if self.standing {
                config.avatar_standing_friction
            } else {
                config.avatar_friction
            };
            engine.set_material(body, friction, config.avatar_restitution);
            engine.set_rotation_locked(body, true);
        } else {
            engine.set_material(body, raw.friction, raw.restitution);
        }
        engine.set_gravity_scale(body, self.default_gravity_scale());

        let responds = avatar || !(raw.is_phantom || raw.is_volume_detect);
        engine.set_collision_response(body, responds && !self.ghosted);
        engine.set_collision_events(
            body,
            avatar || raw.is_volume_detect || self.collisions.is_subscribed(),
        );

        let mass = self.engine_mass();
        self.update_physical_mass_properties(engine, mass, false);

        if !active {
            engine.set_linear_velocity(body, Vec3::ZERO);
            engine.set_angular_velocity(body, Vec3::ZERO);
        }

        self.force_transform_from_raw(engine);
        if !self.ghosted {
            engine.add_to_world(body);
        }
    }

    /// Take a linkset child out of (or back into) the simulation.
    pub fn set_ghosted(&mut self, engine: &mut dyn PhysicsEngine, config: &PhysicsConfig, ghosted: bool) {
        if self.ghosted == ghosted {
            return;
        }
        self.ghosted = ghosted;
        let Some(body) = self.body else {
            return;
        };
        if ghosted {
            engine.remove_from_world(body);
            engine.set_collision_response(body, false);
        } else {
            self.update_physical_parameters(engine, config);
        }
    }

    // ========================================================================
    // SANITY CHECKS
    // ========================================================================

    /// Keep the object inside the region and above the terrain. Returns
    /// `true` when the position was corrected.
    pub fn position_sanity_check(&mut self, engine: &mut dyn PhysicsEngine, terrain: &Terrain) -> bool {
        if self.ghosted || !self.is_physically_active() {
            return false;
        }
        let (mut position, half_height, velocity) =
            self.object.with_raw(|raw| (raw.position, raw.size.z * 0.5, raw.velocity));
        let mut changed = false;

        if !terrain.is_within_bounds(position) {
            position = terrain.clamp_to_bounds(position);
            changed = true;
        }
        let ground = terrain.height_at(position.x, position.y);
        if position.z < ground {
            position.z = ground + half_height;
            changed = true;
        }

        if changed {
            log::debug!("object {}: sanity check moved it to {position}", self.id());
            self.force_position(engine, position);
            if velocity.z < 0.0 {
                self.force_velocity(engine, Vec3::new(velocity.x, velocity.y, 0.0));
            }
        }
        changed
    }

    /// Copy engine results into Raw, undoing the displacement first.
    pub fn update_properties(&mut self, engine: &mut dyn PhysicsEngine, props: &EntityProperties, terrain: &Terrain) {
        let position = self.from_engine(props.position, props.orientation);
        {
            let mut raw = self.object.write_raw();
            raw.position = position;
            raw.orientation = props.orientation;
            raw.velocity = props.velocity;
            raw.acceleration = props.acceleration;
            raw.angular_velocity = props.angular_velocity;
        }
        self.position_sanity_check(engine, terrain);
        self.last_good_position = self.object.position();
    }

    /// Recover objects that flew off or picked up absurd velocities. Returns
    /// `true` when anything was reset.
    pub fn extreme_sanity_check(
        &mut self,
        engine: &mut dyn PhysicsEngine,
        terrain: &Terrain,
        config: &PhysicsConfig,
    ) -> bool {
        if self.ghosted || self.body.is_none() || !self.is_physically_active() {
            return false;
        }
        let (position, velocity, angular, half_height) = self
            .object
            .with_raw(|raw| (raw.position, raw.velocity, raw.angular_velocity, raw.size.z * 0.5));

        let [size_x, size_y] = terrain.size();
        let margin = config.extreme_horizontal_margin;
        let lost = !is_finite_vec(position)
            || position.x < -margin
            || position.y < -margin
            || position.x > size_x + margin
            || position.y > size_y + margin
            || position.z < config.extreme_min_z
            || position.z > config.extreme_max_z;

        if lost {
            let reset = if is_finite_vec(self.last_good_position) && terrain.is_within_bounds(self.last_good_position) {
                self.last_good_position
            } else {
                terrain.center() + Vec3::Z * half_height
            };
            log::warn!("object {} at {position} is out of the world, resetting to {reset}", self.id());
            self.force_position(engine, reset);
            self.force_velocity(engine, Vec3::ZERO);
            self.force_angular_velocity(engine, Vec3::ZERO);
            return true;
        }

        let mut reset = false;
        if !is_finite_vec(velocity) || velocity.length() > config.max_linear_velocity {
            let clamped = if is_finite_vec(velocity) {
                clamp_length(velocity, config.max_linear_velocity)
            } else {
                Vec3::ZERO
            };
            log::warn!("object {}: clamping linear velocity {velocity}", self.id());
            self.force_velocity(engine, clamped);
            reset = true;
        }
        if !is_finite_vec(angular) || angular.length() > config.max_angular_velocity {
            let clamped = if is_finite_vec(angular) {
                clamp_length(angular, config.max_angular_velocity)
            } else {
                Vec3::ZERO
            };
            log::warn!("object {}: clamping angular velocity {angular}", self.id());
            self.force_angular_velocity(engine, clamped);
            reset = true;
        }
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::recording::{Call, RecordingEngine};
    use crate::object::ObjectDesc;
    use crate::taint::TaintQueue;
    use crate::world::Taint;

    struct Fixture {
        _queue: TaintQueue<Taint>,
        engine: RecordingEngine,
        config: PhysicsConfig,
        terrain: Terrain,
    }

    fn fixture() -> Fixture {
        let config = PhysicsConfig::default();
        let terrain = Terrain::flat(config.region_size, config.default_terrain_height, config.water_height);
        Fixture {
            _queue: TaintQueue::new(),
            engine: RecordingEngine::new(),
            config,
            terrain,
        }
    }

    fn built_body(f: &mut Fixture, desc: ObjectDesc) -> PhysBody {
        let object = Arc::new(PhysObject::new(
            ObjectKind::Prim,
            &desc,
            Arc::new(f.config.clone()),
            f._queue.sender(),
        ));
        let mut body = PhysBody::new(object);
        assert!(body.build_native_shape(&mut f.engine, &MeshAssets::new()));
        assert!(body.create_engine_body(&mut f.engine));
        body.update_physical_parameters(&mut f.engine, &f.config);
        body
    }

    #[test]
    fn mass_update_leaves_and_rejoins_the_world_around_the_change() {
        let mut f = fixture();
        let mut body = built_body(&mut f, ObjectDesc::prim(1, Vec3::new(10.0, 10.0, 30.0), Vec3::ONE).physical(true));
        let handle = body.handle().unwrap();
        f.engine.handle().lock().calls.clear();

        body.update_physical_mass_properties(&mut f.engine, 42.0, true);
        let calls = f.engine.handle().lock().calls_for(handle);
        assert_eq!(
            calls,
            vec![
                Call::RemoveFromWorld(handle),
                Call::SetMassProps(handle, 42.0),
                Call::AddToWorld(handle)
            ]
        );
    }

    #[test]
    fn displacement_round_trips_through_the_engine() {
        let mut f = fixture();
        let mut body = built_body(&mut f, ObjectDesc::prim(2, Vec3::new(50.0, 50.0, 30.0), Vec3::ONE).physical(true));
        body.set_displacement(&mut f.engine, Vec3::new(1.0, 0.0, 0.0));

        let handle = body.handle().unwrap();
        let (engine_pos, _) = f.engine.transform(handle).unwrap();
        assert_eq!(engine_pos, Vec3::new(51.0, 50.0, 30.0));

        body.force_position(&mut f.engine, Vec3::new(60.0, 60.0, 40.0));
        assert_eq!(body.engine_position(&f.engine), Some(Vec3::new(60.0, 60.0, 40.0)));
        assert_eq!(body.object().position(), Vec3::new(60.0, 60.0, 40.0));

        let rotated = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        body.force_orientation(&mut f.engine, rotated);
        let (engine_pos, _) = f.engine.transform(handle).unwrap();
        assert!((engine_pos - Vec3::new(60.0, 61.0, 40.0)).length() < 1e-4);
        assert!((body.engine_position(&f.engine).unwrap() - Vec3::new(60.0, 60.0, 40.0)).length() < 1e-4);
    }

    #[test]
    fn sanity_check_lifts_objects_out_of_the_ground() {
        let mut f = fixture();
        let mut body = built_body(&mut f, ObjectDesc::prim(3, Vec3::new(10.0, 10.0, 30.0), Vec3::ONE).physical(true));
        body.object().write_raw().position = Vec3::new(10.0, 10.0, 5.0);
        body.object().write_raw().velocity = Vec3::new(1.0, 0.0, -3.0);

        assert!(body.position_sanity_check(&mut f.engine, &f.terrain));
        assert_eq!(body.object().position(), Vec3::new(10.0, 10.0, 21.5));
        assert_eq!(body.object().velocity(), Vec3::new(1.0, 0.0, 0.0));
        assert!(!body.position_sanity_check(&mut f.engine, &f.terrain));
    }

    #[test]
    fn sanity_check_clamps_into_the_region() {
        let mut f = fixture();
        let mut body = built_body(&mut f, ObjectDesc::prim(4, Vec3::new(10.0, 10.0, 30.0), Vec3::ONE).physical(true));
        body.object().write_raw().position = Vec3::new(300.0, -2.0, 30.0);
        assert!(body.position_sanity_check(&mut f.engine, &f.terrain));
        assert_eq!(body.object().position(), Vec3::new(256.0, 0.0, 30.0));
    }

    #[test]
    fn extreme_check_resets_lost_objects_and_clamps_speed() {
        let mut f = fixture();
        let mut body = built_body(&mut f, ObjectDesc::prim(5, Vec3::new(10.0, 10.0, 30.0), Vec3::ONE).physical(true));
        body.object().write_raw().position = Vec3::new(10.0, 10.0, -5000.0);
        assert!(body.extreme_sanity_check(&mut f.engine, &f.terrain, &f.config));
        assert_eq!(body.object().position(), Vec3::new(10.0, 10.0, 30.0));

        body.object().write_raw().velocity = Vec3::new(0.0, 5000.0, 0.0);
        assert!(body.extreme_sanity_check(&mut f.engine, &f.terrain, &f.config));
        assert!((body.object().velocity().length() - f.config.max_linear_velocity).abs() < 1e-2);
        assert!(!body.extreme_sanity_check(&mut f.engine, &f.terrain, &f.config));
    }

    #[test]
    fn force_ops_without_a_body_are_harmless() {
        let f = fixture();
        let object = Arc::new(PhysObject::new(
            ObjectKind::Prim,
            &ObjectDesc::prim(6, Vec3::ZERO, Vec3::ONE),
            Arc::new(f.config.clone()),
            f._queue.sender(),
        ));
        let mut body = PhysBody::new(object);
        let mut engine = RecordingEngine::new();
        body.apply_central_force(&mut engine, Vec3::X);
        body.force_velocity(&mut engine, Vec3::Y);
        assert!(engine.handle().lock().calls.is_empty());
        assert_eq!(body.object().velocity(), Vec3::Y);
    }

    #[test]
    fn static_prims_get_zero_mass_and_phantoms_no_response() {
        let mut f = fixture();
        let body = built_body(&mut f, ObjectDesc::prim(7, Vec3::new(10.0, 10.0, 30.0), Vec3::ONE).phantom(true));
        let state = f.engine.handle();
        let state = state.lock();
        let rec = &state.bodies[&body.handle().unwrap()];
        assert_eq!(rec.mass, 0.0);
        assert_eq!(rec.body_type, BodyType::Static);
        assert!(!rec.collision_response);
        assert!(rec.in_world);
    }
}
