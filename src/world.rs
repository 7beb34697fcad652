// src/world.rs
//! Taint-time half of a scene.
//!
//! [`TaintWorld`] owns the engine and every [`PhysBody`], actor collection and
//! linkset. Nothing outside the stepping thread ever holds it: objects talk to
//! it only by submitting [`Taint`] commands, which the scene replays here at
//! the safe points of a tick.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::RwLock;

use crate::actors::{
    ActorCollection, ActorCtx, ActorKind, AvatarMoveActor, HoverActor, LockAxisActor, MoveToTargetActor, PhysActor,
    PreStepRegistry, SetForceActor, SetTorqueActor, VehicleActor, VehicleOp, VehicleType,
};
use crate::body::{MeshAssets, NativeShape, PhysBody};
use crate::collision::ContactInfo;
use crate::config::PhysicsConfig;
use crate::engine::{CollisionRecord, EntityProperties, PhysicsEngine, StepOutput, TERRAIN_ID};
use crate::error::{PhysicsError, PhysicsResult};
use crate::linkset::{Linkset, LinksetCtx, Linksets, RebuildOutcome};
use crate::math::{is_finite_quat, is_finite_vec, EPSILON};
use crate::object::{LocalId, ObjectKind, ObjectOp, PhysObject};
use crate::scene::SceneEvent;
use crate::taint::{TaintEntry, TaintSender};
use crate::terrain::Terrain;

/// Host code run at taint time through [`crate::PhysicsScene::submit_custom`].
pub type CustomTaint = Box<dyn FnOnce(&mut TaintWorld) + Send>;

/// Everything that may be queued for taint time.
pub enum Taint {
    Object { id: LocalId, op: ObjectOp },
    Link { child: LocalId, root: LocalId },
    Delink { child: LocalId },
    RebuildLinkset { root: LocalId },
    RefreshActor { id: LocalId, kind: ActorKind },
    MeshReady { asset: u64 },
    Terrain(Box<Terrain>),
    Custom(CustomTaint),
}

impl fmt::Debug for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Taint::Object { id, op } => write!(f, "Object({id}, {op:?})"),
            Taint::Link { child, root } => write!(f, "Link({child} -> {root})"),
            Taint::Delink { child } => write!(f, "Delink({child})"),
            Taint::RebuildLinkset { root } => write!(f, "RebuildLinkset({root})"),
            Taint::RefreshActor { id, kind } => write!(f, "RefreshActor({id}, {kind:?})"),
            Taint::MeshReady { asset } => write!(f, "MeshReady({asset})"),
            Taint::Terrain(_) => f.write_str("Terrain"),
            Taint::Custom(_) => f.write_str("Custom"),
        }
    }
}

pub struct TaintWorld {
    engine: Box<dyn PhysicsEngine>,
    config: Arc<PhysicsConfig>,
    taints: TaintSender<Taint>,
    bodies: HashMap<LocalId, PhysBody>,
    actors: HashMap<LocalId, ActorCollection>,
    pre_step: PreStepRegistry,
    linksets: Linksets,
    terrain: Terrain,
    mesh_assets: Arc<RwLock<MeshAssets>>,
    /// Subscribed objects with contacts to deliver (or an end-of-collision).
    reporting: BTreeSet<LocalId>,
    events: Vec<SceneEvent>,
    step: u64,
    elapsed: f64,
}

impl TaintWorld {
    pub(crate) fn new(
        engine: Box<dyn PhysicsEngine>,
        config: Arc<PhysicsConfig>,
        taints: TaintSender<Taint>,
        mesh_assets: Arc<RwLock<MeshAssets>>,
    ) -> Self {
        let terrain = Terrain::flat(config.region_size, config.default_terrain_height, config.water_height);
        Self {
            engine,
            config,
            taints,
            bodies: HashMap::new(),
            actors: HashMap::new(),
            pre_step: PreStepRegistry::default(),
            linksets: Linksets::default(),
            terrain,
            mesh_assets,
            reporting: BTreeSet::new(),
            events: Vec::new(),
            step: 0,
            elapsed: 0.0,
        }
    }

    /// Push gravity and the initial terrain. Taint time only.
    pub(crate) fn initialize(&mut self) -> PhysicsResult<()> {
        self.guard("Initialize")?;
        self.engine.set_gravity(Vec3::new(0.0, 0.0, self.config.gravity));
        self.engine.set_terrain(&self.terrain)?;
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    #[inline]
    pub fn engine(&self) -> &dyn PhysicsEngine {
        self.engine.as_ref()
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn body(&self, id: LocalId) -> Option<&PhysBody> {
        self.bodies.get(&id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &PhysBody> + '_ {
        self.bodies.values()
    }

    pub fn linksets(&self) -> &Linksets {
        &self.linksets
    }

    pub fn linkset(&self, id: LocalId) -> Option<&Linkset> {
        self.linksets.get(self.linksets.root_of(id)?)
    }

    /// Sum of member masses of the linkset containing `id`.
    pub fn linkset_mass(&self, id: LocalId) -> Option<f32> {
        Some(self.linkset(id)?.mass(&self.bodies))
    }

    pub fn linkset_center_of_mass(&self, id: LocalId) -> Option<Vec3> {
        Some(self.linkset(id)?.center_of_mass(&self.bodies))
    }

    pub fn pre_step(&self) -> &PreStepRegistry {
        &self.pre_step
    }

    pub fn has_actor(&self, id: LocalId, kind: ActorKind) -> bool {
        self.actors.get(&id).is_some_and(|a| a.has(kind))
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Simulated milliseconds since the scene started.
    pub fn now_ms(&self) -> u64 {
        (self.elapsed * 1000.0) as u64
    }

    /// Simulator position derived from the engine body.
    pub fn engine_position(&self, id: LocalId) -> Option<Vec3> {
        self.bodies.get(&id)?.engine_position(self.engine.as_ref())
    }

    // ========================================================================
    // GUARDED ENGINE ACCESS
    // ========================================================================

    #[inline]
    pub fn in_taint_time(&self) -> bool {
        self.taints.in_taint_time()
    }

    fn guard(&self, what: &'static str) -> PhysicsResult<()> {
        if self.taints.assert_in_taint_time(what) {
            Ok(())
        } else {
            Err(PhysicsError::NotInTaintTime(what))
        }
    }

    pub fn engine_mut(&mut self) -> PhysicsResult<&mut dyn PhysicsEngine> {
        self.guard("EngineAccess")?;
        Ok(self.engine.as_mut())
    }

    /// Taint time, known object, engine body present.
    fn forceable(&self, what: &'static str, id: LocalId) -> PhysicsResult<()> {
        self.guard(what)?;
        let body = self.bodies.get(&id).ok_or(PhysicsError::UnknownObject(id))?;
        if !body.has_physical_body() {
            return Err(PhysicsError::NoPhysicalBody(id));
        }
        Ok(())
    }

    pub fn force_position(&mut self, id: LocalId, position: Vec3) -> PhysicsResult<()> {
        if !is_finite_vec(position) {
            return Err(PhysicsError::NonFinite { what: "position", id });
        }
        self.forceable("ForcePosition", id)?;
        self.with_body(id, |body, engine| body.force_position(engine, position));
        self.child_moved(id);
        Ok(())
    }

    pub fn force_orientation(&mut self, id: LocalId, orientation: Quat) -> PhysicsResult<()> {
        if !is_finite_quat(orientation) {
            return Err(PhysicsError::NonFinite { what: "orientation", id });
        }
        self.forceable("ForceOrientation", id)?;
        self.with_body(id, |body, engine| body.force_orientation(engine, orientation.normalize()));
        self.child_moved(id);
        Ok(())
    }

    pub fn force_velocity(&mut self, id: LocalId, velocity: Vec3) -> PhysicsResult<()> {
        if !is_finite_vec(velocity) {
            return Err(PhysicsError::NonFinite { what: "velocity", id });
        }
        self.forceable("ForceVelocity", id)?;
        self.with_body(id, |body, engine| body.force_velocity(engine, velocity));
        Ok(())
    }

    pub fn force_angular_velocity(&mut self, id: LocalId, velocity: Vec3) -> PhysicsResult<()> {
        if !is_finite_vec(velocity) {
            return Err(PhysicsError::NonFinite {
                what: "angular velocity",
                id,
            });
        }
        self.forceable("ForceAngularVelocity", id)?;
        self.with_body(id, |body, engine| body.force_angular_velocity(engine, velocity));
        Ok(())
    }

    // ========================================================================
    // BORROW HELPERS
    // ========================================================================

    fn with_body(&mut self, id: LocalId, f: impl FnOnce(&mut PhysBody, &mut dyn PhysicsEngine)) {
        if let Some(body) = self.bodies.get_mut(&id) {
            f(body, self.engine.as_mut());
        }
    }

    fn with_actors<R>(
        &mut self,
        id: LocalId,
        f: impl FnOnce(&mut ActorCollection, &mut ActorCtx<'_>) -> R,
    ) -> Option<R> {
        let body = self.bodies.get_mut(&id)?;
        let actors = self.actors.entry(id).or_default();
        let mut ctx = ActorCtx {
            engine: self.engine.as_mut(),
            body,
            config: &self.config,
            terrain: &self.terrain,
            pre_step: &mut self.pre_step,
            taints: &self.taints,
        };
        Some(f(actors, &mut ctx))
    }

    fn with_linkset<R>(&mut self, root: LocalId, f: impl FnOnce(&mut Linkset, &mut LinksetCtx<'_>) -> R) -> Option<R> {
        let linkset = self.linksets.get_mut(root)?;
        let mut ctx = LinksetCtx {
            engine: self.engine.as_mut(),
            bodies: &mut self.bodies,
            config: &self.config,
            taints: &self.taints,
        };
        Some(f(linkset, &mut ctx))
    }

    // ========================================================================
    // TAINT EXECUTION
    // ========================================================================

    pub(crate) fn execute(&mut self, entry: TaintEntry<Taint>) {
        log::trace!("taint #{} {}: {:?}", entry.seq, entry.name, entry.payload);
        match entry.payload {
            Taint::Object { id, op } => self.execute_object(id, op),
            Taint::Link { child, root } => self.link(child, root),
            Taint::Delink { child } => self.delink(child),
            Taint::RebuildLinkset { root } => self.rebuild_linkset(root),
            Taint::RefreshActor { id, kind } => {
                self.with_actors(id, |actors, ctx| actors.refresh(kind, ctx));
            }
            Taint::MeshReady { asset } => self.mesh_ready(asset),
            Taint::Terrain(terrain) => self.replace_terrain(*terrain),
            Taint::Custom(f) => f(self),
        }
    }

    fn execute_object(&mut self, id: LocalId, op: ObjectOp) {
        let op = match op {
            ObjectOp::Create(object) => return self.create_object(object),
            ObjectOp::Destroy => return self.destroy_object(id),
            op => op,
        };
        if !self.bodies.contains_key(&id) {
            // Destroyed between submission and drain.
            log::debug!("taint {op:?} for object {id} that no longer exists");
            return;
        }

        // A child merged into a compound has no body of its own in the world.
        let merged_into = self
            .bodies
            .get(&id)
            .filter(|b| b.is_ghosted())
            .and_then(|_| self.linksets.parent_of(id));
        if let Some(root) = merged_into {
            match &op {
                ObjectOp::AddForce(_)
                | ObjectOp::AddTorque(_)
                | ObjectOp::Impulse(_)
                | ObjectOp::AngularImpulse(_) => {
                    log::debug!("object {id}: {op:?} applied to linkset root {root}");
                    return self.execute_object(root, op);
                }
                ObjectOp::Velocity(_) | ObjectOp::AngularVelocity(_) => {
                    log::debug!("object {id}: {op:?} ignored, body is merged into linkset {root}");
                    return;
                }
                _ => {}
            }
        }

        match op {
            ObjectOp::Create(_) | ObjectOp::Destroy => {}
            ObjectOp::Position(position) => {
                self.with_body(id, |body, engine| body.force_position(engine, position));
                self.child_moved(id);
            }
            ObjectOp::Orientation(orientation) => {
                self.with_body(id, |body, engine| body.force_orientation(engine, orientation));
                self.child_moved(id);
            }
            ObjectOp::Velocity(velocity) => self.with_body(id, |body, engine| body.force_velocity(engine, velocity)),
            ObjectOp::AngularVelocity(velocity) => {
                self.with_body(id, |body, engine| body.force_angular_velocity(engine, velocity))
            }
            ObjectOp::Force(force) => {
                self.with_actors(id, |actors, ctx| {
                    if let Some(actor) = actors.enable_actor(!is_zero(force), SetForceActor::new) {
                        actor.refresh(ctx);
                    }
                });
            }
            ObjectOp::Torque(torque) => {
                self.with_actors(id, |actors, ctx| {
                    if let Some(actor) = actors.enable_actor(!is_zero(torque), SetTorqueActor::new) {
                        actor.refresh(ctx);
                    }
                });
            }
            ObjectOp::AddForce(force) => self.with_body(id, |body, engine| body.apply_central_force(engine, force)),
            ObjectOp::AddTorque(torque) => self.with_body(id, |body, engine| body.apply_torque(engine, torque)),
            ObjectOp::Impulse(impulse) => {
                self.with_body(id, |body, engine| body.apply_central_impulse(engine, impulse))
            }
            ObjectOp::AngularImpulse(impulse) => {
                self.with_body(id, |body, engine| body.apply_torque_impulse(engine, impulse))
            }
            ObjectOp::PhysicalParameters => self.update_physical_parameters(id),
            ObjectOp::Shape => self.rebuild_body(id),
            ObjectOp::Subscribe(interval_ms) => self.with_body(id, |body, engine| {
                body.collisions.subscribe(interval_ms);
                if let Some(handle) = body.handle() {
                    engine.set_collision_events(handle, true);
                }
            }),
            ObjectOp::Unsubscribe => {
                self.reporting.remove(&id);
                self.with_body(id, |body, engine| {
                    body.collisions.unsubscribe();
                    let keep = body.kind() == ObjectKind::Avatar || body.object().with_raw(|raw| raw.is_volume_detect);
                    if let Some(handle) = body.handle() {
                        engine.set_collision_events(handle, keep);
                    }
                });
            }
            ObjectOp::TargetVelocity(_) => {
                self.with_actors(id, |actors, ctx| {
                    let avatar = ctx.body.kind() == ObjectKind::Avatar;
                    let time_scale = ctx.config.avatar_velocity_timescale;
                    if let Some(actor) = actors.enable_actor(avatar, || AvatarMoveActor::new(time_scale)) {
                        actor.refresh(ctx);
                    }
                });
            }
            ObjectOp::AxisLocks(locks) => {
                self.with_actors(id, |actors, ctx| {
                    if let Some(actor) = actors.enable_actor(!locks.all_free(), LockAxisActor::new) {
                        actor.refresh(ctx);
                    }
                });
            }
            ObjectOp::MoveToTarget(target) => {
                self.with_actors(id, |actors, ctx| {
                    if let Some(actor) = actors.enable_actor(target.is_some(), MoveToTargetActor::new) {
                        if let Some(target) = target {
                            actor.set_target(target);
                        }
                        actor.refresh(ctx);
                    }
                });
            }
            ObjectOp::Hover(params) => {
                self.with_actors(id, |actors, ctx| {
                    if let Some(actor) = actors.enable_actor(params.is_some(), HoverActor::new) {
                        if let Some(params) = params {
                            actor.set_params(params);
                        }
                        actor.refresh(ctx);
                    }
                });
            }
            ObjectOp::Vehicle(op) => {
                let wanted = !matches!(op, VehicleOp::Type(VehicleType::None));
                self.with_actors(id, |actors, ctx| {
                    if let Some(actor) = actors.enable_actor(wanted, VehicleActor::new) {
                        actor.apply(op);
                        let has_type = actor.vehicle_type() != VehicleType::None;
                        actor.set_enabled(has_type);
                        actor.refresh(ctx);
                    }
                });
            }
        }
    }

    // ========================================================================
    // OBJECT LIFECYCLE
    // ========================================================================

    fn create_object(&mut self, object: Arc<PhysObject>) {
        let id = object.id();
        if self.bodies.contains_key(&id) {
            log::warn!("object {id} created twice, replacing the old body");
            self.destroy_object(id);
        }
        let mut body = PhysBody::new(object);
        self.build_body(&mut body);
        let avatar = body.kind() == ObjectKind::Avatar;
        self.bodies.insert(id, body);

        if avatar {
            self.with_actors(id, |actors, ctx| {
                let time_scale = ctx.config.avatar_velocity_timescale;
                if let Some(actor) = actors.enable_actor(true, || AvatarMoveActor::new(time_scale)) {
                    actor.refresh(ctx);
                }
            });
        }
        log::debug!("object {id} created");
    }

    /// Native shape, engine body and parameters. A body waiting on a mesh
    /// asset stays without an engine body until [`Taint::MeshReady`].
    fn build_body(&mut self, body: &mut PhysBody) {
        let assets = Arc::clone(&self.mesh_assets);
        let engine = self.engine.as_mut();
        if body.build_native_shape(engine, &assets.read()) && body.create_engine_body(engine) {
            body.update_physical_parameters(engine, &self.config);
        }
    }

    fn destroy_object(&mut self, id: LocalId) {
        if self.linksets.is_root(id) {
            self.dissolve_linkset(id);
        } else if let Some(root) = self.linksets.parent_of(id) {
            self.remove_from_linkset(root, id);
        }
        self.with_actors(id, |actors, ctx| actors.dispose_all(ctx));
        self.actors.remove(&id);
        self.pre_step.remove_object(id);
        self.reporting.remove(&id);
        match self.bodies.remove(&id) {
            Some(mut body) => {
                body.destroy_engine_body(self.engine.as_mut());
                log::debug!("object {id} destroyed");
            }
            None => log::debug!("destroy of unknown object {id}"),
        }
    }

    fn update_physical_parameters(&mut self, id: LocalId) {
        let config = Arc::clone(&self.config);
        self.with_body(id, |body, engine| body.update_physical_parameters(engine, &config));
        self.with_actors(id, |actors, ctx| actors.refresh_all(ctx));
        self.schedule_linkset_rebuild(id);
    }

    /// Size or shape changed: release everything tied to the old body and
    /// build a new one.
    fn rebuild_body(&mut self, id: LocalId) {
        self.with_actors(id, |actors, ctx| actors.remove_body_dependencies(ctx));
        let root = self.linksets.root_of(id);
        if let Some(root) = root {
            self.with_linkset(root, |linkset, ctx| linkset.revert(ctx));
        }

        let Some(mut body) = self.bodies.remove(&id) else {
            return;
        };
        body.destroy_engine_body(self.engine.as_mut());
        self.build_body(&mut body);
        self.bodies.insert(id, body);

        self.with_actors(id, |actors, ctx| actors.refresh_all(ctx));
        if let Some(root) = root {
            self.with_linkset(root, |linkset, ctx| linkset.schedule_rebuild(ctx.taints));
        }
    }

    fn mesh_ready(&mut self, asset: u64) {
        let waiting: Vec<LocalId> = self
            .bodies
            .values()
            .filter(|b| b.native_shape == NativeShape::Pending(asset))
            .map(PhysBody::id)
            .collect();
        log::debug!("mesh asset {asset} ready, {} objects waiting", waiting.len());
        for id in waiting {
            self.rebuild_body(id);
        }
    }

    fn replace_terrain(&mut self, terrain: Terrain) {
        self.terrain = terrain;
        match self.engine.set_terrain(&self.terrain) {
            Ok(()) => log::info!("terrain replaced ({}x{} samples)", self.terrain.columns(), self.terrain.rows()),
            Err(e) => log::error!("terrain rejected by the engine: {e}"),
        }
    }

    // ========================================================================
    // LINKSETS
    // ========================================================================

    fn link(&mut self, child: LocalId, root: LocalId) {
        if !self.bodies.contains_key(&child) || !self.bodies.contains_key(&root) {
            log::debug!("link {child} -> {root}: object no longer exists");
            return;
        }
        // Linking to a child joins that child's linkset.
        let root = self.linksets.root_of(root).unwrap_or(root);
        if child == root {
            return;
        }
        if let Some(current) = self.linksets.parent_of(child) {
            if current == root {
                return;
            }
            self.remove_from_linkset(current, child);
        }

        // A root brings its own children along.
        let mut joining = vec![child];
        if let Some(old) = self.linksets.get(child) {
            joining.extend(old.children());
            self.dissolve_linkset(child);
        }

        self.linksets.entry(root, self.config.linkset_kind);
        for member in joining {
            let added = self
                .with_linkset(root, |linkset, ctx| linkset.add_child(member, ctx))
                .unwrap_or(false);
            if added {
                self.linksets.set_parent(member, root);
            }
        }
    }

    fn delink(&mut self, child: LocalId) {
        if let Some(root) = self.linksets.parent_of(child) {
            self.remove_from_linkset(root, child);
        } else if self.linksets.is_root(child) {
            self.dissolve_linkset(child);
        } else {
            log::debug!("delink {child}: not in a linkset");
        }
    }

    fn remove_from_linkset(&mut self, root: LocalId, child: LocalId) {
        let removed = self
            .with_linkset(root, |linkset, ctx| linkset.remove_child(child, ctx))
            .unwrap_or(false);
        if removed {
            self.linksets.clear_parent(child);
        }
    }

    /// Every child becomes independent again.
    fn dissolve_linkset(&mut self, root: LocalId) {
        self.with_linkset(root, |linkset, ctx| linkset.revert(ctx));
        let Some(linkset) = self.linksets.remove(root) else {
            return;
        };
        for id in linkset.members() {
            if let Some(body) = self.bodies.get(&id) {
                body.object().write_raw().linkset_root = None;
            }
        }
        log::debug!("linkset {root} dissolved");
    }

    fn rebuild_linkset(&mut self, root: LocalId) {
        let Some(outcome) = self.with_linkset(root, |linkset, ctx| linkset.rebuild(ctx)) else {
            log::debug!("rebuild of linkset {root} that no longer exists");
            return;
        };
        let empty = self.linksets.get(root).is_some_and(|l| !l.has_children());
        if outcome == RebuildOutcome::Reverted && empty {
            self.dissolve_linkset(root);
        }
    }

    /// A linkset child was moved from outside: re-capture its offset.
    fn child_moved(&mut self, id: LocalId) {
        if let Some(root) = self.linksets.parent_of(id) {
            self.with_linkset(root, |linkset, ctx| linkset.child_moved(id, ctx));
        }
    }

    fn schedule_linkset_rebuild(&mut self, id: LocalId) {
        if let Some(root) = self.linksets.root_of(id) {
            self.with_linkset(root, |linkset, ctx| linkset.schedule_rebuild(ctx.taints));
        }
    }

    // ========================================================================
    // PER-TICK STAGES
    // ========================================================================

    /// Run every registered pre-step action. Returns how many ran.
    pub(crate) fn run_pre_step(&mut self, dt: f32) -> usize {
        let mut ran = 0;
        for (id, kind) in self.pre_step.snapshot() {
            // An earlier action this step may have unregistered it.
            if !self.pre_step.is_registered(id, kind) {
                continue;
            }
            let fired = self.with_actors(id, |actors, ctx| match actors.get_mut(kind) {
                Some(actor) => {
                    actor.before_step(ctx, dt);
                    true
                }
                None => false,
            });
            if fired == Some(true) {
                ran += 1;
            } else {
                log::debug!("dropping stale pre-step {kind:?} of object {id}");
                self.pre_step.unregister(id, kind);
            }
        }
        ran
    }

    pub(crate) fn step_engine(&mut self, dt: f32) -> StepOutput {
        self.step += 1;
        self.elapsed += f64::from(dt);
        self.engine
            .step_simulation(dt, self.config.max_substeps, self.config.fixed_timestep)
    }

    /// Copy engine results into Raw and fan root motion out to children.
    pub(crate) fn update_properties(&mut self, updates: &[EntityProperties]) -> usize {
        let mut applied = 0;
        for props in updates {
            let Some(body) = self.bodies.get_mut(&props.id) else {
                continue;
            };
            if body.is_ghosted() {
                continue;
            }
            body.update_properties(self.engine.as_mut(), props, &self.terrain);
            self.events.push(SceneEvent::Updated { id: props.id });
            applied += 1;

            if let Some(linkset) = self.linksets.get(props.id) {
                if linkset.propagate_root_update(&self.bodies) {
                    self.events
                        .extend(linkset.children().map(|id| SceneEvent::Updated { id }));
                }
            }
        }
        applied
    }

    /// Feed contacts to the trackers, refresh collision flags and deliver
    /// due reports. Returns the number of reports delivered.
    pub(crate) fn process_collisions(&mut self, records: &[CollisionRecord]) -> usize {
        let step = self.step;
        for record in records {
            if record.id_a != TERRAIN_ID {
                if let Some(body) = self.bodies.get_mut(&record.id_a) {
                    body.collisions.record(
                        step,
                        ContactInfo {
                            other: record.id_b,
                            point: record.point,
                            normal: record.normal,
                            depth: record.depth,
                        },
                    );
                }
            }
            if record.id_b != TERRAIN_ID {
                if let Some(body) = self.bodies.get_mut(&record.id_b) {
                    body.collisions.record(
                        step,
                        ContactInfo {
                            other: record.id_a,
                            point: record.point,
                            normal: -record.normal,
                            depth: record.depth,
                        },
                    );
                }
            }
        }

        for (id, body) in &self.bodies {
            let (colliding, ground, object) = body.collisions.flags(step);
            {
                let mut raw = body.object().write_raw();
                raw.is_colliding = colliding;
                raw.colliding_ground = ground;
                raw.colliding_object = object;
            }
            if body.collisions.is_subscribed() && !body.collisions.pending().is_empty() {
                self.reporting.insert(*id);
            }
        }

        let now = self.now_ms();
        let mut delivered = 0;
        let mut finished = Vec::new();
        for id in &self.reporting {
            let Some(body) = self.bodies.get_mut(id) else {
                finished.push(*id);
                continue;
            };
            let outcome = body.collisions.send(now, step);
            if let Some(contacts) = outcome.report {
                self.events.push(SceneEvent::Collisions { id: *id, contacts });
                delivered += 1;
            }
            if !outcome.keep_reporting {
                finished.push(*id);
            }
        }
        for id in finished {
            self.reporting.remove(&id);
        }
        delivered
    }

    pub(crate) fn extreme_sanity_checks(&mut self) -> usize {
        let engine = self.engine.as_mut();
        let mut corrected = 0;
        for body in self.bodies.values_mut() {
            if body.extreme_sanity_check(engine, &self.terrain, &self.config) {
                corrected += 1;
            }
        }
        corrected
    }

    pub(crate) fn take_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }
}

#[inline]
fn is_zero(v: Vec3) -> bool {
    v.length_squared() < EPSILON * EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::engine::recording::{RecState, RecordingEngine};
    use crate::object::ObjectDesc;
    use crate::taint::TaintQueue;

    struct Fixture {
        queue: TaintQueue<Taint>,
        world: TaintWorld,
        config: Arc<PhysicsConfig>,
    }

    impl Fixture {
        fn new() -> (Self, Arc<Mutex<RecState>>) {
            let config = Arc::new(PhysicsConfig::default());
            let queue = TaintQueue::new();
            let engine = RecordingEngine::new();
            let observer = engine.handle();
            let world = TaintWorld::new(
                Box::new(engine),
                Arc::clone(&config),
                queue.sender(),
                Arc::new(RwLock::new(MeshAssets::new())),
            );
            (Self { queue, world, config }, observer)
        }

        fn add(&self, kind: ObjectKind, desc: ObjectDesc) -> Arc<PhysObject> {
            let object = Arc::new(PhysObject::new(kind, &desc, Arc::clone(&self.config), self.queue.sender()));
            self.queue.sender().submit(
                "Create",
                Taint::Object {
                    id: desc.id,
                    op: ObjectOp::Create(Arc::clone(&object)),
                },
            );
            object
        }

        fn drain(&mut self) {
            for entry in self.queue.begin_pass() {
                self.world.execute(entry);
            }
            for entry in self.queue.begin_post_pass() {
                self.world.execute(entry);
            }
        }
    }

    #[test]
    fn taints_for_destroyed_objects_are_ignored() {
        let (mut f, _) = Fixture::new();
        let object = f.add(ObjectKind::Prim, ObjectDesc::prim(3, Vec3::new(5.0, 5.0, 30.0), Vec3::ONE));
        object.set_velocity(Vec3::X).unwrap();
        f.queue.sender().submit("Destroy", Taint::Object { id: 3, op: ObjectOp::Destroy });
        object.set_position(Vec3::new(6.0, 5.0, 30.0)).unwrap();
        f.drain();
        assert!(f.world.body(3).is_none());
    }

    #[test]
    fn avatars_start_with_a_movement_actor() {
        let (mut f, _) = Fixture::new();
        f.add(ObjectKind::Avatar, ObjectDesc::avatar(8, Vec3::new(128.0, 128.0, 23.0)));
        f.drain();
        assert!(f.world.has_actor(8, ActorKind::AvatarMove));
        assert!(f.world.pre_step().is_registered(8, ActorKind::AvatarMove));
    }

    #[test]
    fn persistent_force_registers_and_clears_its_actor() {
        let (mut f, _) = Fixture::new();
        let object = f.add(
            ObjectKind::Prim,
            ObjectDesc::prim(4, Vec3::new(5.0, 5.0, 30.0), Vec3::ONE).physical(true),
        );
        object.set_force(Vec3::new(0.0, 0.0, 20.0)).unwrap();
        f.drain();
        assert!(f.world.pre_step().is_registered(4, ActorKind::SetForce));

        object.set_force(Vec3::ZERO).unwrap();
        f.drain();
        assert!(!f.world.pre_step().is_registered(4, ActorKind::SetForce));
        assert!(f.world.has_actor(4, ActorKind::SetForce));
    }

    #[test]
    fn forced_access_checks_the_object() {
        let (mut f, observer) = Fixture::new();
        f.add(
            ObjectKind::Prim,
            ObjectDesc::prim(5, Vec3::new(5.0, 5.0, 30.0), Vec3::ONE).physical(true),
        );
        f.drain();

        let _taint_time = f.queue.enter_taint_time();
        assert!(matches!(
            f.world.force_position(99, Vec3::ZERO),
            Err(PhysicsError::UnknownObject(99))
        ));
        assert!(f.world.force_position(5, Vec3::NAN).unwrap_err().is_non_finite());

        f.world.force_position(5, Vec3::new(7.0, 5.0, 30.0)).unwrap();
        let state = observer.lock();
        let (_, rec) = state.body_of(5).unwrap();
        assert_eq!(rec.position, Vec3::new(7.0, 5.0, 30.0));
    }

    #[test]
    fn pending_mesh_builds_when_the_asset_arrives() {
        let (mut f, _) = Fixture::new();
        f.add(
            ObjectKind::Prim,
            ObjectDesc::prim(6, Vec3::new(5.0, 5.0, 30.0), Vec3::ONE)
                .with_shape(crate::object::PrimShape::Mesh { asset: 77 }),
        );
        f.drain();
        assert!(!f.world.body(6).unwrap().has_physical_body());

        f.world.mesh_assets.write().insert(
            77,
            vec![
                Vec3::new(-0.5, -0.5, -0.5),
                Vec3::new(0.5, -0.5, -0.5),
                Vec3::new(0.0, 0.5, -0.5),
                Vec3::new(0.0, 0.0, 0.5),
            ],
        );
        f.queue.sender().submit("MeshReady", Taint::MeshReady { asset: 77 });
        f.drain();
        assert!(f.world.body(6).unwrap().has_physical_body());
    }
}
