// src/scene.rs
//! Public entry point of the physics core.
//!
//! A [`PhysicsScene`] owns the taint queue and the [`TaintWorld`]; hosts keep
//! cheap [`SceneHandle`] clones to add objects and submit work from any
//! thread. One call to [`PhysicsScene::simulate`] is one tick:
//!
//! 1. drain ordinary taints
//! 2. run actor pre-step actions
//! 3. step the engine
//! 4. copy engine results back into Raw (linkset children follow their root)
//! 5. drain post-taints (linkset rebuilds)
//! 6. deliver collision reports
//! 7. extreme sanity check
//!
//! Nothing in a tick returns an error: a misbehaving object is logged and
//! skipped, the rest of the scene keeps running.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use crate::actors::ActorKind;
use crate::body::MeshAssets;
use crate::collision::ContactInfo;
use crate::config::PhysicsConfig;
use crate::engine::{PhysicsEngine, RapierEngine, TERRAIN_ID};
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::is_finite_vec;
use crate::object::{LocalId, ObjectDesc, ObjectKind, ObjectOp, PhysObject};
use crate::taint::{TaintQueue, TaintSender};
use crate::terrain::Terrain;
use crate::world::{Taint, TaintWorld};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// Contacts since the last report. Empty means the collisions ended.
    Collisions { id: LocalId, contacts: Vec<ContactInfo> },
    /// Raw state was refreshed from the engine.
    Updated { id: LocalId },
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub step: u64,
    pub taints: usize,
    pub post_taints: usize,
    pub pre_step_actions: usize,
    pub substeps: u32,
    pub updates: usize,
    pub collisions: usize,
    pub reports: usize,
    pub corrections: usize,
}

// ============================================================================
// HANDLE (any thread)
// ============================================================================

/// Cloneable, thread-safe access to a scene's objects and queue.
#[derive(Clone)]
pub struct SceneHandle {
    config: Arc<PhysicsConfig>,
    taints: TaintSender<Taint>,
    objects: Arc<RwLock<HashMap<LocalId, Arc<PhysObject>>>>,
    mesh_assets: Arc<RwLock<MeshAssets>>,
}

impl SceneHandle {
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn add_prim(&self, desc: ObjectDesc) -> PhysicsResult<Arc<PhysObject>> {
        self.add(ObjectKind::Prim, desc)
    }

    pub fn add_avatar(&self, desc: ObjectDesc) -> PhysicsResult<Arc<PhysObject>> {
        self.add(ObjectKind::Avatar, desc)
    }

    fn add(&self, kind: ObjectKind, desc: ObjectDesc) -> PhysicsResult<Arc<PhysObject>> {
        let id = desc.id;
        if id == TERRAIN_ID {
            return Err(PhysicsError::InvalidParameter(format!("object id {TERRAIN_ID} is the terrain")));
        }
        if !is_finite_vec(desc.position) {
            log::warn!("object {id}: rejecting non-finite start position {}", desc.position);
            return Err(PhysicsError::NonFinite { what: "position", id });
        }
        if !is_finite_vec(desc.size) || desc.size.min_element() <= 0.0 {
            return Err(PhysicsError::InvalidParameter(format!("object {id}: size {}", desc.size)));
        }

        let mut objects = self.objects.write();
        if objects.contains_key(&id) {
            return Err(PhysicsError::InvalidParameter(format!("object {id} already exists")));
        }
        let object = Arc::new(PhysObject::new(kind, &desc, Arc::clone(&self.config), self.taints.clone()));
        objects.insert(id, Arc::clone(&object));
        self.taints.submit(
            "CreateObject",
            Taint::Object {
                id,
                op: ObjectOp::Create(Arc::clone(&object)),
            },
        );
        Ok(object)
    }

    pub fn remove_object(&self, id: LocalId) -> PhysicsResult<()> {
        if self.objects.write().remove(&id).is_none() {
            return Err(PhysicsError::UnknownObject(id));
        }
        self.taints.submit("DestroyObject", Taint::Object { id, op: ObjectOp::Destroy });
        Ok(())
    }

    pub fn object(&self, id: LocalId) -> Option<Arc<PhysObject>> {
        self.objects.read().get(&id).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    fn require(&self, id: LocalId) -> PhysicsResult<Arc<PhysObject>> {
        self.object(id).ok_or(PhysicsError::UnknownObject(id))
    }

    pub fn link(&self, child: LocalId, root: LocalId) -> PhysicsResult<()> {
        self.require(root)?;
        self.require(child)?.link_to(root);
        Ok(())
    }

    pub fn delink(&self, child: LocalId) -> PhysicsResult<()> {
        self.require(child)?.delink();
        Ok(())
    }

    pub fn set_terrain(&self, terrain: Terrain) {
        self.taints.submit("SetTerrain", Taint::Terrain(Box::new(terrain)));
    }

    /// Register hull points (unit cube space) for a mesh asset. Objects waiting
    /// on it get their bodies at the next drain.
    pub fn provide_mesh_asset(&self, asset: u64, points: Vec<Vec3>) -> PhysicsResult<()> {
        if points.len() < 4 {
            return Err(PhysicsError::ShapeBuild(format!(
                "mesh asset {asset}: {} points cannot form a hull",
                points.len()
            )));
        }
        if !points.iter().all(|p| is_finite_vec(*p)) {
            return Err(PhysicsError::ShapeBuild(format!("mesh asset {asset}: non-finite point")));
        }
        self.mesh_assets.write().insert(asset, points);
        self.taints.submit("MeshReady", Taint::MeshReady { asset });
        Ok(())
    }

    /// Run `f` at the next taint drain with full access to the taint world.
    pub fn submit_custom(&self, name: &'static str, f: impl FnOnce(&mut TaintWorld) + Send + 'static) {
        self.taints.submit(name, Taint::Custom(Box::new(f)));
    }
}

// ============================================================================
// SCENE (stepping thread)
// ============================================================================

pub struct PhysicsScene {
    taints: TaintQueue<Taint>,
    handle: SceneHandle,
    world: TaintWorld,
}

impl PhysicsScene {
    pub fn new(config: PhysicsConfig, engine: Box<dyn PhysicsEngine>) -> PhysicsResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let taints = TaintQueue::new();
        let mesh_assets = Arc::new(RwLock::new(MeshAssets::new()));
        let mut world = TaintWorld::new(engine, Arc::clone(&config), taints.sender(), Arc::clone(&mesh_assets));
        {
            let _taint_time = taints.enter_taint_time();
            world.initialize()?;
        }
        log::info!(
            "physics scene ready: region {:?}, {:?} linksets, step {:.4}s",
            config.region_size,
            config.linkset_kind,
            config.fixed_timestep
        );
        let handle = SceneHandle {
            config,
            taints: taints.sender(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            mesh_assets,
        };
        Ok(Self { taints, handle, world })
    }

    pub fn with_rapier(config: PhysicsConfig) -> PhysicsResult<Self> {
        let engine = RapierEngine::with_gravity_z(config.gravity);
        Self::new(config, Box::new(engine))
    }

    pub fn handle(&self) -> SceneHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &PhysicsConfig {
        self.handle.config()
    }

    // ---- host API (delegates to the handle) ----

    pub fn add_prim(&self, desc: ObjectDesc) -> PhysicsResult<Arc<PhysObject>> {
        self.handle.add_prim(desc)
    }

    pub fn add_avatar(&self, desc: ObjectDesc) -> PhysicsResult<Arc<PhysObject>> {
        self.handle.add_avatar(desc)
    }

    pub fn remove_object(&self, id: LocalId) -> PhysicsResult<()> {
        self.handle.remove_object(id)
    }

    pub fn object(&self, id: LocalId) -> Option<Arc<PhysObject>> {
        self.handle.object(id)
    }

    pub fn link(&self, child: LocalId, root: LocalId) -> PhysicsResult<()> {
        self.handle.link(child, root)
    }

    pub fn delink(&self, child: LocalId) -> PhysicsResult<()> {
        self.handle.delink(child)
    }

    pub fn set_terrain(&self, terrain: Terrain) {
        self.handle.set_terrain(terrain);
    }

    pub fn provide_mesh_asset(&self, asset: u64, points: Vec<Vec3>) -> PhysicsResult<()> {
        self.handle.provide_mesh_asset(asset, points)
    }

    pub fn submit_custom(&self, name: &'static str, f: impl FnOnce(&mut TaintWorld) + Send + 'static) {
        self.handle.submit_custom(name, f);
    }

    // ---- stepping ----

    /// Advance the scene by `dt` seconds.
    pub fn simulate(&mut self, dt: f32) -> StepStats {
        let span = tracing::debug_span!("simulate", step = self.world.step_count() + 1);
        let _enter = span.enter();

        let mut stats = StepStats {
            step: self.world.step_count(),
            ..Default::default()
        };
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("simulate: ignoring invalid dt {dt}");
            return stats;
        }

        for entry in self.taints.begin_pass() {
            self.world.execute(entry);
            stats.taints += 1;
        }

        {
            let _taint_time = self.taints.enter_taint_time();
            stats.pre_step_actions = self.world.run_pre_step(dt);
        }

        let output = self.world.step_engine(dt);
        stats.step = self.world.step_count();
        stats.substeps = output.substeps;
        stats.collisions = output.collisions.len();

        {
            let _taint_time = self.taints.enter_taint_time();
            stats.updates = self.world.update_properties(&output.updates);
        }

        for entry in self.taints.begin_post_pass() {
            self.world.execute(entry);
            stats.post_taints += 1;
        }

        {
            let _taint_time = self.taints.enter_taint_time();
            stats.reports = self.world.process_collisions(&output.collisions);
            stats.corrections = self.world.extreme_sanity_checks();
        }

        log::trace!("{stats:?}");
        stats
    }

    /// Run queued taints (both lanes) without stepping the engine.
    pub fn flush_taints(&mut self) -> usize {
        let mut ran = 0;
        for entry in self.taints.begin_pass() {
            self.world.execute(entry);
            ran += 1;
        }
        for entry in self.taints.begin_post_pass() {
            self.world.execute(entry);
            ran += 1;
        }
        ran
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.world.take_events()
    }

    // ---- queries ----

    pub fn world(&self) -> &TaintWorld {
        &self.world
    }

    pub fn engine(&self) -> &dyn PhysicsEngine {
        self.world.engine()
    }

    pub fn pending_taints(&self) -> usize {
        self.taints.pending() + self.taints.pending_post()
    }

    pub fn step_count(&self) -> u64 {
        self.world.step_count()
    }

    pub fn terrain(&self) -> &Terrain {
        self.world.terrain()
    }

    /// Members of the linkset containing `id`, root first.
    pub fn linkset_of(&self, id: LocalId) -> Option<Vec<LocalId>> {
        self.world.linkset(id).map(|l| l.members())
    }

    pub fn linkset_root(&self, id: LocalId) -> Option<LocalId> {
        self.world.linksets().root_of(id)
    }

    pub fn linkset_mass(&self, id: LocalId) -> Option<f32> {
        self.world.linkset_mass(id)
    }

    pub fn linkset_center_of_mass(&self, id: LocalId) -> Option<Vec3> {
        self.world.linkset_center_of_mass(id)
    }

    pub fn linkset_rebuild_count(&self, id: LocalId) -> Option<u64> {
        self.world.linkset(id).map(|l| l.rebuild_count())
    }

    pub fn displacement(&self, id: LocalId) -> Option<Vec3> {
        self.world.body(id).map(|b| b.displacement())
    }

    pub fn has_actor(&self, id: LocalId, kind: ActorKind) -> bool {
        self.world.has_actor(id, kind)
    }

    pub fn pre_step_registered(&self, id: LocalId, kind: ActorKind) -> bool {
        self.world.pre_step().is_registered(id, kind)
    }
}
