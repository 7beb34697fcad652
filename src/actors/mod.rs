// src/actors/mod.rs
//! Actors: optional per-object behaviors.
//!
//! An object holds at most one actor of each [`ActorKind`], stored in a typed
//! slot of its [`ActorCollection`]. Actors that act every step register a
//! pre-step entry in the scene's [`PreStepRegistry`]; the scene calls
//! [`PhysActor::before_step`] for every registered entry before the engine
//! steps. Registration lives in the scene, not in a delegate list, so an actor
//! that was disposed can never fire again.

pub mod avatar_move;
pub mod hover;
pub mod lock_axis;
pub mod move_to_target;
pub mod set_force;
pub mod vehicle;

use std::collections::BTreeSet;

use crate::body::PhysBody;
use crate::config::PhysicsConfig;
use crate::engine::PhysicsEngine;
use crate::object::LocalId;
use crate::taint::TaintSender;
use crate::terrain::Terrain;
use crate::world::Taint;

pub use self::avatar_move::AvatarMoveActor;
pub use self::hover::{HoverActor, HoverKind, HoverParams};
pub use self::lock_axis::LockAxisActor;
pub use self::move_to_target::{MoveTarget, MoveToTargetActor};
pub use self::set_force::{SetForceActor, SetTorqueActor};
pub use self::vehicle::{VehicleActor, VehicleFlags, VehicleOp, VehicleParam, VehicleType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActorKind {
    AvatarMove,
    MoveToTarget,
    Hover,
    LockAxis,
    SetForce,
    SetTorque,
    Vehicle,
}

impl ActorKind {
    pub const ALL: [ActorKind; 7] = [
        ActorKind::AvatarMove,
        ActorKind::MoveToTarget,
        ActorKind::Hover,
        ActorKind::LockAxis,
        ActorKind::SetForce,
        ActorKind::SetTorque,
        ActorKind::Vehicle,
    ];
}

/// Scene-wide set of `(object, actor)` pairs that run before each step.
/// Ordered, so pre-step actions run in a stable order.
#[derive(Debug, Default)]
pub struct PreStepRegistry {
    entries: BTreeSet<(LocalId, ActorKind)>,
}

impl PreStepRegistry {
    /// Returns `true` if the entry was not registered before.
    pub fn register(&mut self, id: LocalId, kind: ActorKind) -> bool {
        self.entries.insert((id, kind))
    }

    pub fn unregister(&mut self, id: LocalId, kind: ActorKind) -> bool {
        self.entries.remove(&(id, kind))
    }

    pub fn is_registered(&self, id: LocalId, kind: ActorKind) -> bool {
        self.entries.contains(&(id, kind))
    }

    pub fn remove_object(&mut self, id: LocalId) {
        self.entries.retain(|(owner, _)| *owner != id);
    }

    /// Copy of the entries, so actions may (un)register while iterating.
    pub fn snapshot(&self) -> Vec<(LocalId, ActorKind)> {
        self.entries.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What an actor may touch while it runs.
pub struct ActorCtx<'a> {
    pub engine: &'a mut dyn PhysicsEngine,
    pub body: &'a mut PhysBody,
    pub config: &'a PhysicsConfig,
    pub terrain: &'a Terrain,
    pub pre_step: &'a mut PreStepRegistry,
    pub taints: &'a TaintSender<Taint>,
}

impl ActorCtx<'_> {
    #[inline]
    pub fn id(&self) -> LocalId {
        self.body.id()
    }

    pub fn register_pre_step(&mut self, kind: ActorKind) {
        let id = self.id();
        if self.pre_step.register(id, kind) {
            log::trace!("object {id}: {kind:?} pre-step registered");
        }
    }

    pub fn unregister_pre_step(&mut self, kind: ActorKind) {
        let id = self.id();
        if self.pre_step.unregister(id, kind) {
            log::trace!("object {id}: {kind:?} pre-step unregistered");
        }
    }

    /// Register or unregister depending on `active`.
    pub fn set_pre_step(&mut self, kind: ActorKind, active: bool) {
        if active {
            self.register_pre_step(kind);
        } else {
            self.unregister_pre_step(kind);
        }
    }
}

pub trait PhysActor: Send {
    fn kind(&self) -> ActorKind;
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);

    /// Enabled and the object is physical and not selected.
    fn is_active(&self, body: &PhysBody) -> bool {
        self.enabled() && body.is_physically_active()
    }

    /// Re-evaluate after the object's physical parameters changed.
    fn refresh(&mut self, ctx: &mut ActorCtx<'_>);

    /// The engine body is about to be destroyed; drop anything tied to it.
    fn remove_body_dependencies(&mut self, _ctx: &mut ActorCtx<'_>) {}

    /// Unregister the pre-step action, then release engine resources.
    fn dispose(&mut self, ctx: &mut ActorCtx<'_>);

    fn before_step(&mut self, _ctx: &mut ActorCtx<'_>, _dt: f32) {}
}

/// An actor type that owns one slot of [`ActorCollection`].
pub trait SlottedActor: PhysActor + Sized {
    const KIND: ActorKind;
    fn slot(actors: &mut ActorCollection) -> &mut Option<Self>;
}

macro_rules! slotted {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl SlottedActor for $ty {
            const KIND: ActorKind = $kind;
            #[inline]
            fn slot(actors: &mut ActorCollection) -> &mut Option<Self> {
                &mut actors.$field
            }
        }
    };
}

slotted!(AvatarMoveActor, ActorKind::AvatarMove, avatar_move);
slotted!(MoveToTargetActor, ActorKind::MoveToTarget, move_to_target);
slotted!(HoverActor, ActorKind::Hover, hover);
slotted!(LockAxisActor, ActorKind::LockAxis, lock_axis);
slotted!(SetForceActor, ActorKind::SetForce, set_force);
slotted!(SetTorqueActor, ActorKind::SetTorque, set_torque);
slotted!(VehicleActor, ActorKind::Vehicle, vehicle);

/// One optional actor per kind.
#[derive(Default)]
pub struct ActorCollection {
    avatar_move: Option<AvatarMoveActor>,
    move_to_target: Option<MoveToTargetActor>,
    hover: Option<HoverActor>,
    lock_axis: Option<LockAxisActor>,
    set_force: Option<SetForceActor>,
    set_torque: Option<SetTorqueActor>,
    vehicle: Option<VehicleActor>,
}

impl ActorCollection {
    /// Enable or disable the actor of type `A`, creating it with `factory`
    /// only if it does not exist and `want` is true.
    pub fn enable_actor<A: SlottedActor>(&mut self, want: bool, factory: impl FnOnce() -> A) -> Option<&mut A> {
        let slot = A::slot(self);
        if slot.is_none() {
            if !want {
                return None;
            }
            *slot = Some(factory());
        }
        let actor = slot.as_mut()?;
        actor.set_enabled(want);
        Some(actor)
    }

    pub fn get<A: SlottedActor>(&mut self) -> Option<&mut A> {
        A::slot(self).as_mut()
    }

    pub fn has(&self, kind: ActorKind) -> bool {
        match kind {
            ActorKind::AvatarMove => self.avatar_move.is_some(),
            ActorKind::MoveToTarget => self.move_to_target.is_some(),
            ActorKind::Hover => self.hover.is_some(),
            ActorKind::LockAxis => self.lock_axis.is_some(),
            ActorKind::SetForce => self.set_force.is_some(),
            ActorKind::SetTorque => self.set_torque.is_some(),
            ActorKind::Vehicle => self.vehicle.is_some(),
        }
    }

    pub fn get_mut(&mut self, kind: ActorKind) -> Option<&mut dyn PhysActor> {
        match kind {
            ActorKind::AvatarMove => self.avatar_move.as_mut().map(|a| a as &mut dyn PhysActor),
            ActorKind::MoveToTarget => self.move_to_target.as_mut().map(|a| a as &mut dyn PhysActor),
            ActorKind::Hover => self.hover.as_mut().map(|a| a as &mut dyn PhysActor),
            ActorKind::LockAxis => self.lock_axis.as_mut().map(|a| a as &mut dyn PhysActor),
            ActorKind::SetForce => self.set_force.as_mut().map(|a| a as &mut dyn PhysActor),
            ActorKind::SetTorque => self.set_torque.as_mut().map(|a| a as &mut dyn PhysActor),
            ActorKind::Vehicle => self.vehicle.as_mut().map(|a| a as &mut dyn PhysActor),
        }
    }

    pub fn len(&self) -> usize {
        ActorKind::ALL.iter().filter(|k| self.has(**k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_each(&mut self, mut f: impl FnMut(&mut dyn PhysActor)) {
        for kind in ActorKind::ALL {
            if let Some(actor) = self.get_mut(kind) {
                f(actor);
            }
        }
    }

    pub fn refresh(&mut self, kind: ActorKind, ctx: &mut ActorCtx<'_>) {
        if let Some(actor) = self.get_mut(kind) {
            actor.refresh(ctx);
        }
    }

    pub fn refresh_all(&mut self, ctx: &mut ActorCtx<'_>) {
        self.for_each(|actor| actor.refresh(ctx));
    }

    pub fn remove_body_dependencies(&mut self, ctx: &mut ActorCtx<'_>) {
        self.for_each(|actor| actor.remove_body_dependencies(ctx));
    }

    /// Dispose and drop the actor of `kind`.
    pub fn release(&mut self, kind: ActorKind, ctx: &mut ActorCtx<'_>) {
        if let Some(actor) = self.get_mut(kind) {
            actor.dispose(ctx);
        }
        match kind {
            ActorKind::AvatarMove => self.avatar_move = None,
            ActorKind::MoveToTarget => self.move_to_target = None,
            ActorKind::Hover => self.hover = None,
            ActorKind::LockAxis => self.lock_axis = None,
            ActorKind::SetForce => self.set_force = None,
            ActorKind::SetTorque => self.set_torque = None,
            ActorKind::Vehicle => self.vehicle = None,
        }
    }

    pub fn dispose_all(&mut self, ctx: &mut ActorCtx<'_>) {
        for kind in ActorKind::ALL {
            self.release(kind, ctx);
        }
    }
}


#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::test_support::Rig;
    use super::*;

    #[test]
    fn factory_runs_at_most_once() {
        let mut actors = ActorCollection::default();
        let mut built = 0;
        for _ in 0..3 {
            actors.enable_actor(true, || {
                built += 1;
                SetForceActor::new()
            });
        }
        assert_eq!(built, 1);
        assert!(actors.has(ActorKind::SetForce));
        assert_eq!(actors.len(), 1);
    }

    #[test]
    fn disabling_a_missing_actor_creates_nothing() {
        let mut actors = ActorCollection::default();
        assert!(actors.enable_actor(false, HoverActor::new).is_none());
        assert!(actors.is_empty());

        actors.enable_actor(true, HoverActor::new);
        let hover = actors.enable_actor(false, HoverActor::new).unwrap();
        assert!(!hover.enabled());
    }

    #[test]
    fn release_unregisters_before_dropping() {
        let mut rig = Rig::prim(Vec3::new(10.0, 10.0, 30.0));
        rig.body.object().write_raw().force = Vec3::new(0.0, 0.0, 5.0);
        let mut actors = ActorCollection::default();
        actors.enable_actor(true, SetForceActor::new);
        rig.with_ctx(|ctx| actors.refresh(ActorKind::SetForce, ctx));
        assert!(rig.pre_step.is_registered(1, ActorKind::SetForce));

        rig.with_ctx(|ctx| actors.dispose_all(ctx));
        assert!(rig.pre_step.is_empty());
        assert!(!actors.has(ActorKind::SetForce));
    }

    #[test]
    fn registry_snapshot_is_ordered() {
        let mut registry = PreStepRegistry::default();
        registry.register(9, ActorKind::Vehicle);
        registry.register(2, ActorKind::Hover);
        registry.register(2, ActorKind::AvatarMove);
        assert!(!registry.register(2, ActorKind::Hover));
        assert_eq!(
            registry.snapshot(),
            vec![(2, ActorKind::AvatarMove), (2, ActorKind::Hover), (9, ActorKind::Vehicle)]
        );
        registry.remove_object(2);
        assert_eq!(registry.len(), 1);
    }
}
