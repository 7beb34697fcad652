// src/actors/set_force.rs
//! Persistent force and torque: re-applied before every step while the Raw
//! value is non-zero.

use glam::Vec3;

use super::{ActorCtx, ActorKind, PhysActor};
use crate::math::EPSILON;

#[inline]
fn is_noop(v: Vec3) -> bool {
    v.length_squared() < EPSILON * EPSILON
}

#[derive(Debug, Default)]
pub struct SetForceActor {
    enabled: bool,
}

impl SetForceActor {
    pub fn new() -> Self {
        Self { enabled: true }
    }
}

impl PhysActor for SetForceActor {
    fn kind(&self) -> ActorKind {
        ActorKind::SetForce
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        if is_noop(ctx.body.object().with_raw(|raw| raw.force)) {
            self.enabled = false;
        }
        let active = self.is_active(ctx.body);
        ctx.set_pre_step(ActorKind::SetForce, active);
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::SetForce);
    }

    fn before_step(&mut self, ctx: &mut ActorCtx<'_>, _dt: f32) {
        if !self.is_active(ctx.body) {
            return;
        }
        let force = ctx.body.object().with_raw(|raw| raw.force);
        ctx.body.apply_central_force(ctx.engine, force);
    }
}

#[derive(Debug, Default)]
pub struct SetTorqueActor {
    enabled: bool,
}

impl SetTorqueActor {
    pub fn new() -> Self {
        Self { enabled: true }
    }
}

impl PhysActor for SetTorqueActor {
    fn kind(&self) -> ActorKind {
        ActorKind::SetTorque
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        if is_noop(ctx.body.object().with_raw(|raw| raw.torque)) {
            self.enabled = false;
        }
        let active = self.is_active(ctx.body);
        ctx.set_pre_step(ActorKind::SetTorque, active);
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::SetTorque);
    }

    fn before_step(&mut self, ctx: &mut ActorCtx<'_>, _dt: f32) {
        if !self.is_active(ctx.body) {
            return;
        }
        let torque = ctx.body.object().with_raw(|raw| raw.torque);
        ctx.body.apply_torque(ctx.engine, torque);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::actors::test_support::Rig;
    use crate::engine::recording::Call;

    #[test]
    fn force_is_applied_every_step() {
        let mut rig = Rig::prim(Vec3::new(10.0, 10.0, 30.0));
        rig.body.object().write_raw().force = Vec3::new(0.0, 0.0, 10.0);
        let mut actor = SetForceActor::new();
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(rig.pre_step.is_registered(1, ActorKind::SetForce));

        rig.tick(&mut actor, 0.1);
        rig.tick(&mut actor, 0.1);
        let forces = rig
            .engine
            .handle()
            .lock()
            .count(|c| matches!(c, Call::ApplyForce(_, f) if *f == Vec3::new(0.0, 0.0, 10.0)));
        assert_eq!(forces, 2);
    }

    #[test]
    fn zero_force_disables_and_unregisters() {
        let mut rig = Rig::prim(Vec3::new(10.0, 10.0, 30.0));
        rig.body.object().write_raw().torque = Vec3::X;
        let mut actor = SetTorqueActor::new();
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(rig.pre_step.is_registered(1, ActorKind::SetTorque));

        rig.body.object().write_raw().torque = Vec3::ZERO;
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(!actor.enabled());
        assert!(rig.pre_step.is_empty());
    }

    #[test]
    fn non_physical_objects_do_not_register() {
        let mut rig = Rig::prim(Vec3::new(10.0, 10.0, 30.0));
        rig.body.object().write_raw().is_physical = false;
        rig.body.object().write_raw().force = Vec3::X;
        let mut actor = SetForceActor::new();
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(actor.enabled());
        assert!(rig.pre_step.is_empty());
    }
}
