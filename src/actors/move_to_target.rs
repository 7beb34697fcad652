// src/actors/move_to_target.rs
//! Scripted move-to-target: a position motor that sets the body's velocity
//! each step so it glides to the target in about `tau` seconds.

use glam::Vec3;

use super::{ActorCtx, ActorKind, PhysActor};
use crate::motor::{VMotor, INFINITE};

/// Shortest accepted time constant.
const MIN_TAU: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveTarget {
    pub target: Vec3,
    pub tau: f32,
}

#[derive(Debug)]
pub struct MoveToTargetActor {
    enabled: bool,
    motor: VMotor,
}

impl Default for MoveToTargetActor {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveToTargetActor {
    pub fn new() -> Self {
        Self {
            enabled: true,
            motor: VMotor::new("move-to-target", 1.0, INFINITE, 1.0).with_threshold(0.05),
        }
    }

    pub fn set_target(&mut self, target: MoveTarget) {
        self.motor.time_scale = target.tau.max(MIN_TAU);
        self.motor.set_target(target.target);
    }

    pub fn target(&self) -> Vec3 {
        self.motor.target()
    }
}

impl PhysActor for MoveToTargetActor {
    fn kind(&self) -> ActorKind {
        ActorKind::MoveToTarget
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        let active = self.is_active(ctx.body);
        ctx.set_pre_step(ActorKind::MoveToTarget, active);
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::MoveToTarget);
    }

    fn before_step(&mut self, ctx: &mut ActorCtx<'_>, dt: f32) {
        if !self.is_active(ctx.body) || dt <= 0.0 {
            return;
        }
        let position = ctx.body.object().position();
        self.motor.set_current(position);
        if self.motor.error_is_zero() {
            // Arrived: hold still on the target.
            let target = self.motor.target();
            ctx.body.force_position(ctx.engine, target);
            ctx.body.force_velocity(ctx.engine, Vec3::ZERO);
            return;
        }
        let next = self.motor.step(dt);
        ctx.body.force_velocity(ctx.engine, (next - position) / dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::test_support::Rig;

    #[test]
    fn glides_to_the_target_and_stops() {
        let mut rig = Rig::prim(Vec3::new(10.0, 10.0, 30.0));
        let mut actor = MoveToTargetActor::new();
        actor.set_target(MoveTarget {
            target: Vec3::new(14.0, 10.0, 30.0),
            tau: 0.5,
        });
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(rig.pre_step.is_registered(1, ActorKind::MoveToTarget));

        for _ in 0..300 {
            rig.tick(&mut actor, 0.02);
        }
        let p = rig.body.object().position();
        assert!((p - Vec3::new(14.0, 10.0, 30.0)).length() < 0.06, "position {p}");
        assert!(rig.body.object().velocity().length() < 1e-3);
    }

    #[test]
    fn tiny_tau_is_clamped() {
        let mut actor = MoveToTargetActor::new();
        actor.set_target(MoveTarget {
            target: Vec3::ONE,
            tau: 0.0,
        });
        assert_eq!(actor.motor.time_scale, MIN_TAU);
        assert_eq!(actor.target(), Vec3::ONE);
    }
}
