// src/actors/avatar_move.rs
//! Avatar walking, flying and jumping.
//!
//! A velocity motor walks the avatar's velocity toward the target velocity the
//! simulator sets from viewer input. The correction is delivered as an
//! impulse so contacts still push back. While walking, gravity owns the
//! vertical component; only flying avatars steer Z.

use glam::Vec3;

use super::{ActorCtx, ActorKind, PhysActor};
use crate::motor::{VMotor, INFINITE};
use crate::object::ObjectKind;

/// Below this the avatar counts as standing still.
const STILL_SPEED: f32 = 0.01;
/// Upward target speed that asks for a jump.
const JUMP_REQUEST: f32 = 0.1;

#[derive(Debug)]
pub struct AvatarMoveActor {
    enabled: bool,
    motor: VMotor,
    jumping: bool,
}

impl AvatarMoveActor {
    pub fn new(time_scale: f32) -> Self {
        Self {
            enabled: true,
            motor: VMotor::new("avatar-move", time_scale, INFINITE, 1.0),
            jumping: false,
        }
    }

    pub fn motor(&self) -> &VMotor {
        &self.motor
    }
}

impl PhysActor for AvatarMoveActor {
    fn kind(&self) -> ActorKind {
        ActorKind::AvatarMove
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        if ctx.body.kind() != ObjectKind::Avatar {
            self.enabled = false;
        }
        self.motor.time_scale = ctx.config.avatar_velocity_timescale;
        let active = self.is_active(ctx.body);
        ctx.set_pre_step(ActorKind::AvatarMove, active);
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::AvatarMove);
        self.motor.zero();
    }

    fn before_step(&mut self, ctx: &mut ActorCtx<'_>, dt: f32) {
        if !self.is_active(ctx.body) {
            return;
        }
        let (target, current, flying, on_ground, mass) = ctx.body.object().with_raw(|raw| {
            (raw.target_velocity, raw.velocity, raw.flying, raw.colliding_ground, raw.mass)
        });

        if target.length() < STILL_SPEED && !flying && on_ground {
            // Standing: high friction, kill any horizontal slide once.
            self.motor.zero();
            self.jumping = false;
            ctx.body.set_standing(ctx.engine, ctx.config, true);
            if Vec3::new(current.x, current.y, 0.0).length() > STILL_SPEED {
                ctx.body.force_velocity(ctx.engine, Vec3::new(0.0, 0.0, current.z.min(0.0)));
            }
            return;
        }
        ctx.body.set_standing(ctx.engine, ctx.config, false);

        self.motor.set_target(target);
        let mut wanted = self.motor.step_from(dt, current);
        if !flying {
            if on_ground && target.z > JUMP_REQUEST && !self.jumping {
                wanted.z = ctx.config.avatar_jump_velocity;
                self.jumping = true;
            } else {
                wanted.z = current.z;
                if on_ground && target.z <= JUMP_REQUEST {
                    self.jumping = false;
                }
            }
        }

        let delta = wanted - current;
        ctx.body.apply_central_impulse(ctx.engine, delta * mass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::test_support::Rig;
    use crate::object::ObjectDesc;

    fn avatar_rig() -> Rig {
        Rig::new(ObjectKind::Avatar, ObjectDesc::avatar(1, Vec3::new(128.0, 128.0, 22.0)))
    }

    #[test]
    fn walking_converges_on_the_target_velocity() {
        let mut rig = avatar_rig();
        let mut actor = AvatarMoveActor::new(rig.config.avatar_velocity_timescale);
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(rig.pre_step.is_registered(1, ActorKind::AvatarMove));

        rig.body.object().write_raw().target_velocity = Vec3::new(2.0, 0.0, 0.0);
        for _ in 0..200 {
            rig.body.object().write_raw().colliding_ground = true;
            rig.tick(&mut actor, 0.02);
        }
        let v = rig.body.object().velocity();
        assert!((v.x - 2.0).abs() < 0.05, "velocity {v}");
        assert!(v.z.abs() < 1e-4);
    }

    #[test]
    fn jump_happens_once_per_request() {
        let mut rig = avatar_rig();
        let mut actor = AvatarMoveActor::new(rig.config.avatar_velocity_timescale);
        rig.with_ctx(|ctx| actor.refresh(ctx));
        rig.body.object().write_raw().target_velocity = Vec3::new(0.0, 0.0, 1.0);
        rig.body.object().write_raw().colliding_ground = true;
        rig.tick(&mut actor, 0.02);
        assert!((rig.body.object().velocity().z - rig.config.avatar_jump_velocity).abs() < 1e-3);

        rig.body.object().write_raw().colliding_ground = true;
        rig.tick(&mut actor, 0.02);
        assert!((rig.body.object().velocity().z - rig.config.avatar_jump_velocity).abs() < 1e-3);
    }

    #[test]
    fn standing_still_stops_sliding() {
        let mut rig = avatar_rig();
        let mut actor = AvatarMoveActor::new(rig.config.avatar_velocity_timescale);
        rig.with_ctx(|ctx| actor.refresh(ctx));
        {
            let mut raw = rig.body.object().write_raw();
            raw.velocity = Vec3::new(1.5, 0.0, 0.0);
            raw.colliding_ground = true;
        }
        rig.with_ctx(|ctx| actor.before_step(ctx, 0.02));
        assert_eq!(rig.body.object().velocity(), Vec3::ZERO);
        let handle = rig.body.handle().unwrap();
        let friction = rig.engine.handle().lock().bodies[&handle].friction;
        assert_eq!(friction, rig.config.avatar_standing_friction);
    }

    #[test]
    fn prims_never_run_the_avatar_motor() {
        let mut rig = Rig::prim(Vec3::new(10.0, 10.0, 30.0));
        let mut actor = AvatarMoveActor::new(0.2);
        rig.with_ctx(|ctx| actor.refresh(ctx));
        assert!(!actor.enabled());
        assert!(rig.pre_step.is_empty());
    }
}
