// src/actors/hover.rs
//! Hover: hold the object at a height above ground, water or an absolute Z.

use serde::{Deserialize, Serialize};

use super::{ActorCtx, ActorKind, PhysActor};
use crate::motor::{FMotor, INFINITE};

const MIN_TAU: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HoverKind {
    #[default]
    Ground,
    Water,
    GroundOrWater,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverParams {
    pub height: f32,
    pub kind: HoverKind,
    pub tau: f32,
}

#[derive(Debug)]
pub struct HoverActor {
    enabled: bool,
    params: HoverParams,
    motor: FMotor,
}

impl Default for HoverActor {
    fn default() -> Self {
        Self::new()
    }
}

impl HoverActor {
    pub fn new() -> Self {
        Self {
            enabled: true,
            params: HoverParams {
                height: 0.0,
                kind: HoverKind::Ground,
                tau: 1.0,
            },
            motor: FMotor::new("hover", 1.0, INFINITE, 1.0),
        }
    }

    pub fn set_params(&mut self, params: HoverParams) {
        self.params = params;
        self.motor.time_scale = params.tau.max(MIN_TAU);
    }

    pub fn params(&self) -> HoverParams {
        self.params
    }

    fn target_height(&self, ctx: &ActorCtx<'_>, x: f32, y: f32) -> f32 {
        let ground = ctx.terrain.height_at(x, y);
        let water = ctx.terrain.water_height();
        let base = match self.params.kind {
            HoverKind::Ground => ground,
            HoverKind::Water => water,
            HoverKind::GroundOrWater => ground.max(water),
            HoverKind::Absolute => 0.0,
        };
        base + self.params.height
    }
}

impl PhysActor for HoverActor {
    fn kind(&self) -> ActorKind {
        ActorKind::Hover
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        let active = self.is_active(ctx.body);
        ctx.set_pre_step(ActorKind::Hover, active);
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::Hover);
    }

    fn before_step(&mut self, ctx: &mut ActorCtx<'_>, dt: f32) {
        if !self.is_active(ctx.body) || dt <= 0.0 {
            return;
        }
        let (position, mut velocity) = ctx.body.object().with_raw(|raw| (raw.position, raw.velocity));
        let target = self.target_height(ctx, position.x, position.y);
        self.motor.set_target(target);
        let next = self.motor.step_from(dt, position.z);
        velocity.z = (next - position.z) / dt;
        ctx.body.force_velocity(ctx.engine, velocity);
    }
}
