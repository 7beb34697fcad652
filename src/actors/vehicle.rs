// src/actors/vehicle.rs
//! Scripted vehicles.
//!
//! A vehicle is a linear motor, an angular motor and a handful of shaping
//! effects (friction, hover, deflection, vertical attraction, banking), all
//! evaluated in the vehicle's own frame and written back as velocities before
//! each step. Parameter and flag numbers follow the scripting API so scripts
//! can pass them through unchanged.

use bitflags::bitflags;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{ActorCtx, ActorKind, PhysActor};
use crate::math::{clamp_length, sanitize_quat, EPSILON};
use crate::motor::VMotor;

/// Time scales at or above this are treated as "never".
const TIMESCALE_OFF: f32 = 300.0;
const MIN_TIMESCALE: f32 = 0.01;
const MAX_TIMESCALE: f32 = 1000.0;
/// Motor directions are capped (m/s, rad/s).
const MAX_LINEAR_MOTOR: f32 = 30.0;
const MAX_ANGULAR_MOTOR: f32 = 12.566_371;
/// Speed under which deflection does nothing.
const DEFLECTION_MIN_SPEED: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VehicleType {
    #[default]
    None,
    Sled,
    Car,
    Boat,
    Airplane,
    Balloon,
}

impl VehicleType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => VehicleType::None,
            1 => VehicleType::Sled,
            2 => VehicleType::Car,
            3 => VehicleType::Boat,
            4 => VehicleType::Airplane,
            5 => VehicleType::Balloon,
            _ => return None,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VehicleFlags: u32 {
        const NO_DEFLECTION_UP    = 1;
        const LIMIT_ROLL_ONLY     = 2;
        const HOVER_WATER_ONLY    = 4;
        const HOVER_TERRAIN_ONLY  = 8;
        const HOVER_GLOBAL_HEIGHT = 16;
        const HOVER_UP_ONLY       = 32;
        const LIMIT_MOTOR_UP      = 64;
        const MOUSELOOK_STEER     = 128;
        const MOUSELOOK_BANK      = 256;
        const CAMERA_DECOUPLED    = 512;
    }
}

/// Vehicle parameter ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleParam {
    LinearFrictionTimescale,
    AngularFrictionTimescale,
    LinearMotorDirection,
    AngularMotorDirection,
    LinearMotorOffset,
    HoverHeight,
    HoverEfficiency,
    HoverTimescale,
    Buoyancy,
    LinearDeflectionEfficiency,
    LinearDeflectionTimescale,
    LinearMotorTimescale,
    LinearMotorDecayTimescale,
    AngularDeflectionEfficiency,
    AngularDeflectionTimescale,
    AngularMotorTimescale,
    AngularMotorDecayTimescale,
    VerticalAttractionEfficiency,
    VerticalAttractionTimescale,
    BankingEfficiency,
    BankingMix,
    BankingTimescale,
    ReferenceFrame,
}

impl VehicleParam {
    pub fn from_code(code: i32) -> Option<Self> {
        use VehicleParam::*;
        Some(match code {
            16 => LinearFrictionTimescale,
            17 => AngularFrictionTimescale,
            18 => LinearMotorDirection,
            19 => AngularMotorDirection,
            20 => LinearMotorOffset,
            24 => HoverHeight,
            25 => HoverEfficiency,
            26 => HoverTimescale,
            27 => Buoyancy,
            28 => LinearDeflectionEfficiency,
            29 => LinearDeflectionTimescale,
            30 => LinearMotorTimescale,
            31 => LinearMotorDecayTimescale,
            32 => AngularDeflectionEfficiency,
            33 => AngularDeflectionTimescale,
            34 => AngularMotorTimescale,
            35 => AngularMotorDecayTimescale,
            36 => VerticalAttractionEfficiency,
            37 => VerticalAttractionTimescale,
            38 => BankingEfficiency,
            39 => BankingMix,
            40 => BankingTimescale,
            44 => ReferenceFrame,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        use VehicleParam::*;
        match self {
            LinearFrictionTimescale => 16,
            AngularFrictionTimescale => 17,
            LinearMotorDirection => 18,
            AngularMotorDirection => 19,
            LinearMotorOffset => 20,
            HoverHeight => 24,
            HoverEfficiency => 25,
            HoverTimescale => 26,
            Buoyancy => 27,
            LinearDeflectionEfficiency => 28,
            LinearDeflectionTimescale => 29,
            LinearMotorTimescale => 30,
            LinearMotorDecayTimescale => 31,
            AngularDeflectionEfficiency => 32,
            AngularDeflectionTimescale => 33,
            AngularMotorTimescale => 34,
            AngularMotorDecayTimescale => 35,
            VerticalAttractionEfficiency => 36,
            VerticalAttractionTimescale => 37,
            BankingEfficiency => 38,
            BankingMix => 39,
            BankingTimescale => 40,
            ReferenceFrame => 44,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleOp {
    Type(VehicleType),
    Float(VehicleParam, f32),
    Vector(VehicleParam, Vec3),
    Rotation(VehicleParam, Quat),
    SetFlags(VehicleFlags),
    RemoveFlags(VehicleFlags),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleParams {
    pub flags: VehicleFlags,
    pub linear_friction_timescale: Vec3,
    pub angular_friction_timescale: Vec3,
    pub linear_motor_direction: Vec3,
    pub linear_motor_offset: Vec3,
    pub linear_motor_timescale: f32,
    pub linear_motor_decay_timescale: f32,
    pub angular_motor_direction: Vec3,
    pub angular_motor_timescale: f32,
    pub angular_motor_decay_timescale: f32,
    pub hover_height: f32,
    pub hover_efficiency: f32,
    pub hover_timescale: f32,
    pub buoyancy: f32,
    pub linear_deflection_efficiency: f32,
    pub linear_deflection_timescale: f32,
    pub angular_deflection_efficiency: f32,
    pub angular_deflection_timescale: f32,
    pub vertical_attraction_efficiency: f32,
    pub vertical_attraction_timescale: f32,
    pub banking_efficiency: f32,
    pub banking_mix: f32,
    pub banking_timescale: f32,
    pub reference_frame: Quat,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            flags: VehicleFlags::empty(),
            linear_friction_timescale: Vec3::splat(MAX_TIMESCALE),
            angular_friction_timescale: Vec3::splat(MAX_TIMESCALE),
            linear_motor_direction: Vec3::ZERO,
            linear_motor_offset: Vec3::ZERO,
            linear_motor_timescale: MAX_TIMESCALE,
            linear_motor_decay_timescale: 120.0,
            angular_motor_direction: Vec3::ZERO,
            angular_motor_timescale: MAX_TIMESCALE,
            angular_motor_decay_timescale: 120.0,
            hover_height: 0.0,
            hover_efficiency: 0.0,
            hover_timescale: MAX_TIMESCALE,
            buoyancy: 0.0,
            linear_deflection_efficiency: 0.0,
            linear_deflection_timescale: MAX_TIMESCALE,
            angular_deflection_efficiency: 0.0,
            angular_deflection_timescale: MAX_TIMESCALE,
            vertical_attraction_efficiency: 0.0,
            vertical_attraction_timescale: MAX_TIMESCALE,
            banking_efficiency: 0.0,
            banking_mix: 1.0,
            banking_timescale: MAX_TIMESCALE,
            reference_frame: Quat::IDENTITY,
        }
    }
}

#[inline]
fn timescale(v: f32) -> f32 {
    v.clamp(MIN_TIMESCALE, MAX_TIMESCALE)
}

#[inline]
fn efficiency(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

impl VehicleParams {
    /// Stock tuning for each vehicle type.
    pub fn for_type(vehicle_type: VehicleType) -> Self {
        use VehicleFlags as F;
        let base = Self::default();
        match vehicle_type {
            VehicleType::None => base,
            VehicleType::Sled => Self {
                flags: F::NO_DEFLECTION_UP | F::LIMIT_ROLL_ONLY | F::LIMIT_MOTOR_UP,
                linear_friction_timescale: Vec3::new(30.0, 1.0, 1000.0),
                angular_friction_timescale: Vec3::splat(1000.0),
                linear_motor_timescale: 1000.0,
                linear_motor_decay_timescale: 120.0,
                angular_motor_timescale: 1000.0,
                angular_motor_decay_timescale: 120.0,
                hover_efficiency: 1.0,
                hover_timescale: 10.0,
                linear_deflection_efficiency: 1.0,
                linear_deflection_timescale: 1.0,
                angular_deflection_efficiency: 1.0,
                angular_deflection_timescale: 1000.0,
                vertical_attraction_efficiency: 1.0,
                vertical_attraction_timescale: 1000.0,
                banking_mix: 1.0,
                banking_timescale: 10.0,
                ..base
            },
            VehicleType::Car => Self {
                flags: F::NO_DEFLECTION_UP | F::LIMIT_ROLL_ONLY | F::LIMIT_MOTOR_UP | F::HOVER_UP_ONLY,
                linear_friction_timescale: Vec3::new(100.0, 2.0, 1000.0),
                angular_friction_timescale: Vec3::splat(1000.0),
                linear_motor_timescale: 1.0,
                linear_motor_decay_timescale: 60.0,
                angular_motor_timescale: 1.0,
                angular_motor_decay_timescale: 0.8,
                hover_timescale: 1000.0,
                linear_deflection_efficiency: 1.0,
                linear_deflection_timescale: 2.0,
                angular_deflection_efficiency: 0.0,
                angular_deflection_timescale: 10.0,
                vertical_attraction_efficiency: 1.0,
                vertical_attraction_timescale: 10.0,
                banking_efficiency: -0.2,
                banking_mix: 1.0,
                banking_timescale: 1.0,
                ..base
            },
            VehicleType::Boat => Self {
                flags: F::NO_DEFLECTION_UP | F::HOVER_WATER_ONLY | F::LIMIT_MOTOR_UP,
                linear_friction_timescale: Vec3::new(10.0, 3.0, 2.0),
                angular_friction_timescale: Vec3::splat(10.0),
                linear_motor_timescale: 5.0,
                linear_motor_decay_timescale: 60.0,
                angular_motor_timescale: 4.0,
                angular_motor_decay_timescale: 4.0,
                hover_efficiency: 0.5,
                hover_timescale: 2.0,
                buoyancy: 1.0,
                linear_deflection_efficiency: 0.5,
                linear_deflection_timescale: 3.0,
                angular_deflection_efficiency: 0.5,
                angular_deflection_timescale: 5.0,
                vertical_attraction_efficiency: 0.5,
                vertical_attraction_timescale: 5.0,
                banking_efficiency: -0.3,
                banking_mix: 0.8,
                banking_timescale: 1.0,
                ..base
            },
            VehicleType::Airplane => Self {
                flags: F::LIMIT_ROLL_ONLY,
                linear_friction_timescale: Vec3::new(200.0, 10.0, 5.0),
                angular_friction_timescale: Vec3::splat(20.0),
                linear_motor_timescale: 2.0,
                linear_motor_decay_timescale: 60.0,
                angular_motor_timescale: 4.0,
                angular_motor_decay_timescale: 4.0,
                hover_efficiency: 0.5,
                hover_timescale: 1000.0,
                linear_deflection_efficiency: 0.5,
                linear_deflection_timescale: 3.0,
                angular_deflection_efficiency: 1.0,
                angular_deflection_timescale: 2.0,
                vertical_attraction_efficiency: 0.9,
                vertical_attraction_timescale: 2.0,
                banking_efficiency: 1.0,
                banking_mix: 0.7,
                banking_timescale: 2.0,
                ..base
            },
            VehicleType::Balloon => Self {
                flags: F::HOVER_GLOBAL_HEIGHT,
                linear_friction_timescale: Vec3::splat(5.0),
                angular_friction_timescale: Vec3::splat(10.0),
                linear_motor_timescale: 5.0,
                linear_motor_decay_timescale: 60.0,
                angular_motor_timescale: 6.0,
                angular_motor_decay_timescale: 10.0,
                hover_height: 5.0,
                hover_efficiency: 0.8,
                hover_timescale: 10.0,
                buoyancy: 1.0,
                linear_deflection_efficiency: 0.0,
                linear_deflection_timescale: 5.0,
                angular_deflection_efficiency: 0.0,
                angular_deflection_timescale: 5.0,
                vertical_attraction_efficiency: 1.0,
                vertical_attraction_timescale: 100.0,
                banking_efficiency: 0.0,
                banking_mix: 0.7,
                banking_timescale: 5.0,
                ..base
            },
        }
    }

    /// Apply a scalar parameter. Vector parameters take the value on all axes.
    pub fn apply_float(&mut self, param: VehicleParam, value: f32) {
        use VehicleParam::*;
        match param {
            LinearFrictionTimescale | AngularFrictionTimescale | LinearMotorDirection | AngularMotorDirection
            | LinearMotorOffset => self.apply_vector(param, Vec3::splat(value)),
            HoverHeight => self.hover_height = value.clamp(-1.0e6, 1.0e6),
            HoverEfficiency => self.hover_efficiency = efficiency(value),
            HoverTimescale => self.hover_timescale = timescale(value),
            Buoyancy => self.buoyancy = value.clamp(-1.0, 1.0),
            LinearDeflectionEfficiency => self.linear_deflection_efficiency = efficiency(value),
            LinearDeflectionTimescale => self.linear_deflection_timescale = timescale(value),
            LinearMotorTimescale => self.linear_motor_timescale = timescale(value),
            LinearMotorDecayTimescale => self.linear_motor_decay_timescale = timescale(value),
            AngularDeflectionEfficiency => self.angular_deflection_efficiency = efficiency(value),
            AngularDeflectionTimescale => self.angular_deflection_timescale = timescale(value),
            AngularMotorTimescale => self.angular_motor_timescale = timescale(value),
            AngularMotorDecayTimescale => self.angular_motor_decay_timescale = timescale(value),
            VerticalAttractionEfficiency => self.vertical_attraction_efficiency = efficiency(value),
            VerticalAttractionTimescale => self.vertical_attraction_timescale = timescale(value),
            BankingEfficiency => self.banking_efficiency = value.clamp(-1.0, 1.0),
            BankingMix => self.banking_mix = efficiency(value),
            BankingTimescale => self.banking_timescale = timescale(value),
            ReferenceFrame => log::warn!("vehicle reference frame needs a rotation, got {value}"),
        }
    }

    pub fn apply_vector(&mut self, param: VehicleParam, value: Vec3) {
        use VehicleParam::*;
        let clamp_ts = |v: Vec3| Vec3::new(timescale(v.x), timescale(v.y), timescale(v.z));
        match param {
            LinearFrictionTimescale => self.linear_friction_timescale = clamp_ts(value),
            AngularFrictionTimescale => self.angular_friction_timescale = clamp_ts(value),
            LinearMotorDirection => self.linear_motor_direction = clamp_length(value, MAX_LINEAR_MOTOR),
            AngularMotorDirection => self.angular_motor_direction = clamp_length(value, MAX_ANGULAR_MOTOR),
            LinearMotorOffset => self.linear_motor_offset = value,
            other => self.apply_float(other, value.x),
        }
    }

    pub fn apply_rotation(&mut self, param: VehicleParam, value: Quat) {
        match param {
            VehicleParam::ReferenceFrame => self.reference_frame = sanitize_quat(value),
            other => log::warn!("vehicle parameter {other:?} does not take a rotation"),
        }
    }
}

/// Per-axis fraction of velocity removed by friction this step.
#[inline]
fn friction_factor(timescales: Vec3, dt: f32) -> Vec3 {
    let f = |ts: f32| if ts >= TIMESCALE_OFF { 0.0 } else { (dt / ts).min(1.0) };
    Vec3::new(f(timescales.x), f(timescales.y), f(timescales.z))
}

#[derive(Debug)]
pub struct VehicleActor {
    enabled: bool,
    vehicle_type: VehicleType,
    params: VehicleParams,
    linear_motor: VMotor,
    angular_motor: VMotor,
}

impl Default for VehicleActor {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleActor {
    pub fn new() -> Self {
        Self {
            enabled: true,
            vehicle_type: VehicleType::None,
            params: VehicleParams::default(),
            linear_motor: VMotor::new("vehicle-linear", MAX_TIMESCALE, 120.0, 1.0),
            angular_motor: VMotor::new("vehicle-angular", MAX_TIMESCALE, 120.0, 1.0),
        }
    }

    pub fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    pub fn set_type(&mut self, vehicle_type: VehicleType) {
        self.vehicle_type = vehicle_type;
        self.params = VehicleParams::for_type(vehicle_type);
        self.linear_motor.zero();
        self.angular_motor.zero();
        self.sync_motors();
    }

    pub fn apply(&mut self, op: VehicleOp) {
        match op {
            VehicleOp::Type(t) => self.set_type(t),
            VehicleOp::Float(p, v) => self.params.apply_float(p, v),
            VehicleOp::Vector(p, v) => self.params.apply_vector(p, v),
            VehicleOp::Rotation(p, q) => self.params.apply_rotation(p, q),
            VehicleOp::SetFlags(f) => self.params.flags.insert(f),
            VehicleOp::RemoveFlags(f) => self.params.flags.remove(f),
        }
        // Setting a motor direction restarts it at full strength.
        if let VehicleOp::Float(p, _) | VehicleOp::Vector(p, _) = op {
            match p {
                VehicleParam::LinearMotorDirection => self.linear_motor.set_target(self.params.linear_motor_direction),
                VehicleParam::AngularMotorDirection => {
                    self.angular_motor.set_target(self.params.angular_motor_direction)
                }
                _ => {}
            }
        }
        self.sync_motors();
    }

    fn sync_motors(&mut self) {
        self.linear_motor.time_scale = self.params.linear_motor_timescale;
        self.linear_motor.target_decay_time_scale = self.params.linear_motor_decay_timescale;
        self.angular_motor.time_scale = self.params.angular_motor_timescale;
        self.angular_motor.target_decay_time_scale = self.params.angular_motor_decay_timescale;
    }

    fn gravity_scale(&self, ctx: &ActorCtx<'_>) -> f32 {
        let gravity_modifier = ctx.body.object().with_raw(|raw| raw.gravity_modifier);
        gravity_modifier * (1.0 - self.params.buoyancy)
    }

    fn restore_gravity(&self, ctx: &mut ActorCtx<'_>) {
        if let Some(body) = ctx.body.handle() {
            let scale = ctx.body.default_gravity_scale();
            ctx.engine.set_gravity_scale(body, scale);
        }
    }

    fn hover_target(&self, ctx: &ActorCtx<'_>, position: Vec3) -> f32 {
        let p = &self.params;
        let ground = ctx.terrain.height_at(position.x, position.y);
        let water = ctx.terrain.water_height();
        if p.flags.contains(VehicleFlags::HOVER_GLOBAL_HEIGHT) {
            p.hover_height
        } else if p.flags.contains(VehicleFlags::HOVER_WATER_ONLY) {
            water + p.hover_height
        } else if p.flags.contains(VehicleFlags::HOVER_TERRAIN_ONLY) {
            ground + p.hover_height
        } else {
            ground.max(water) + p.hover_height
        }
    }

    fn linear_step(&mut self, ctx: &ActorCtx<'_>, dt: f32, frame: Quat, position: Vec3, velocity: Vec3) -> Vec3 {
        let p = self.params;
        let velocity_v = frame.inverse() * velocity;

        let mut new_v = if self.linear_motor.target().length() > EPSILON {
            self.linear_motor.step_from(dt, velocity_v)
        } else {
            velocity_v
        };
        new_v -= new_v * friction_factor(p.linear_friction_timescale, dt);
        let mut new_w = frame * new_v;

        if p.flags.contains(VehicleFlags::LIMIT_MOTOR_UP) {
            new_w.z = new_w.z.min(velocity.z.max(0.0));
        }

        if p.hover_efficiency > 0.0 && p.hover_timescale < TIMESCALE_OFF {
            let target = self.hover_target(ctx, position);
            let skip = p.flags.contains(VehicleFlags::HOVER_UP_ONLY) && position.z > target;
            if !skip {
                let wanted = (target - position.z) / p.hover_timescale.max(dt);
                new_w.z += (wanted - new_w.z) * p.hover_efficiency;
            }
        }

        let speed = new_w.length();
        if p.linear_deflection_efficiency > 0.0 && speed > DEFLECTION_MIN_SPEED {
            let forward = frame * Vec3::X;
            let heading = if new_w.dot(forward) >= 0.0 { forward } else { -forward };
            let mut delta = (heading * speed - new_w)
                * (p.linear_deflection_efficiency * (dt / p.linear_deflection_timescale).min(1.0));
            if p.flags.contains(VehicleFlags::NO_DEFLECTION_UP) && delta.z > 0.0 {
                delta.z = 0.0;
            }
            new_w += delta;
        }
        new_w
    }

    fn angular_step(&mut self, dt: f32, frame: Quat, angular: Vec3, velocity: Vec3) -> Vec3 {
        let p = self.params;
        let angular_v = frame.inverse() * angular;

        let mut new_v = if self.angular_motor.target().length() > EPSILON {
            self.angular_motor.step_from(dt, angular_v)
        } else {
            angular_v
        };
        new_v -= new_v * friction_factor(p.angular_friction_timescale, dt);
        let mut new_w = frame * new_v;

        let forward = frame * Vec3::X;
        let up = frame * Vec3::Z;

        if p.vertical_attraction_efficiency > 0.0 && p.vertical_attraction_timescale < TIMESCALE_OFF {
            let mut error = up.cross(Vec3::Z);
            let mut tilt = new_w - Vec3::Z * new_w.z;
            if p.flags.contains(VehicleFlags::LIMIT_ROLL_ONLY) {
                error = forward * error.dot(forward);
                tilt = forward * new_w.dot(forward);
            }
            let rate = p.vertical_attraction_efficiency / p.vertical_attraction_timescale.max(dt);
            new_w += error * rate - tilt * p.vertical_attraction_efficiency;

            if p.banking_efficiency != 0.0 {
                let right = frame * Vec3::Y;
                let roll = right.z;
                let forward_speed = velocity.dot(forward).abs().min(1.0);
                let mix = (1.0 - p.banking_mix) + p.banking_mix * forward_speed;
                new_w.z -= roll * p.banking_efficiency * mix / p.banking_timescale.max(dt);
            }
        }

        let speed = velocity.length();
        if p.angular_deflection_efficiency > 0.0 && speed > DEFLECTION_MIN_SPEED {
            let direction = velocity / speed;
            let heading = if direction.dot(forward) >= 0.0 { direction } else { -direction };
            let error = forward.cross(heading);
            new_w += error * (p.angular_deflection_efficiency * (dt / p.angular_deflection_timescale).min(1.0) / dt);
        }
        new_w
    }
}

impl PhysActor for VehicleActor {
    fn kind(&self) -> ActorKind {
        ActorKind::Vehicle
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn refresh(&mut self, ctx: &mut ActorCtx<'_>) {
        if self.vehicle_type == VehicleType::None {
            self.enabled = false;
        }
        let active = self.is_active(ctx.body);
        if active {
            if let Some(body) = ctx.body.handle() {
                let scale = self.gravity_scale(ctx);
                ctx.engine.set_gravity_scale(body, scale);
                ctx.engine.set_damping(body, 0.0, 0.0);
            }
        } else {
            self.restore_gravity(ctx);
        }
        ctx.set_pre_step(ActorKind::Vehicle, active);
    }

    fn dispose(&mut self, ctx: &mut ActorCtx<'_>) {
        ctx.unregister_pre_step(ActorKind::Vehicle);
        self.restore_gravity(ctx);
    }

    fn before_step(&mut self, ctx: &mut ActorCtx<'_>, dt: f32) {
        if !self.is_active(ctx.body) || self.vehicle_type == VehicleType::None || dt <= 0.0 {
            return;
        }
        let raw = ctx.body.object().raw();
        let frame = raw.orientation * self.params.reference_frame;

        let linear = self.linear_step(ctx, dt, frame, raw.position, raw.velocity);
        let angular = self.angular_step(dt, frame, raw.angular_velocity, linear);

        let linear = clamp_length(linear, ctx.config.max_linear_velocity);
        let angular = clamp_length(angular, ctx.config.max_angular_velocity);
        ctx.body.force_velocity(ctx.engine, linear);
        ctx.body.force_angular_velocity(ctx.engine, angular);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::test_support::Rig;

    fn vehicle(rig: &mut Rig, vehicle_type: VehicleType) -> VehicleActor {
        let mut actor = VehicleActor::new();
        actor.apply(VehicleOp::Type(vehicle_type));
        rig.with_ctx(|ctx| actor.refresh(ctx));
        actor
    }

    #[test]
    fn codes_round_trip_through_the_scripting_numbers() {
        assert_eq!(VehicleType::from_code(2), Some(VehicleType::Car));
        assert_eq!(VehicleType::from_code(9), None);
        assert_eq!(VehicleParam::from_code(36), Some(VehicleParam::VerticalAttractionEfficiency));
        assert_eq!(VehicleParam::from_code(21), None);
        assert_eq!(VehicleParam::HoverTimescale.code(), 26);
        assert_eq!(VehicleFlags::from_bits_truncate(64 | 2), VehicleFlags::LIMIT_MOTOR_UP | VehicleFlags::LIMIT_ROLL_ONLY);
    }

    #[test]
    fn parameters_are_clamped() {
        let mut params = VehicleParams::for_type(VehicleType::Car);
        params.apply_float(VehicleParam::HoverEfficiency, 7.0);
        params.apply_float(VehicleParam::LinearMotorTimescale, -3.0);
        params.apply_vector(VehicleParam::LinearMotorDirection, Vec3::new(100.0, 0.0, 0.0));
        params.apply_float(VehicleParam::AngularFrictionTimescale, 0.5);
        assert_eq!(params.hover_efficiency, 1.0);
        assert_eq!(params.linear_motor_timescale, MIN_TIMESCALE);
        assert_eq!(params.linear_motor_direction, Vec3::new(MAX_LINEAR_MOTOR, 0.0, 0.0));
        assert_eq!(params.angular_friction_timescale, Vec3::splat(0.5));
    }

    #[test]
    fn car_motor_drives_forward() {
        let mut rig = Rig::prim(Vec3::new(50.0, 50.0, 22.0));
        let mut car = vehicle(&mut rig, VehicleType::Car);
        assert!(rig.pre_step.is_registered(1, ActorKind::Vehicle));
        car.apply(VehicleOp::Vector(VehicleParam::LinearMotorDirection, Vec3::new(10.0, 0.0, 0.0)));

        for _ in 0..50 {
            rig.tick(&mut car, 0.02);
        }
        let v = rig.body.object().velocity();
        assert!(v.x > 5.0, "velocity {v}");
        assert!(v.y.abs() < 1e-3 && v.z.abs() < 1e-3);
    }

    #[test]
    fn balloon_floats_to_its_global_height() {
        let mut rig = Rig::prim(Vec3::new(50.0, 50.0, 25.0));
        let mut balloon = vehicle(&mut rig, VehicleType::Balloon);
        balloon.apply(VehicleOp::Float(VehicleParam::HoverHeight, 40.0));
        balloon.apply(VehicleOp::Float(VehicleParam::HoverEfficiency, 1.0));
        balloon.apply(VehicleOp::Float(VehicleParam::HoverTimescale, 0.5));

        let handle = rig.body.handle().unwrap();
        assert_eq!(rig.engine.handle().lock().bodies[&handle].gravity_scale, 0.0);

        for _ in 0..400 {
            rig.tick(&mut balloon, 0.02);
        }
        assert!((rig.body.object().position().z - 40.0).abs() < 0.1);
    }

    #[test]
    fn vertical_attractor_rolls_back_upright() {
        let mut rig = Rig::prim(Vec3::new(50.0, 50.0, 22.0));
        rig.body.object().write_raw().orientation = Quat::from_rotation_x(0.3);
        let mut car = vehicle(&mut rig, VehicleType::Car);
        rig.with_ctx(|ctx| car.before_step(ctx, 0.02));
        assert!(rig.body.object().angular_velocity().x < 0.0);
    }

    #[test]
    fn clearing_the_type_disables_and_restores_gravity() {
        let mut rig = Rig::prim(Vec3::new(50.0, 50.0, 22.0));
        let mut boat = vehicle(&mut rig, VehicleType::Boat);
        let handle = rig.body.handle().unwrap();
        assert_eq!(rig.engine.handle().lock().bodies[&handle].gravity_scale, 0.0);

        boat.apply(VehicleOp::Type(VehicleType::None));
        rig.with_ctx(|ctx| boat.refresh(ctx));
        assert!(!boat.enabled());
        assert!(rig.pre_step.is_empty());
        assert_eq!(rig.engine.handle().lock().bodies[&handle].gravity_scale, 1.0);
    }
}
