// src/motor.rs
//! Motors: small controllers that walk a current value toward a target.
//!
//! Pure numeric state, no engine access, so actors can unit test them in
//! isolation. `Motor<Vec3>` covers velocity and position, `Motor<f32>` height.

use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

use glam::Vec3;

/// Time scale value meaning "never".
pub const INFINITE: f32 = f32::INFINITY;

/// Default tolerance for [`Motor::error_is_zero`].
pub const DEFAULT_ERROR_ZERO_THRESHOLD: f32 = 0.01;

/// Values a motor can drive.
pub trait MotorValue: Copy + Debug + PartialEq + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> {
    const ZERO: Self;
    fn magnitude(self) -> f32;
}

impl MotorValue for f32 {
    const ZERO: Self = 0.0;
    #[inline(always)]
    fn magnitude(self) -> f32 {
        self.abs()
    }
}

impl MotorValue for Vec3 {
    const ZERO: Self = Vec3::ZERO;
    #[inline(always)]
    fn magnitude(self) -> f32 {
        self.length()
    }
}

/// Exponential approach motor.
///
/// Each step closes `dt / time_scale` of the remaining error (scaled by
/// `efficiency`). A finite `target_decay_time_scale` shrinks the target toward
/// zero while the motor is still working, which is how vehicle motors run down.
#[derive(Debug, Clone)]
pub struct Motor<T: MotorValue> {
    pub label: &'static str,
    pub time_scale: f32,
    pub target_decay_time_scale: f32,
    pub efficiency: f32,
    pub error_zero_threshold: f32,
    enabled: bool,
    target: T,
    current: T,
    last_error: T,
    last_correction: T,
}

pub type VMotor = Motor<Vec3>;
pub type FMotor = Motor<f32>;

impl<T: MotorValue> Motor<T> {
    pub fn new(label: &'static str, time_scale: f32, target_decay_time_scale: f32, efficiency: f32) -> Self {
        Self {
            label,
            time_scale,
            target_decay_time_scale,
            efficiency,
            error_zero_threshold: DEFAULT_ERROR_ZERO_THRESHOLD,
            enabled: true,
            target: T::ZERO,
            current: T::ZERO,
            last_error: T::ZERO,
            last_correction: T::ZERO,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.error_zero_threshold = threshold;
        self
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn target(&self) -> T {
        self.target
    }

    pub fn set_target(&mut self, target: T) {
        self.target = target;
    }

    #[inline]
    pub fn current(&self) -> T {
        self.current
    }

    pub fn set_current(&mut self, current: T) {
        self.current = current;
    }

    #[inline]
    pub fn error(&self) -> T {
        self.target - self.current
    }

    pub fn last_error(&self) -> T {
        self.last_error
    }

    pub fn last_correction(&self) -> T {
        self.last_correction
    }

    #[inline]
    pub fn error_is_zero(&self) -> bool {
        self.error().magnitude() <= self.error_zero_threshold
    }

    /// Correction for one step of length `dt` against `error`.
    fn step_error(&self, dt: f32, error: T) -> T {
        if !self.time_scale.is_finite() {
            return T::ZERO;
        }
        let fraction = if self.time_scale <= 0.0 {
            1.0
        } else {
            (dt / self.time_scale).min(1.0)
        };
        error * (fraction * self.efficiency)
    }

    /// Advance one step and return the new current value.
    pub fn step(&mut self, dt: f32) -> T {
        if !self.enabled {
            return self.current;
        }

        let error = self.error();
        if error.magnitude() > self.error_zero_threshold {
            let correction = self.step_error(dt, error);
            self.current = self.current + correction;
            self.last_correction = correction;

            if self.target_decay_time_scale.is_finite() && self.target_decay_time_scale > 0.0 {
                let decay = (dt / self.target_decay_time_scale).min(1.0);
                self.target = self.target * (1.0 - decay);
            }
        } else {
            // Close enough: snap.
            if self.target.magnitude() <= self.error_zero_threshold {
                self.target = T::ZERO;
            }
            self.current = self.target;
            self.last_correction = T::ZERO;
        }
        self.last_error = error;
        self.current
    }

    /// Replace the current value with a measurement and step from there.
    pub fn step_from(&mut self, dt: f32, current: T) -> T {
        self.current = current;
        self.step(dt)
    }

    /// Forget progress but keep the target.
    pub fn reset(&mut self) {
        self.current = T::ZERO;
        self.last_error = T::ZERO;
        self.last_correction = T::ZERO;
    }

    /// Clear target and current.
    pub fn zero(&mut self) {
        self.reset();
        self.target = T::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vmotor_converges_and_snaps() {
        let mut motor = VMotor::new("test", 0.2, INFINITE, 1.0);
        motor.set_target(Vec3::new(3.0, 0.0, 0.0));
        let mut steps = 0;
        while !motor.error_is_zero() && steps < 1000 {
            motor.step(0.02);
            steps += 1;
        }
        assert!(steps < 1000);
        motor.step(0.02);
        assert_eq!(motor.current(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn step_closes_dt_over_time_scale_of_the_error() {
        let mut motor = FMotor::new("height", 1.0, INFINITE, 1.0);
        motor.set_target(10.0);
        let v = motor.step(0.1);
        assert!((v - 1.0).abs() < 1e-5);
        assert!((motor.last_correction() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn efficiency_scales_the_correction() {
        let mut motor = FMotor::new("half", 1.0, INFINITE, 0.5);
        motor.set_target(10.0);
        assert!((motor.step(0.1) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn finite_decay_runs_the_target_down() {
        let mut motor = FMotor::new("decay", 1000.0, 1.0, 1.0);
        motor.set_target(10.0);
        motor.step(0.5);
        assert!((motor.target() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn infinite_time_scale_never_moves() {
        let mut motor = VMotor::new("off", INFINITE, INFINITE, 1.0);
        motor.set_target(Vec3::ONE);
        motor.step(1.0);
        assert_eq!(motor.current(), Vec3::ZERO);
    }

    #[test]
    fn zero_target_snaps_everything_to_zero() {
        let mut motor = VMotor::new("stop", 0.5, INFINITE, 1.0);
        motor.set_current(Vec3::new(0.001, 0.0, 0.0));
        motor.step(0.1);
        assert_eq!(motor.current(), Vec3::ZERO);
        assert_eq!(motor.target(), Vec3::ZERO);
    }

    #[test]
    fn reset_keeps_target_zero_clears_it() {
        let mut motor = VMotor::new("r", 1.0, INFINITE, 1.0);
        motor.set_target(Vec3::X);
        motor.step(0.1);
        motor.reset();
        assert_eq!(motor.current(), Vec3::ZERO);
        assert_eq!(motor.target(), Vec3::X);
        motor.zero();
        assert_eq!(motor.target(), Vec3::ZERO);
    }

    #[test]
    fn disabled_motor_holds_its_value() {
        let mut motor = FMotor::new("idle", 0.1, INFINITE, 1.0);
        motor.set_target(5.0);
        motor.set_enabled(false);
        assert_eq!(motor.step(0.1), 0.0);
    }
}
