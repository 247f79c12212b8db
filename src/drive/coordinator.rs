// Top-level drive facade
//
// Shapes operator velocity commands (clamp, deadband), runs the kinematics and
// fans the results out to the four modules in a fixed order every cycle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::io::ModuleIo;
use super::kinematics::{
    ChassisSpeeds, ChassisVelocityCommand, CoordinateMode, ModuleState, NUM_MODULES, SwerveKinematics,
};
use super::module::SwerveModule;
use super::pid::PidGains;
use crate::config::{ConfigError, DriveConfig, DriveLimits};

/// Robot heading in radians, counter-clockwise from the field +X axis
pub trait HeadingSource {
    fn heading(&self) -> f64;
}

impl<F: Fn() -> f64> HeadingSource for F {
    fn heading(&self) -> f64 {
        self()
    }
}

/// Anything that accepts chassis velocity commands once per cycle
pub trait ChassisDrive {
    fn drive(&mut self, forward: f64, sideways: f64, rotation: f64, mode: CoordinateMode);

    fn limits(&self) -> &DriveLimits;
}

/// Robot-frame displacement over one integration step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseDelta {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Clamp to +-max, then zero anything inside the deadband
fn shape_input(value: f64, max: f64, deadband: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let clamped = value.clamp(-max, max);
    if clamped.abs() < deadband * max { 0.0 } else { clamped }
}

pub struct DriveCoordinator<I: ModuleIo, H: HeadingSource> {
    /// front-left, front-right, back-left, back-right
    modules: [SwerveModule<I>; NUM_MODULES],
    kinematics: SwerveKinematics,
    heading: H,
    limits: DriveLimits,
    measured: [ModuleState; NUM_MODULES],
    expected: [ModuleState; NUM_MODULES],
}

impl<I: ModuleIo, H: HeadingSource> DriveCoordinator<I, H> {
    /// Build the drive. Fails if the configuration or module geometry is invalid.
    pub fn new(config: &DriveConfig, ios: [I; NUM_MODULES], heading: H) -> Result<Self, ConfigError> {
        config.validate()?;

        let kinematics = SwerveKinematics::new(
            config.mounts(),
            config.limits.max_wheel_linear_velocity,
            config.limits.min_wheel_linear_velocity,
            config.angular_velocity_coeff,
        )?;

        let mut index = 0;
        let modules = ios.map(|io| {
            let module = SwerveModule::new(index, config, io);
            index += 1;
            module
        });

        Ok(Self {
            modules,
            kinematics,
            heading,
            limits: config.limits,
            measured: [ModuleState::default(); NUM_MODULES],
            expected: [ModuleState::default(); NUM_MODULES],
        })
    }

    /// Sample all four modules back to back and keep the snapshot
    pub fn sample(&mut self) -> [ModuleState; NUM_MODULES] {
        for (slot, module) in self.measured.iter_mut().zip(self.modules.iter_mut()) {
            *slot = module.sample();
        }
        self.measured
    }

    /// Chassis velocity estimated from the last module snapshot
    pub fn chassis_velocity(&self) -> ChassisSpeeds {
        self.kinematics.to_chassis_velocity(&self.measured).speeds
    }

    /// Last sampled module states
    pub fn module_states(&self) -> [ModuleState; NUM_MODULES] {
        self.measured
    }

    /// Last commanded module states, after optimization
    pub fn expected_states(&self) -> [ModuleState; NUM_MODULES] {
        self.expected
    }

    /// Robot-frame displacement if the current chassis velocity holds for `dt` seconds
    pub fn pose_delta(&self, dt: f64) -> PoseDelta {
        let v = self.chassis_velocity();
        let (dx, dy, dtheta) = (v.forward * dt, v.sideways * dt, v.rotation * dt);

        // Twist exponential, so arcs integrate exactly
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };

        PoseDelta {
            dx: dx * s - dy * c,
            dy: dx * c + dy * s,
            dtheta,
        }
    }

    pub fn heading(&self) -> f64 {
        self.heading.heading()
    }

    /// Idle every module with zero output
    pub fn stop(&mut self) {
        for (slot, module) in self.expected.iter_mut().zip(self.modules.iter_mut()) {
            module.stop();
            *slot = module.target();
        }
    }

    pub fn degraded_modules(&self) -> [bool; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].is_degraded())
    }

    pub fn any_degraded(&self) -> bool {
        self.modules.iter().any(SwerveModule::is_degraded)
    }

    pub fn modules(&self) -> &[SwerveModule<I>; NUM_MODULES] {
        &self.modules
    }

    pub fn module_mut(&mut self, index: usize) -> &mut SwerveModule<I> {
        &mut self.modules[index]
    }

    pub fn set_steer_gains(&mut self, gains: PidGains) {
        for module in &mut self.modules {
            module.set_steer_gains(gains);
        }
    }

    pub fn set_drive_gains(&mut self, gains: PidGains) {
        for module in &mut self.modules {
            module.set_drive_gains(gains);
        }
    }

    pub fn set_angular_velocity_coeff(&mut self, coeff: f64) {
        self.kinematics.set_angular_velocity_coeff(coeff);
    }
}

impl<I: ModuleIo, H: HeadingSource> ChassisDrive for DriveCoordinator<I, H> {
    /// Command the chassis for this cycle
    ///
    /// # Arguments
    /// * `forward` - m/s, positive forward; clamped to the configured limit
    /// * `sideways` - m/s, positive left; clamped to the configured limit
    /// * `rotation` - rad/s, positive counter-clockwise; clamped to the configured limit
    /// * `mode` - robot-relative or field-relative (uses the heading source)
    fn drive(&mut self, forward: f64, sideways: f64, rotation: f64, mode: CoordinateMode) {
        let l = self.limits;
        let cmd = ChassisVelocityCommand {
            speeds: ChassisSpeeds::new(
                shape_input(forward, l.max_forward_linear_velocity, l.input_deadband),
                shape_input(sideways, l.max_sideways_linear_velocity, l.input_deadband),
                shape_input(rotation, l.max_rotation_angular_velocity, l.input_deadband),
            ),
            mode,
        };

        self.sample();
        let heading = self.heading.heading();
        let targets = self.kinematics.to_module_states(&cmd, heading);
        debug!("Drive {:?} at heading {:.3}: {:?}", cmd, heading, targets);

        for ((slot, module), target) in self.expected.iter_mut().zip(self.modules.iter_mut()).zip(targets) {
            *slot = module.set_target(target);
        }
    }

    fn limits(&self) -> &DriveLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::io::BusModuleIo;
    use crate::drive::kinematics::ModuleMountPoint;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::FRAC_PI_2;
    use std::time::Duration;

    fn zero_heading() -> f64 {
        0.0
    }

    fn quarter_heading() -> f64 {
        FRAC_PI_2
    }

    /// Calibrated wheels (no encoder offset) and no rotation compensation
    fn config() -> DriveConfig {
        let mut config = DriveConfig::default();
        for module in &mut config.modules {
            module.steer_offset = 0.0;
        }
        config.angular_velocity_coeff = 0.0;
        config
    }

    fn loopback_drive(config: &DriveConfig, heading: fn() -> f64) -> DriveCoordinator<BusModuleIo, fn() -> f64> {
        DriveCoordinator::new(config, std::array::from_fn(BusModuleIo::loopback), heading).unwrap()
    }

    #[test]
    fn test_forward_motion() {
        let mut drive = loopback_drive(&config(), zero_heading);
        drive.drive(1.0, 0.0, 0.0, CoordinateMode::RobotRelative);
        for state in drive.expected_states() {
            assert_relative_eq!(state.speed, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(state.angle, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_over_limit_is_clamped() {
        let config = config();
        let max = config.limits.max_forward_linear_velocity;
        let mut drive = loopback_drive(&config, zero_heading);
        drive.drive(2.0 * max, 0.0, 0.0, CoordinateMode::RobotRelative);
        for state in drive.expected_states() {
            assert_relative_eq!(state.speed, max, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_deadband_zeroes_small_inputs() {
        let config = config();
        let mut drive = loopback_drive(&config, zero_heading);
        drive.drive(0.0, 0.0, 1.0, CoordinateMode::RobotRelative);
        let turning = drive.expected_states();

        let tiny = 0.5 * config.limits.input_deadband * config.limits.max_forward_linear_velocity;
        drive.drive(tiny, -tiny, 0.0, CoordinateMode::RobotRelative);
        for (held, prev) in drive.expected_states().iter().zip(turning.iter()) {
            assert_eq!(held.speed, 0.0);
            assert_relative_eq!(held.angle, prev.angle, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut drive = loopback_drive(&config(), zero_heading);
        drive.drive(f64::NAN, f64::INFINITY, 0.0, CoordinateMode::RobotRelative);
        assert!(drive.expected_states().iter().all(|s| s.speed == 0.0));
    }

    #[test]
    fn test_chassis_velocity_from_measured_states() {
        let mut drive = loopback_drive(&config(), zero_heading);
        drive.drive(0.8, -0.4, 1.5, CoordinateMode::RobotRelative);
        drive.sample();

        let v = drive.chassis_velocity();
        assert_relative_eq!(v.forward, 0.8, epsilon = 1e-6);
        assert_relative_eq!(v.sideways, -0.4, epsilon = 1e-6);
        assert_relative_eq!(v.rotation, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_field_relative_uses_heading() {
        let mut drive = loopback_drive(&config(), quarter_heading);
        drive.drive(1.0, 0.0, 0.0, CoordinateMode::FieldRelative);
        drive.sample();

        // Field-forward while facing field +Y is robot-right
        let v = drive.chassis_velocity();
        assert_abs_diff_eq!(v.forward, 0.0, epsilon = 1e-6);
        assert_relative_eq!(v.sideways, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pose_delta() {
        let mut drive = loopback_drive(&config(), zero_heading);
        drive.drive(1.0, 0.0, 0.0, CoordinateMode::RobotRelative);
        drive.sample();
        let delta = drive.pose_delta(0.5);
        assert_relative_eq!(delta.dx, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(delta.dy, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(delta.dtheta, 0.0, epsilon = 1e-6);

        // Quarter circle of radius 1: ends at (1, 1)
        drive.drive(1.0, 0.0, 1.0, CoordinateMode::RobotRelative);
        drive.sample();
        let delta = drive.pose_delta(FRAC_PI_2);
        assert_relative_eq!(delta.dx, 1.0, epsilon = 1e-6);
        assert_relative_eq!(delta.dy, 1.0, epsilon = 1e-6);
        assert_relative_eq!(delta.dtheta, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_degraded_module_does_not_stop_others() {
        let ios = std::array::from_fn(|i| {
            if i == 2 {
                BusModuleIo::new(i, Duration::from_millis(100))
            } else {
                BusModuleIo::loopback(i)
            }
        });
        let mut drive = DriveCoordinator::new(&config(), ios, zero_heading as fn() -> f64).unwrap();
        drive.drive(1.0, 0.0, 0.0, CoordinateMode::RobotRelative);

        assert_eq!(drive.degraded_modules(), [false, false, true, false]);
        assert!(drive.any_degraded());
        for module in drive.modules() {
            let (_, drive_out) = module.io().outbox();
            assert!(drive_out.target > 0.0, "module {} not commanded", module.name());
        }

        drive.module_mut(2).io_mut().ingest(Default::default());
        drive.drive(1.0, 0.0, 0.0, CoordinateMode::RobotRelative);
        assert!(!drive.any_degraded());
    }

    #[test]
    fn test_stop_idles_modules() {
        let mut drive = loopback_drive(&config(), zero_heading);
        drive.drive(1.0, 0.0, 0.0, CoordinateMode::RobotRelative);
        drive.stop();
        for module in drive.modules() {
            assert_eq!(module.status(), crate::drive::module::ModuleStatus::Idle);
            assert_eq!(module.io().outbox().1.output, 0.0);
        }
        assert!(drive.expected_states().iter().all(|s| s.speed == 0.0));
    }

    #[test]
    fn test_degenerate_geometry_refuses_to_start() {
        let mut config = config();
        config.modules[3].mount = ModuleMountPoint::new(0.0, 0.0);
        let result = DriveCoordinator::new(&config, std::array::from_fn(BusModuleIo::loopback), zero_heading as fn() -> f64);
        assert!(matches!(result, Err(ConfigError::Geometry(_))));
    }
}
