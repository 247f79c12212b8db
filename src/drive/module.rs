// Closed-loop control for one swerve module
//
// Each call to `set_target` runs the steer angle loop and the drive velocity
// loop once and writes both setpoints. Hardware faults never propagate out of
// here; they flip the module into a degraded state that callers can check.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::{debug, info, warn};

use super::io::{FULL_SCALE_OUTPUT, ModuleIo, ModuleIoError, MotorSetpoint};
use super::kinematics::{ModuleState, wrap_angle};
use super::pid::{PidController, PidGains};
use super::units::UnitConversion;
use crate::config::DriveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// No target since construction or the last stop
    Idle,
    Tracking,
}

/// Pick the equivalent target that needs at most a quarter turn of steering.
///
/// A difference of exactly pi/2 is left alone.
pub fn optimize(target: ModuleState, current_angle: f64) -> ModuleState {
    let delta = wrap_angle(target.angle - current_angle);
    if delta.abs() > FRAC_PI_2 {
        ModuleState::new(-target.speed, target.angle + PI)
    } else {
        target
    }
}

fn normalize_output(native: f64) -> f64 {
    (native / FULL_SCALE_OUTPUT).clamp(-1.0, 1.0)
}

fn to_hardware(setpoint: MotorSetpoint, inverted: bool) -> MotorSetpoint {
    if inverted {
        MotorSetpoint::new(-setpoint.target, -setpoint.output)
    } else {
        setpoint
    }
}

pub struct SwerveModule<I: ModuleIo> {
    index: usize,
    name: String,
    units: UnitConversion,
    drive_inverted: bool,
    steer_inverted: bool,
    drive_motor_id: u8,
    steer_motor_id: u8,
    io: I,
    steer_pid: PidController,
    drive_pid: PidController,
    period: f64,
    status: ModuleStatus,
    // Last sampled values
    state: ModuleState,
    steer_pulses: f64,
    last_read_ok: bool,
    target: ModuleState,
    degraded: bool,
}

impl<I: ModuleIo> SwerveModule<I> {
    /// Build module `index` from the robot configuration
    pub fn new(index: usize, config: &DriveConfig, io: I) -> Self {
        let module = &config.modules[index];
        let units = UnitConversion::new(&module.gearing, module.steer_offset);
        // Unsampled modules are assumed to sit at angle 0
        let steer_pulses = units.angle_to_steer_pulses(0.0);
        Self {
            index,
            name: module.name.clone(),
            units,
            drive_inverted: module.drive_inverted,
            steer_inverted: module.steer_inverted,
            drive_motor_id: module.drive_motor_id,
            steer_motor_id: module.steer_motor_id,
            io,
            steer_pid: PidController::new(config.steer_gains),
            drive_pid: PidController::new(config.drive_gains),
            period: config.control_period,
            status: ModuleStatus::Idle,
            state: ModuleState::default(),
            steer_pulses,
            last_read_ok: false,
            target: ModuleState::default(),
            degraded: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drive_motor_id(&self) -> u8 {
        self.drive_motor_id
    }

    pub fn steer_motor_id(&self) -> u8 {
        self.steer_motor_id
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    /// True while the hardware link is failing; `state()` is stale until it clears
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Last sampled state. Never touches hardware.
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Last commanded (optimized) target
    pub fn target(&self) -> ModuleState {
        self.target
    }

    pub fn units(&self) -> &UnitConversion {
        &self.units
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }

    pub fn set_steer_gains(&mut self, gains: PidGains) {
        self.steer_pid.set_gains(gains);
    }

    pub fn set_drive_gains(&mut self, gains: PidGains) {
        self.drive_pid.set_gains(gains);
    }

    /// Read the sensors and cache the resulting state
    ///
    /// On failure the previous sample is kept and the module is marked degraded.
    pub fn sample(&mut self) -> ModuleState {
        match self.read_native() {
            Ok((steer_pulses, drive_native)) => {
                self.steer_pulses = steer_pulses;
                self.state = ModuleState::new(
                    self.units.native_to_velocity(drive_native),
                    self.units.steer_pulses_to_angle(steer_pulses),
                );
                self.last_read_ok = true;
            }
            Err(e) => {
                self.last_read_ok = false;
                self.fault(e);
            }
        }
        self.state
    }

    /// Command a new target and run both loops once
    ///
    /// Returns the target after optimization.
    pub fn set_target(&mut self, target: ModuleState) -> ModuleState {
        let optimized = optimize(target, self.state.angle);

        // Steer: shortest-way angle error, scaled to pulses
        let angle_error = wrap_angle(optimized.angle - self.state.angle);
        let error_pulses = self.units.radians_to_steer_pulses(angle_error);
        let steer_output = self.steer_pid.calculate(error_pulses, self.period);
        let steer = MotorSetpoint::new(self.steer_pulses + error_pulses, normalize_output(steer_output));

        // Drive: velocity loop in native units plus feedforward
        let target_native = self.units.velocity_to_native(optimized.speed);
        let measured_native = self.units.velocity_to_native(self.state.speed);
        let drive_output =
            self.drive_pid
                .calculate_with_feedforward(target_native, measured_native, self.period);
        let drive = MotorSetpoint::new(target_native, normalize_output(drive_output));

        debug!(
            "Module {}: target speed={:.3} angle={:.3}, steer out={:.3}, drive out={:.3}",
            self.name, optimized.speed, optimized.angle, steer.output, drive.output
        );

        let written = self.write(steer, drive);
        self.finish_cycle(written);

        self.status = ModuleStatus::Tracking;
        self.target = optimized;
        optimized
    }

    /// Zero both outputs, hold the current steer position and go idle
    pub fn stop(&mut self) {
        self.steer_pid.reset();
        self.drive_pid.reset();

        let written = self.write(MotorSetpoint::new(self.steer_pulses, 0.0), MotorSetpoint::zero());
        self.finish_cycle(written);

        self.status = ModuleStatus::Idle;
        self.target = ModuleState::new(0.0, self.state.angle);
    }

    fn read_native(&self) -> Result<(f64, f64), ModuleIoError> {
        let steer = self.io.steer_position()?;
        let drive = self.io.drive_velocity()?;
        let steer = if self.steer_inverted { -steer } else { steer };
        let drive = if self.drive_inverted { -drive } else { drive };
        Ok((steer, drive))
    }

    fn write(&mut self, steer: MotorSetpoint, drive: MotorSetpoint) -> Result<(), ModuleIoError> {
        self.io.set_steer_target(to_hardware(steer, self.steer_inverted))?;
        self.io.set_drive_target(to_hardware(drive, self.drive_inverted))
    }

    fn finish_cycle(&mut self, written: Result<(), ModuleIoError>) {
        match written {
            Err(e) => self.fault(e),
            Ok(()) if self.last_read_ok && self.degraded => {
                info!("Module {} recovered", self.name);
                self.degraded = false;
            }
            Ok(()) => {}
        }
    }

    fn fault(&mut self, error: ModuleIoError) {
        if !self.degraded {
            warn!("Module {} degraded: {}", self.name, error);
        }
        self.degraded = true;
    }
}
