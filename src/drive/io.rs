// Hardware seam for one swerve module
//
// The core never talks to motor controllers directly. It writes setpoints and
// reads the last known sensor values through `ModuleIo`. All calls are
// non-blocking.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Native output full scale of the motor controllers (output units per 100% duty)
pub const FULL_SCALE_OUTPUT: f64 = 1023.0;

/// One loop's command to a motor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorSetpoint {
    /// Target in native units (steer: pulses, drive: pulses / 100 ms)
    pub target: f64,
    /// Closed-loop output, normalized to [-1, 1]
    pub output: f64,
}

impl MotorSetpoint {
    pub fn new(target: f64, output: f64) -> Self {
        Self { target, output }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Error types for module hardware access
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModuleIoError {
    #[error("Module {module} is disconnected")]
    Disconnected { module: usize },

    #[error("Feedback from module {module} is stale ({age:?} old)")]
    Stale { module: usize, age: Duration },

    #[error("Module {module} has not reported feedback yet")]
    NoFeedback { module: usize },
}

/// Actuator/sensor interface for one module
pub trait ModuleIo {
    fn set_steer_target(&mut self, setpoint: MotorSetpoint) -> Result<(), ModuleIoError>;

    fn set_drive_target(&mut self, setpoint: MotorSetpoint) -> Result<(), ModuleIoError>;

    /// Last sampled steer motor position (pulses)
    fn steer_position(&self) -> Result<f64, ModuleIoError>;

    /// Last sampled drive velocity (pulses / 100 ms)
    fn drive_velocity(&self) -> Result<f64, ModuleIoError>;
}

/// Sensor values for one module in native units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeFeedback {
    pub steer_position: f64,
    pub drive_velocity: f64,
}

/// `ModuleIo` backed by the runtime's message bus.
///
/// Setpoints land in an outbox the runtime publishes after each cycle; the
/// runtime copies incoming feedback in before each cycle. In loopback mode the
/// outbox is echoed straight back as feedback, which stands in for an ideal
/// actuator when no hardware is attached.
#[derive(Debug)]
pub struct BusModuleIo {
    module: usize,
    loopback: bool,
    feedback_timeout: Duration,
    feedback: Option<(NativeFeedback, Instant)>,
    steer_out: MotorSetpoint,
    drive_out: MotorSetpoint,
}

impl BusModuleIo {
    pub fn new(module: usize, feedback_timeout: Duration) -> Self {
        Self {
            module,
            loopback: false,
            feedback_timeout,
            feedback: None,
            steer_out: MotorSetpoint::zero(),
            drive_out: MotorSetpoint::zero(),
        }
    }

    pub fn loopback(module: usize) -> Self {
        Self {
            loopback: true,
            feedback: Some((NativeFeedback::default(), Instant::now())),
            ..Self::new(module, Duration::MAX)
        }
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// Record a feedback sample received from the hardware bridge
    pub fn ingest(&mut self, feedback: NativeFeedback) {
        self.feedback = Some((feedback, Instant::now()));
    }

    /// Setpoints written during the last cycle, as (steer, drive)
    pub fn outbox(&self) -> (MotorSetpoint, MotorSetpoint) {
        (self.steer_out, self.drive_out)
    }

    fn fresh_feedback(&self) -> Result<NativeFeedback, ModuleIoError> {
        let (sample, received_at) = self.feedback.ok_or(ModuleIoError::NoFeedback {
            module: self.module,
        })?;
        let age = received_at.elapsed();
        if !self.loopback && age > self.feedback_timeout {
            return Err(ModuleIoError::Stale {
                module: self.module,
                age,
            });
        }
        Ok(sample)
    }

    fn echo(&mut self) {
        if self.loopback {
            self.ingest(NativeFeedback {
                steer_position: self.steer_out.target,
                drive_velocity: self.drive_out.target,
            });
        }
    }
}

impl ModuleIo for BusModuleIo {
    fn set_steer_target(&mut self, setpoint: MotorSetpoint) -> Result<(), ModuleIoError> {
        self.steer_out = setpoint;
        self.echo();
        Ok(())
    }

    fn set_drive_target(&mut self, setpoint: MotorSetpoint) -> Result<(), ModuleIoError> {
        self.drive_out = setpoint;
        self.echo();
        Ok(())
    }

    fn steer_position(&self) -> Result<f64, ModuleIoError> {
        self.fresh_feedback().map(|f| f.steer_position)
    }

    fn drive_velocity(&self) -> Result<f64, ModuleIoError> {
        self.fresh_feedback().map(|f| f.drive_velocity)
    }
}
