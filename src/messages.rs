// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{ModuleState, MotorSetpoint, NUM_MODULES, NativeFeedback};

// Which teleop command interprets the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    #[default]
    Arcade,
    FieldRelative,
}

// Request from teleop -> runtime
// Axis values are stick factors in [-1, 1], not velocities
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveRequest {
    pub forward: f64,
    pub sideways: f64,
    pub rotation: f64,
    #[serde(default)]
    pub mode: DriveMode,
    #[serde(default)]
    pub turbo: bool,
}

// Sensor sample from the hardware bridge -> runtime, native units
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModuleFeedback {
    pub module: usize,
    pub steer_position: f64,
    pub drive_velocity: f64,
}

impl From<&ModuleFeedback> for NativeFeedback {
    fn from(msg: &ModuleFeedback) -> Self {
        Self {
            steer_position: msg.steer_position,
            drive_velocity: msg.drive_velocity,
        }
    }
}

// Gyro sample -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeadingSample {
    /// radians, counter-clockwise
    pub heading: f64,
}

// Setpoints from runtime -> hardware bridge, one per module per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSetpointMsg {
    pub module: usize,
    pub drive_motor_id: u8,
    pub steer_motor_id: u8,
    pub steer: MotorSetpoint,
    pub drive: MotorSetpoint,
}

// Actual or expected module states for telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatesMsg {
    pub states: [ModuleState; NUM_MODULES],
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// Commands are fresh but at least one module has lost its hardware link
    Degraded { modules: [bool; NUM_MODULES] },
}
