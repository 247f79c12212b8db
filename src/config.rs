// Timeouts, topics, robot configuration
//
// Physical constants carry their units. Default units: meters, radians, seconds.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drive::kinematics::{GeometryError, ModuleMountPoint, NUM_MODULES, validate_geometry};
use crate::drive::pid::PidGains;
use crate::drive::units::{ModuleGearingProfile, inches, rpm_to_radps};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Module feedback older than this marks the module degraded
pub const FEEDBACK_TIMEOUT: Duration = Duration::from_millis(100);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "swerve/cmd/drive"; // operator requests
pub const TOPIC_RT_SETPOINTS: &str = "swerve/rt/setpoints"; // actuation
pub const TOPIC_FEEDBACK: &str = "swerve/state/feedback"; // module sensors
pub const TOPIC_HEADING: &str = "swerve/state/heading"; // gyro
pub const TOPIC_ACTUAL_STATES: &str = "swerve/actual";
pub const TOPIC_EXPECTED_STATES: &str = "swerve/expected";
pub const TOPIC_HEALTH: &str = "swerve/state/health";

// Module order used everywhere: front-left, front-right, back-left, back-right
pub const MODULE_NAMES: [&str; NUM_MODULES] = ["front_left", "front_right", "back_left", "back_right"];

// Robot geometry
const MODULE_CENTER_TO_ROBOT_CENTER_LENGTH_IN: f64 = 9.375;
const MODULE_CENTER_TO_ROBOT_CENTER_WIDTH_IN: f64 = 10.375;
const WHEEL_DIAMETER_IN: f64 = 4.0;

// Gearing
const DRIVE_GEAR_RATIO: f64 = (50.0 / 14.0) * (16.0 / 28.0) * (45.0 / 15.0);
const STEER_GEAR_RATIO: f64 = 150.0 / 7.0;
const TALON_ENCODER_PULSES_PER_REVOLUTION: f64 = 2048.0;

// Kraken X60 free speed
const DRIVE_MOTOR_FREE_SPEED_RPM: f64 = 6000.0;

// Absolute steer encoder readings with the wheels pointed forward, bevel gears inward (degrees)
const ABSOLUTE_ENCODER_OFFSETS_DEG: [f64; NUM_MODULES] = [256.113, 125.420, 341.719, 331.260];

const DRIVE_MOTOR_IDS: [u8; NUM_MODULES] = [10, 12, 14, 16];
const STEER_MOTOR_IDS: [u8; NUM_MODULES] = [11, 13, 15, 17];
const STEER_ENCODER_IDS: [u8; NUM_MODULES] = [40, 41, 42, 43];

/// Error types for loading the robot configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid module geometry: {0}")]
    Geometry(#[from] GeometryError),
}

/// Per-module hardware description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub mount: ModuleMountPoint,
    pub gearing: ModuleGearingProfile,
    /// Absolute steer encoder offset (module rotations)
    pub steer_offset: f64,
    #[serde(default)]
    pub drive_inverted: bool,
    #[serde(default)]
    pub steer_inverted: bool,
    pub drive_motor_id: u8,
    pub steer_motor_id: u8,
    pub steer_encoder_id: u8,
}

/// Velocity limits and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveLimits {
    /// m/s
    pub max_forward_linear_velocity: f64,
    /// m/s
    pub max_sideways_linear_velocity: f64,
    /// rad/s
    pub max_rotation_angular_velocity: f64,
    /// m/s
    pub max_wheel_linear_velocity: f64,
    /// m/s, wheels slower than this are considered stopped
    pub min_wheel_linear_velocity: f64,
    /// Fraction of each axis limit treated as zero
    pub input_deadband: f64,
}

/// Operator-facing scaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub normal_speed_multiplier: f64,
    pub turbo_speed_multiplier: f64,
    /// Default for "Robot Relative Sensitivity" under arcade drive
    pub arcade_sensitivity: f64,
    /// Default for "Robot Relative Sensitivity" under field-relative drive
    pub field_relative_sensitivity: f64,
}

/// Robot-wide drive configuration, assembled once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub modules: [ModuleConfig; NUM_MODULES],
    pub steer_gains: PidGains,
    pub drive_gains: PidGains,
    pub limits: DriveLimits,
    pub operator: OperatorConfig,
    /// Extra rotation (rad/s) while translating and rotating together
    pub angular_velocity_coeff: f64,
    /// seconds
    pub control_period: f64,
}

fn default_gearing() -> ModuleGearingProfile {
    ModuleGearingProfile {
        drive_gear_ratio: DRIVE_GEAR_RATIO,
        steer_gear_ratio: STEER_GEAR_RATIO,
        wheel_radius: inches(WHEEL_DIAMETER_IN) / 2.0,
        drive_encoder_pulses_per_revolution: TALON_ENCODER_PULSES_PER_REVOLUTION,
        steer_encoder_pulses_per_revolution: TALON_ENCODER_PULSES_PER_REVOLUTION,
    }
}

fn default_mounts() -> [ModuleMountPoint; NUM_MODULES] {
    let length = inches(MODULE_CENTER_TO_ROBOT_CENTER_LENGTH_IN);
    let width = inches(MODULE_CENTER_TO_ROBOT_CENTER_WIDTH_IN);
    [
        ModuleMountPoint::new(length, width),
        ModuleMountPoint::new(length, -width),
        ModuleMountPoint::new(-length, width),
        ModuleMountPoint::new(-length, -width),
    ]
}

impl Default for DriveLimits {
    fn default() -> Self {
        let gearing = default_gearing();
        let max_wheel_angular = rpm_to_radps(DRIVE_MOTOR_FREE_SPEED_RPM) / gearing.drive_gear_ratio;
        let max_wheel_linear = gearing.wheel_radius * max_wheel_angular;
        let module_distance = default_mounts()[0].radius();

        Self {
            max_forward_linear_velocity: max_wheel_linear,
            max_sideways_linear_velocity: max_wheel_linear,
            // omega = v / r
            max_rotation_angular_velocity: max_wheel_linear / module_distance,
            max_wheel_linear_velocity: max_wheel_linear,
            min_wheel_linear_velocity: 0.002,
            input_deadband: 0.02,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            normal_speed_multiplier: 0.80,
            turbo_speed_multiplier: 0.95,
            arcade_sensitivity: 0.2,
            field_relative_sensitivity: 0.4,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        let mounts = default_mounts();
        let modules = std::array::from_fn(|i| ModuleConfig {
            name: MODULE_NAMES[i].to_string(),
            mount: mounts[i],
            gearing: default_gearing(),
            steer_offset: ABSOLUTE_ENCODER_OFFSETS_DEG[i] / 360.0,
            drive_inverted: false,
            steer_inverted: false,
            drive_motor_id: DRIVE_MOTOR_IDS[i],
            steer_motor_id: STEER_MOTOR_IDS[i],
            steer_encoder_id: STEER_ENCODER_IDS[i],
        });

        Self {
            modules,
            steer_gains: PidGains::new(4.0, 0.0, 0.0, 0.0),
            drive_gains: PidGains::new(0.001, 0.0, 0.0, 0.01),
            limits: DriveLimits::default(),
            operator: OperatorConfig::default(),
            angular_velocity_coeff: 0.04,
            control_period: 1.0 / LOOP_HZ as f64,
        }
    }
}

fn require(field: &'static str, ok: bool, value: f64) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("got {}", value),
        })
    }
}

impl DriveConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn mounts(&self) -> [ModuleMountPoint; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].mount)
    }

    /// Check limits and geometry. Any failure here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.limits;
        require("max_forward_linear_velocity", l.max_forward_linear_velocity > 0.0, l.max_forward_linear_velocity)?;
        require("max_sideways_linear_velocity", l.max_sideways_linear_velocity > 0.0, l.max_sideways_linear_velocity)?;
        require("max_rotation_angular_velocity", l.max_rotation_angular_velocity > 0.0, l.max_rotation_angular_velocity)?;
        require("max_wheel_linear_velocity", l.max_wheel_linear_velocity > 0.0, l.max_wheel_linear_velocity)?;
        require(
            "min_wheel_linear_velocity",
            (0.0..l.max_wheel_linear_velocity).contains(&l.min_wheel_linear_velocity),
            l.min_wheel_linear_velocity,
        )?;
        require("input_deadband", (0.0..1.0).contains(&l.input_deadband), l.input_deadband)?;
        require("control_period", self.control_period > 0.0, self.control_period)?;
        require("angular_velocity_coeff", self.angular_velocity_coeff >= 0.0, self.angular_velocity_coeff)?;

        for module in &self.modules {
            let g = &module.gearing;
            require("drive_gear_ratio", g.drive_gear_ratio > 0.0, g.drive_gear_ratio)?;
            require("steer_gear_ratio", g.steer_gear_ratio > 0.0, g.steer_gear_ratio)?;
            require("wheel_radius", g.wheel_radius > 0.0, g.wheel_radius)?;
            require(
                "drive_encoder_pulses_per_revolution",
                g.drive_encoder_pulses_per_revolution > 0.0,
                g.drive_encoder_pulses_per_revolution,
            )?;
            require(
                "steer_encoder_pulses_per_revolution",
                g.steer_encoder_pulses_per_revolution > 0.0,
                g.steer_encoder_pulses_per_revolution,
            )?;
            require("steer_offset", true, module.steer_offset)?;
        }

        validate_geometry(&self.mounts())?;
        Ok(())
    }
}
