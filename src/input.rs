// Operator input: axis sources, tunable scalars, teleop drive commands
//
// Commands run once per scheduler tick. They read their axes, scale the stick
// factors by the drive limits and hand velocities to the drive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::OperatorConfig;
use crate::drive::{ChassisDrive, CoordinateMode};

/// Tunable key shared by the teleop commands
pub const SENSITIVITY_KEY: &str = "Robot Relative Sensitivity";

/// A continuous operator input, normally in [-1, 1]
pub trait AxisSource {
    fn read(&self) -> f64;
}

impl<F: Fn() -> f64> AxisSource for F {
    fn read(&self) -> f64 {
        self()
    }
}

/// Axis whose value is pushed in by the host (e.g. from the latest network request)
#[derive(Debug, Clone, Default)]
pub struct LatchedAxis(Rc<Cell<f64>>);

impl LatchedAxis {
    pub fn new(value: f64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn set(&self, value: f64) {
        self.0.set(value);
    }
}

impl AxisSource for LatchedAxis {
    fn read(&self) -> f64 {
        self.0.get()
    }
}

/// Named floating-point values with defaults that can be overridden at runtime.
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct TunableStore {
    values: Rc<RefCell<HashMap<String, f64>>>,
}

impl TunableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `default` unless it already has a value
    pub fn init_float(&self, key: &str, default: f64) {
        self.values.borrow_mut().entry(key.to_string()).or_insert(default);
    }

    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.values.borrow().get(key).copied().unwrap_or(default)
    }

    pub fn set_float(&self, key: &str, value: f64) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }
}

/// Something the scheduler runs once per tick
pub trait DriveCommand {
    fn name(&self) -> &'static str;

    fn execute(&mut self, drive: &mut dyn ChassisDrive, dt: f64);
}

/// Robot-relative forward + rotation, no sideways motion
pub struct ArcadeDrive {
    forward: Box<dyn AxisSource>,
    rotation: Box<dyn AxisSource>,
    speed: Box<dyn AxisSource>,
    tunables: TunableStore,
    default_sensitivity: f64,
}

impl ArcadeDrive {
    /// `speed` supplies the speed multiplier (normal or turbo) each tick
    pub fn new(
        forward: impl AxisSource + 'static,
        rotation: impl AxisSource + 'static,
        speed: impl AxisSource + 'static,
        tunables: TunableStore,
        operator: &OperatorConfig,
    ) -> Self {
        tunables.init_float(SENSITIVITY_KEY, operator.arcade_sensitivity);
        Self {
            forward: Box::new(forward),
            rotation: Box::new(rotation),
            speed: Box::new(speed),
            tunables,
            default_sensitivity: operator.arcade_sensitivity,
        }
    }
}

impl DriveCommand for ArcadeDrive {
    fn name(&self) -> &'static str {
        "ArcadeDrive"
    }

    fn execute(&mut self, drive: &mut dyn ChassisDrive, _dt: f64) {
        let limits = *drive.limits();
        let speed = self.speed.read();
        let sensitivity = self.tunables.get_float(SENSITIVITY_KEY, self.default_sensitivity);

        drive.drive(
            self.forward.read() * speed * limits.max_forward_linear_velocity,
            0.0,
            self.rotation.read() * sensitivity * speed * limits.max_rotation_angular_velocity,
            CoordinateMode::RobotRelative,
        );
    }
}

/// Forward/sideways in the field frame, rotation scaled by sensitivity
pub struct FieldRelativeDrive {
    forward: Box<dyn AxisSource>,
    sideways: Box<dyn AxisSource>,
    rotation: Box<dyn AxisSource>,
    speed: Box<dyn AxisSource>,
    tunables: TunableStore,
    default_sensitivity: f64,
}

impl FieldRelativeDrive {
    pub fn new(
        forward: impl AxisSource + 'static,
        sideways: impl AxisSource + 'static,
        rotation: impl AxisSource + 'static,
        speed: impl AxisSource + 'static,
        tunables: TunableStore,
        operator: &OperatorConfig,
    ) -> Self {
        tunables.init_float(SENSITIVITY_KEY, operator.field_relative_sensitivity);
        Self {
            forward: Box::new(forward),
            sideways: Box::new(sideways),
            rotation: Box::new(rotation),
            speed: Box::new(speed),
            tunables,
            default_sensitivity: operator.field_relative_sensitivity,
        }
    }
}

impl DriveCommand for FieldRelativeDrive {
    fn name(&self) -> &'static str {
        "FieldRelativeDrive"
    }

    fn execute(&mut self, drive: &mut dyn ChassisDrive, _dt: f64) {
        let limits = *drive.limits();
        let speed = self.speed.read();
        let sensitivity = self.tunables.get_float(SENSITIVITY_KEY, self.default_sensitivity);

        drive.drive(
            self.forward.read() * speed * limits.max_forward_linear_velocity,
            self.sideways.read() * speed * limits.max_sideways_linear_velocity,
            self.rotation.read() * sensitivity * speed * limits.max_rotation_angular_velocity,
            CoordinateMode::FieldRelative,
        );
    }
}
