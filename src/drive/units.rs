// Unit conversions between physical units (meters, radians) and the
// motor controller's native units (encoder pulses, pulses per 100 ms).
//
// Every conversion is a linear scale derived from the module gearing; the
// steer position additionally carries the absolute encoder offset.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Meters per inch
pub const METERS_PER_INCH: f64 = 0.0254;

/// Motor controllers report velocity per 100 ms; this many 100 ms windows per second
pub const NATIVE_VELOCITY_WINDOWS_PER_SECOND: f64 = 10.0;

/// Convert inches to meters
pub fn inches(value: f64) -> f64 {
    value * METERS_PER_INCH
}

/// Convert a motor free speed in RPM to rad/s
pub fn rpm_to_radps(rpm: f64) -> f64 {
    rpm * TAU / 60.0
}

/// Gear ratios and encoder resolution for one swerve module.
///
/// Drive (input) -> drive gearing -> wheel (output)
/// Steer (input) -> steer gearing -> swerve (output)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleGearingProfile {
    pub drive_gear_ratio: f64,
    pub steer_gear_ratio: f64,
    /// meters
    pub wheel_radius: f64,
    /// pulses / motor revolution
    pub drive_encoder_pulses_per_revolution: f64,
    /// pulses / motor revolution
    pub steer_encoder_pulses_per_revolution: f64,
}

impl ModuleGearingProfile {
    /// Wheel travel per wheel revolution (meters)
    pub fn wheel_circumference(&self) -> f64 {
        TAU * self.wheel_radius
    }
}

/// Precomputed scale factors for one module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    wheel_pulses_per_meter: f64,
    swerve_pulses_per_radian: f64,
    /// Absolute steer offset in module rotations
    steer_offset: f64,
}

impl UnitConversion {
    pub fn new(gearing: &ModuleGearingProfile, steer_offset_rotations: f64) -> Self {
        let wheel_pulses_per_revolution =
            gearing.drive_encoder_pulses_per_revolution * gearing.drive_gear_ratio;
        let swerve_pulses_per_revolution =
            gearing.steer_encoder_pulses_per_revolution * gearing.steer_gear_ratio;

        Self {
            wheel_pulses_per_meter: wheel_pulses_per_revolution / gearing.wheel_circumference(),
            swerve_pulses_per_radian: swerve_pulses_per_revolution / TAU,
            steer_offset: steer_offset_rotations,
        }
    }

    pub fn wheel_pulses_per_meter(&self) -> f64 {
        self.wheel_pulses_per_meter
    }

    pub fn swerve_pulses_per_radian(&self) -> f64 {
        self.swerve_pulses_per_radian
    }

    pub fn meters_to_drive_pulses(&self, meters: f64) -> f64 {
        meters * self.wheel_pulses_per_meter
    }

    pub fn drive_pulses_to_meters(&self, pulses: f64) -> f64 {
        pulses / self.wheel_pulses_per_meter
    }

    /// m/s -> pulses / 100 ms
    pub fn velocity_to_native(&self, mps: f64) -> f64 {
        self.meters_to_drive_pulses(mps) / NATIVE_VELOCITY_WINDOWS_PER_SECOND
    }

    /// pulses / 100 ms -> m/s
    pub fn native_to_velocity(&self, native: f64) -> f64 {
        self.drive_pulses_to_meters(native * NATIVE_VELOCITY_WINDOWS_PER_SECOND)
    }

    /// Scale an angle delta (radians) to steer pulses, without the offset
    pub fn radians_to_steer_pulses(&self, radians: f64) -> f64 {
        radians * self.swerve_pulses_per_radian
    }

    /// Absolute module angle (radians) -> steer motor position (pulses)
    pub fn angle_to_steer_pulses(&self, radians: f64) -> f64 {
        (radians / TAU + self.steer_offset) * self.swerve_pulses_per_radian * TAU
    }

    /// Steer motor position (pulses) -> absolute module angle (radians, unwrapped)
    pub fn steer_pulses_to_angle(&self, pulses: f64) -> f64 {
        (pulses / (self.swerve_pulses_per_radian * TAU) - self.steer_offset) * TAU
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gearing() -> ModuleGearingProfile {
        ModuleGearingProfile {
            drive_gear_ratio: (50.0 / 14.0) * (16.0 / 28.0) * (45.0 / 15.0),
            steer_gear_ratio: 150.0 / 7.0,
            wheel_radius: inches(2.0),
            drive_encoder_pulses_per_revolution: 2048.0,
            steer_encoder_pulses_per_revolution: 2048.0,
        }
    }

    #[test]
    fn test_wheel_pulses_per_meter() {
        let units = UnitConversion::new(&gearing(), 0.0);
        let g = gearing();
        let expected = 2048.0 * g.drive_gear_ratio / (TAU * g.wheel_radius);
        assert_relative_eq!(units.wheel_pulses_per_meter(), expected, epsilon = 1e-9);
        // One full wheel circumference is one wheel revolution of pulses
        assert_relative_eq!(
            units.meters_to_drive_pulses(g.wheel_circumference()),
            2048.0 * g.drive_gear_ratio,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_conversions_invert() {
        let units = UnitConversion::new(&gearing(), 0.3114);
        for x in [-7.5, -1.0, 0.0, 0.001, 2.5, 123.0] {
            assert_relative_eq!(
                units.drive_pulses_to_meters(units.meters_to_drive_pulses(x)),
                x,
                epsilon = 1e-9
            );
            assert_relative_eq!(
                units.native_to_velocity(units.velocity_to_native(x)),
                x,
                epsilon = 1e-9
            );
            assert_relative_eq!(
                units.steer_pulses_to_angle(units.angle_to_steer_pulses(x)),
                x,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_native_velocity_is_per_100ms() {
        let units = UnitConversion::new(&gearing(), 0.0);
        let per_second = units.meters_to_drive_pulses(1.0);
        assert_relative_eq!(units.velocity_to_native(1.0), per_second / 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_steer_offset_shifts_zero() {
        let units = UnitConversion::new(&gearing(), 0.25);
        // Raw zero sits a quarter turn before the calibrated zero
        assert_relative_eq!(units.steer_pulses_to_angle(0.0), -TAU / 4.0, epsilon = 1e-12);
        let quarter = units.radians_to_steer_pulses(TAU / 4.0);
        assert_relative_eq!(units.steer_pulses_to_angle(quarter), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rpm_to_radps() {
        assert_relative_eq!(rpm_to_radps(60.0), TAU, epsilon = 1e-12);
    }
}
