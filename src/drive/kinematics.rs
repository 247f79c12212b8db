// Swerve inverse/forward kinematics for a 4-module base
//
// Axes follow the right hand rule: +X forward, +Y left, rotation positive
// counter-clockwise viewed from above.

use std::f64::consts::{PI, TAU};

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

/// Number of swerve modules on the base
pub const NUM_MODULES: usize = 4;

/// Velocity components across all modules (vx, vy per module)
const NUM_COMPONENTS: usize = 2 * NUM_MODULES;

/// Wrap an angle to (-pi, pi]
pub fn wrap_angle(radians: f64) -> f64 {
    let r = radians.rem_euclid(TAU);
    if r > PI { r - TAU } else { r }
}

/// Module offset from the robot center (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleMountPoint {
    pub x: f64,
    pub y: f64,
}

impl ModuleMountPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn radius(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Speed and heading of one module. The angle is always in (-pi, pi].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// m/s, signed
    pub speed: f64,
    /// radians
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self {
            speed,
            angle: wrap_angle(angle),
        }
    }

    /// Velocity components (vx, vy) in the robot frame
    pub fn components(&self) -> (f64, f64) {
        (self.speed * self.angle.cos(), self.speed * self.angle.sin())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateMode {
    #[default]
    RobotRelative,
    FieldRelative,
}

/// Body velocity: m/s forward, m/s sideways (left), rad/s counter-clockwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    pub forward: f64,
    pub sideways: f64,
    pub rotation: f64,
}

impl ChassisSpeeds {
    pub fn new(forward: f64, sideways: f64, rotation: f64) -> Self {
        Self {
            forward,
            sideways,
            rotation,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisVelocityCommand {
    pub speeds: ChassisSpeeds,
    pub mode: CoordinateMode,
}

impl ChassisVelocityCommand {
    pub fn robot_relative(forward: f64, sideways: f64, rotation: f64) -> Self {
        Self {
            speeds: ChassisSpeeds::new(forward, sideways, rotation),
            mode: CoordinateMode::RobotRelative,
        }
    }

    pub fn field_relative(forward: f64, sideways: f64, rotation: f64) -> Self {
        Self {
            speeds: ChassisSpeeds::new(forward, sideways, rotation),
            mode: CoordinateMode::FieldRelative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Mount point of module {module} is not finite")]
    NonFinite { module: usize },

    #[error("Module {module} is mounted at the robot center")]
    AtCenter { module: usize },

    #[error("Modules {a} and {b} share a mount point")]
    Duplicate { a: usize, b: usize },

    #[error("Module geometry does not determine chassis motion")]
    Singular,
}

/// Reject geometry the kinematics cannot invert
pub fn validate_geometry(mounts: &[ModuleMountPoint; NUM_MODULES]) -> Result<(), GeometryError> {
    for (i, m) in mounts.iter().enumerate() {
        if !m.x.is_finite() || !m.y.is_finite() {
            return Err(GeometryError::NonFinite { module: i });
        }
        if m.radius() < 1e-6 {
            return Err(GeometryError::AtCenter { module: i });
        }
    }
    for a in 0..NUM_MODULES {
        for b in (a + 1)..NUM_MODULES {
            let (pa, pb) = (mounts[a], mounts[b]);
            if (pa.x - pb.x).hypot(pa.y - pb.y) < 1e-6 {
                return Err(GeometryError::Duplicate { a, b });
            }
        }
    }
    Ok(())
}

pub struct SwerveKinematics {
    mounts: [ModuleMountPoint; NUM_MODULES],
    /// Pseudo-inverse of the body -> module velocity map, fitted once
    inverse: SMatrix<f64, 3, NUM_COMPONENTS>,
    max_wheel_speed: f64,
    min_wheel_speed: f64,
    angular_velocity_coeff: f64,
    /// Angles held while the base is stationary
    last_angles: [f64; NUM_MODULES],
}

impl SwerveKinematics {
    pub fn new(
        mounts: [ModuleMountPoint; NUM_MODULES],
        max_wheel_speed: f64,
        min_wheel_speed: f64,
        angular_velocity_coeff: f64,
    ) -> Result<Self, GeometryError> {
        validate_geometry(&mounts)?;

        // Each module contributes two rows:
        // vx_i = forward - rotation * y_i
        // vy_i = sideways + rotation * x_i
        let mut forward_map = SMatrix::<f64, NUM_COMPONENTS, 3>::zeros();
        for (i, m) in mounts.iter().enumerate() {
            forward_map[(2 * i, 0)] = 1.0;
            forward_map[(2 * i, 2)] = -m.y;
            forward_map[(2 * i + 1, 1)] = 1.0;
            forward_map[(2 * i + 1, 2)] = m.x;
        }

        let normal = forward_map.transpose() * forward_map;
        let normal_inv = normal.try_inverse().ok_or(GeometryError::Singular)?;
        let inverse = normal_inv * forward_map.transpose();

        Ok(Self {
            mounts,
            inverse,
            max_wheel_speed,
            min_wheel_speed,
            angular_velocity_coeff,
            last_angles: [0.0; NUM_MODULES],
        })
    }

    pub fn mounts(&self) -> &[ModuleMountPoint; NUM_MODULES] {
        &self.mounts
    }

    pub fn set_angular_velocity_coeff(&mut self, coeff: f64) {
        self.angular_velocity_coeff = coeff;
    }

    /// Seed the angles held while stationary, e.g. from measured states
    pub fn reset_headings(&mut self, angles: [f64; NUM_MODULES]) {
        self.last_angles = angles.map(wrap_angle);
    }

    fn max_radius(&self) -> f64 {
        self.mounts.iter().map(ModuleMountPoint::radius).fold(0.0, f64::max)
    }

    /// Convert a chassis command to per-module targets
    ///
    /// # Arguments
    /// * `cmd` - Chassis command; field-relative commands are rotated into the robot frame
    /// * `heading` - Current robot heading in radians (only used for field-relative;
    ///   a non-finite heading is treated as robot-relative)
    pub fn to_module_states(
        &mut self,
        cmd: &ChassisVelocityCommand,
        heading: f64,
    ) -> [ModuleState; NUM_MODULES] {
        let ChassisSpeeds {
            mut forward,
            mut sideways,
            mut rotation,
        } = cmd.speeds;

        // Without a usable heading the command stays in the robot frame
        if cmd.mode == CoordinateMode::FieldRelative && heading.is_finite() {
            let (sin, cos) = (-heading).sin_cos();
            (forward, sideways) = (forward * cos - sideways * sin, forward * sin + sideways * cos);
        }

        // Translating while rotating needs a bit of extra rotation to make up
        // for computing in the instantaneous frame. The coefficient is empirical.
        let translating = forward.hypot(sideways) > self.min_wheel_speed;
        let rotating = rotation.abs() * self.max_radius() > self.min_wheel_speed;
        if translating && rotating {
            rotation += self.angular_velocity_coeff * rotation.signum();
        }

        let mut states = self.mounts.map(|m| {
            let vx = forward - rotation * m.y;
            let vy = sideways + rotation * m.x;
            ModuleState::new(vx.hypot(vy), vy.atan2(vx))
        });

        if states.iter().all(|s| s.speed < self.min_wheel_speed) {
            return self.last_angles.map(|angle| ModuleState { speed: 0.0, angle });
        }

        // Scale every wheel down together so the motion direction is preserved
        let fastest = states.iter().map(|s| s.speed).fold(0.0, f64::max);
        if fastest > self.max_wheel_speed {
            let scale = self.max_wheel_speed / fastest;
            for state in &mut states {
                state.speed *= scale;
            }
        }

        self.last_angles = states.map(|s| s.angle);
        states
    }

    /// Least-squares chassis velocity from measured module states
    pub fn to_chassis_velocity(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisVelocityCommand {
        let mut measured = SVector::<f64, NUM_COMPONENTS>::zeros();
        for (i, state) in states.iter().enumerate() {
            let (vx, vy) = state.components();
            measured[2 * i] = vx;
            measured[2 * i + 1] = vy;
        }

        let body = self.inverse * measured;
        ChassisVelocityCommand::robot_relative(body[0], body[1], body[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const LENGTH: f64 = 0.238125;
    const WIDTH: f64 = 0.263525;
    const MAX_SPEED: f64 = 5.2;
    const MIN_SPEED: f64 = 0.002;

    fn mounts() -> [ModuleMountPoint; NUM_MODULES] {
        [
            ModuleMountPoint::new(LENGTH, WIDTH),
            ModuleMountPoint::new(LENGTH, -WIDTH),
            ModuleMountPoint::new(-LENGTH, WIDTH),
            ModuleMountPoint::new(-LENGTH, -WIDTH),
        ]
    }

    fn kinematics(coeff: f64) -> SwerveKinematics {
        SwerveKinematics::new(mounts(), MAX_SPEED, MIN_SPEED, coeff).unwrap()
    }

    #[test]
    fn test_wrap_angle_range() {
        assert_relative_eq!(wrap_angle(PI), PI);
        assert_relative_eq!(wrap_angle(-PI), PI);
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-0.5), -0.5, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(7.0 * TAU + 0.25), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_forward_motion() {
        let mut kin = kinematics(0.04);
        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(1.0, 0.0, 0.0), 0.0);
        for s in states {
            assert_relative_eq!(s.speed, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(s.angle, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_pure_translation_angles_match() {
        let mut kin = kinematics(0.04);
        for (f, s) in [(0.3, 0.4), (-1.2, 0.5), (0.0, -2.0), (-0.7, -0.7)] {
            let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(f, s, 0.0), 0.0);
            let expected = f64::atan2(s, f);
            for state in states {
                assert_relative_eq!(state.angle, expected, epsilon = 1e-12);
                assert_relative_eq!(state.speed, f64::hypot(f, s), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rotation_only() {
        let mut kin = kinematics(0.04);
        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(0.0, 0.0, 1.0), 0.0);
        let radius = f64::hypot(LENGTH, WIDTH);
        for (state, mount) in states.iter().zip(mounts()) {
            assert_relative_eq!(state.speed, radius, epsilon = 1e-12);
            // Wheel direction is perpendicular to the radius vector
            let (vx, vy) = state.components();
            assert_abs_diff_eq!(vx * mount.x + vy * mount.y, 0.0, epsilon = 1e-12);
        }
        // Front-left at (0.238, 0.263)
        assert_relative_eq!(states[0].speed, 0.3554, epsilon = 1e-3);
        assert_relative_eq!(states[0].angle, f64::atan2(LENGTH, -WIDTH), epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let mut kin = kinematics(0.0);
        for (f, s, r) in [(1.0, 0.0, 0.0), (0.5, -0.3, 1.2), (-2.0, 1.0, -3.0), (0.0, 0.0, 4.0)] {
            let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(f, s, r), 0.0);
            let back = kin.to_chassis_velocity(&states).speeds;
            assert_relative_eq!(back.forward, f, epsilon = 1e-9);
            assert_relative_eq!(back.sideways, s, epsilon = 1e-9);
            assert_relative_eq!(back.rotation, r, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_compensation_only_when_translating_and_rotating() {
        let mut kin = kinematics(0.04);

        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(0.0, 0.0, 1.0), 0.0);
        assert_relative_eq!(kin.to_chassis_velocity(&states).speeds.rotation, 1.0, epsilon = 1e-9);

        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(1.0, 0.0, 1.0), 0.0);
        assert_relative_eq!(kin.to_chassis_velocity(&states).speeds.rotation, 1.04, epsilon = 1e-9);

        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(1.0, 0.0, -1.0), 0.0);
        assert_relative_eq!(kin.to_chassis_velocity(&states).speeds.rotation, -1.04, epsilon = 1e-9);
    }

    #[test]
    fn test_stationary_holds_previous_angles() {
        let mut kin = kinematics(0.04);
        let moving = kin.to_module_states(&ChassisVelocityCommand::robot_relative(0.0, 0.0, 1.0), 0.0);
        let stopped = kin.to_module_states(&ChassisVelocityCommand::robot_relative(0.001, -0.001, 0.0), 0.0);
        for (held, prev) in stopped.iter().zip(moving.iter()) {
            assert_eq!(held.speed, 0.0);
            assert_eq!(held.angle, prev.angle);
        }
    }

    #[test]
    fn test_initial_stationary_angles_are_zero() {
        let mut kin = kinematics(0.04);
        let states = kin.to_module_states(&ChassisVelocityCommand::default(), 0.0);
        assert!(states.iter().all(|s| s.speed == 0.0 && s.angle == 0.0));
    }

    #[test]
    fn test_desaturation_preserves_direction() {
        let mut kin = kinematics(0.0);
        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(5.0, 0.0, 10.0), 0.0);
        let fastest = states.iter().map(|s| s.speed).fold(0.0, f64::max);
        assert_relative_eq!(fastest, MAX_SPEED, epsilon = 1e-9);

        // Chassis motion keeps the commanded forward/rotation ratio
        let back = kin.to_chassis_velocity(&states).speeds;
        assert_relative_eq!(back.rotation / back.forward, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_field_relative_rotates_by_heading() {
        let mut kin = kinematics(0.0);
        // Robot faces +Y on the field; field-forward is robot-right
        let states = kin.to_module_states(&ChassisVelocityCommand::field_relative(1.0, 0.0, 0.0), PI / 2.0);
        for s in states {
            assert_relative_eq!(s.angle, -PI / 2.0, epsilon = 1e-12);
            assert_relative_eq!(s.speed, 1.0, epsilon = 1e-12);
        }

        // Robot-relative ignores heading
        let states = kin.to_module_states(&ChassisVelocityCommand::robot_relative(1.0, 0.0, 0.0), PI / 2.0);
        assert_abs_diff_eq!(states[0].angle, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_heading_stays_robot_relative() {
        let mut kin = kinematics(0.04);
        let cmd = ChassisVelocityCommand::field_relative(1.0, 0.5, 2.0);
        let expected = kinematics(0.04).to_module_states(&ChassisVelocityCommand::robot_relative(1.0, 0.5, 2.0), 0.0);

        for heading in [f64::NAN, f64::INFINITY] {
            let states = kin.to_module_states(&cmd, heading);
            for (s, e) in states.iter().zip(expected.iter()) {
                assert!(s.speed.is_finite() && s.angle.is_finite());
                assert_relative_eq!(s.speed, e.speed, epsilon = 1e-12);
                assert_relative_eq!(s.angle, e.angle, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let mut m = mounts();
        m[2] = m[0];
        assert_eq!(
            SwerveKinematics::new(m, MAX_SPEED, MIN_SPEED, 0.0).err(),
            Some(GeometryError::Duplicate { a: 0, b: 2 })
        );

        let mut m = mounts();
        m[3] = ModuleMountPoint::new(0.0, 0.0);
        assert_eq!(validate_geometry(&m), Err(GeometryError::AtCenter { module: 3 }));

        let mut m = mounts();
        m[1].x = f64::NAN;
        assert_eq!(validate_geometry(&m), Err(GeometryError::NonFinite { module: 1 }));
    }
}
