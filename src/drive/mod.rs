// Swerve drive control core
//
// Provides:
// - Unit conversions between physical and motor-controller native units
// - Per-module closed-loop control (steer PID, drive PID + feedforward)
// - 4-module swerve kinematics (chassis velocity <-> module states)
// - The drive coordinator that ties them together each control cycle

pub mod coordinator;
pub mod io;
pub mod kinematics;
pub mod module;
pub mod pid;
pub mod units;

pub use coordinator::{ChassisDrive, DriveCoordinator, HeadingSource, PoseDelta};
pub use io::{BusModuleIo, ModuleIo, ModuleIoError, MotorSetpoint, NativeFeedback};
pub use kinematics::{
    ChassisSpeeds, ChassisVelocityCommand, CoordinateMode, GeometryError, ModuleMountPoint, ModuleState,
    NUM_MODULES, SwerveKinematics,
};
pub use module::{ModuleStatus, SwerveModule};
pub use pid::{PidController, PidGains};
pub use units::{ModuleGearingProfile, UnitConversion};
