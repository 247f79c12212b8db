// 50 Hz drive loop with watchdog
// If teleop stops sending requests the drive is stopped rather than left running
// on the last command.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, ConfigError, DriveConfig, FEEDBACK_TIMEOUT, LOOP_HZ, OperatorConfig, TOPIC_ACTUAL_STATES,
    TOPIC_CMD_DRIVE, TOPIC_EXPECTED_STATES, TOPIC_FEEDBACK, TOPIC_HEADING, TOPIC_HEALTH, TOPIC_RT_SETPOINTS,
};
use crate::drive::{BusModuleIo, DriveCoordinator, HeadingSource, NUM_MODULES};
use crate::input::{ArcadeDrive, DriveCommand, FieldRelativeDrive, LatchedAxis, TunableStore};
use crate::messages::{
    DriveMode, DriveRequest, HeadingSample, ModuleFeedback, ModuleSetpointMsg, ModuleStatesMsg, RuntimeHealth,
};

/// Heading pushed in from the latest gyro sample
#[derive(Debug, Clone, Default)]
pub struct LatchedHeading(Rc<Cell<f64>>);

impl LatchedHeading {
    pub fn set(&self, heading: f64) {
        self.0.set(heading);
    }
}

impl HeadingSource for LatchedHeading {
    fn heading(&self) -> f64 {
        self.0.get()
    }
}

/// Axis values the teleop commands read, refreshed from each request
#[derive(Debug, Clone, Default)]
struct TeleopAxes {
    forward: LatchedAxis,
    sideways: LatchedAxis,
    rotation: LatchedAxis,
    speed: LatchedAxis,
}

pub struct Runtime {
    latest_request: Option<DriveRequest>,
    request_received_at: Instant,
    health: RuntimeHealth,
    drive: DriveCoordinator<BusModuleIo, LatchedHeading>,
    heading: LatchedHeading,
    axes: TeleopAxes,
    arcade: ArcadeDrive,
    field_relative: FieldRelativeDrive,
    operator: OperatorConfig,
    period: f64,
    loopback: bool,
}

impl Runtime {
    /// Build the drive from `config`; `loopback` echoes setpoints back as feedback
    pub fn new(config: &DriveConfig, loopback: bool) -> Result<Self, ConfigError> {
        let ios = std::array::from_fn(|i| {
            if loopback {
                BusModuleIo::loopback(i)
            } else {
                BusModuleIo::new(i, FEEDBACK_TIMEOUT)
            }
        });
        let heading = LatchedHeading::default();
        let drive = DriveCoordinator::new(config, ios, heading.clone())?;

        let axes = TeleopAxes::default();
        axes.speed.set(config.operator.normal_speed_multiplier);
        let tunables = TunableStore::new();
        let arcade = ArcadeDrive::new(
            axes.forward.clone(),
            axes.rotation.clone(),
            axes.speed.clone(),
            tunables.clone(),
            &config.operator,
        );
        let field_relative = FieldRelativeDrive::new(
            axes.forward.clone(),
            axes.sideways.clone(),
            axes.rotation.clone(),
            axes.speed.clone(),
            tunables,
            &config.operator,
        );

        Ok(Self {
            latest_request: None,
            request_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first request
            drive,
            heading,
            axes,
            arcade,
            field_relative,
            operator: config.operator,
            period: config.control_period,
            loopback,
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drive(&self) -> &DriveCoordinator<BusModuleIo, LatchedHeading> {
        &self.drive
    }

    /// Process incoming request
    fn on_request(&mut self, request: DriveRequest) {
        debug!("Received request: {:?}", &request);
        self.latest_request = Some(request);
        self.request_received_at = Instant::now();
    }

    fn on_feedback(&mut self, feedback: ModuleFeedback) {
        if feedback.module >= NUM_MODULES {
            warn!("Feedback for unknown module {}", feedback.module);
            return;
        }
        self.drive.module_mut(feedback.module).io_mut().ingest((&feedback).into());
    }

    fn on_heading(&mut self, sample: HeadingSample) {
        self.heading.set(sample.heading);
    }

    /// Run one control cycle (includes watchdog logic)
    fn step(&mut self) {
        let request_age = self.request_received_at.elapsed();

        match self.latest_request {
            Some(request) if request_age <= CMD_TIMEOUT => {
                self.axes.forward.set(request.forward);
                self.axes.sideways.set(request.sideways);
                self.axes.rotation.set(request.rotation);
                self.axes.speed.set(if request.turbo {
                    self.operator.turbo_speed_multiplier
                } else {
                    self.operator.normal_speed_multiplier
                });

                let command: &mut dyn DriveCommand = match request.mode {
                    DriveMode::Arcade => &mut self.arcade,
                    DriveMode::FieldRelative => &mut self.field_relative,
                };
                command.execute(&mut self.drive, self.period);

                let health = if self.drive.any_degraded() {
                    RuntimeHealth::Degraded {
                        modules: self.drive.degraded_modules(),
                    }
                } else {
                    RuntimeHealth::Ok
                };
                if health != self.health {
                    info!("Health {:?} -> {:?} ({})", self.health, health, command.name());
                }
                self.health = health;
            }
            _ => {
                // Watchdog triggered (or no request yet) - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Drive request stale ({:?} old), stopping robot", request_age);
                }
                self.health = RuntimeHealth::CmdStale;
                self.drive.sample();
                self.drive.stop();
            }
        }
    }

    fn setpoints(&self) -> Vec<ModuleSetpointMsg> {
        self.drive
            .modules()
            .iter()
            .map(|module| {
                let (steer, drive) = module.io().outbox();
                ModuleSetpointMsg {
                    module: module.index(),
                    drive_motor_id: module.drive_motor_id(),
                    steer_motor_id: module.steer_motor_id(),
                    steer,
                    drive,
                }
            })
            .collect()
    }
}

pub async fn run(config: DriveConfig, loopback: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(&config, loopback)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_request = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_feedback = session.declare_subscriber(TOPIC_FEEDBACK).await?;
    let sub_heading = session.declare_subscriber(TOPIC_HEADING).await?;
    let pub_setpoints = session.declare_publisher(TOPIC_RT_SETPOINTS).await?;
    let pub_actual = session.declare_publisher(TOPIC_ACTUAL_STATES).await?;
    let pub_expected = session.declare_publisher(TOPIC_EXPECTED_STATES).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout{}",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        if runtime.loopback { ", loopback (no hardware)" } else { "" }
    );
    info!("Subscribed to: {}, {}, {}", TOPIC_CMD_DRIVE, TOPIC_FEEDBACK, TOPIC_HEADING);
    info!(
        "Publishing to: {}, {}, {}, {}",
        TOPIC_RT_SETPOINTS, TOPIC_ACTUAL_STATES, TOPIC_EXPECTED_STATES, TOPIC_HEALTH
    );

    loop {
        tick.tick().await;

        // 1. Drain all pending messages (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_request.try_recv() {
            match serde_json::from_slice::<DriveRequest>(&sample.payload().to_bytes()) {
                Ok(request) => runtime.on_request(request),
                Err(e) => warn!("Failed to parse drive request: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_feedback.try_recv() {
            match serde_json::from_slice::<ModuleFeedback>(&sample.payload().to_bytes()) {
                Ok(feedback) => runtime.on_feedback(feedback),
                Err(e) => warn!("Failed to parse module feedback: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_heading.try_recv() {
            match serde_json::from_slice::<HeadingSample>(&sample.payload().to_bytes()) {
                Ok(heading) => runtime.on_heading(heading),
                Err(e) => warn!("Failed to parse heading: {}", e),
            }
        }

        // 2. Run the drive (includes watchdog logic)
        runtime.step();

        // 3. Publish setpoints for the hardware bridge
        if !runtime.loopback {
            pub_setpoints.put(serde_json::to_string(&runtime.setpoints())?).await?;
        }

        // 4. Publish telemetry and health
        let actual = ModuleStatesMsg {
            states: runtime.drive.module_states(),
        };
        pub_actual.put(serde_json::to_string(&actual)?).await?;
        let expected = ModuleStatesMsg {
            states: runtime.drive.expected_states(),
        };
        pub_expected.put(serde_json::to_string(&expected)?).await?;
        pub_health.put(serde_json::to_string(&runtime.health)?).await?;
    }
}
