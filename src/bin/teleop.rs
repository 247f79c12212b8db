// Keyboard teleop: WASD move, Z/X rotate, R/F stick level, T turbo, M mode, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_drive_runtime::config::TOPIC_CMD_DRIVE;
use swerve_drive_runtime::messages::{DriveMode, DriveRequest};

const STICK_LEVELS: [f64; 3] = [0.25, 0.5, 1.0]; // fraction of full stick
const STICK_RELEASE: Duration = Duration::from_millis(100);
const PUBLISH_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
enum Axis {
    Forward,
    Sideways,
    Rotation,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    /// Deflect an axis fully in the given direction at the current stick level
    Stick(Axis, f64),
    LevelUp,
    LevelDown,
    ToggleTurbo,
    ToggleMode,
    Quit,
}

fn action_for(code: KeyCode) -> Option<Action> {
    let action = match code {
        KeyCode::Char('w') => Action::Stick(Axis::Forward, 1.0),
        KeyCode::Char('s') => Action::Stick(Axis::Forward, -1.0),
        KeyCode::Char('a') => Action::Stick(Axis::Sideways, 1.0),
        KeyCode::Char('d') => Action::Stick(Axis::Sideways, -1.0),
        // Counter-clockwise positive
        KeyCode::Char('z') => Action::Stick(Axis::Rotation, 1.0),
        KeyCode::Char('x') => Action::Stick(Axis::Rotation, -1.0),
        KeyCode::Char('r') => Action::LevelUp,
        KeyCode::Char('f') => Action::LevelDown,
        KeyCode::Char('t') => Action::ToggleTurbo,
        KeyCode::Char('m') => Action::ToggleMode,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        _ => return None,
    };
    Some(action)
}

/// Keyboard state folded into the request that goes on the wire
struct Teleop {
    request: DriveRequest,
    level: usize,
    last_stick: Instant,
}

impl Teleop {
    fn new() -> Self {
        Self {
            request: DriveRequest::default(),
            level: 0,
            last_stick: Instant::now(),
        }
    }

    /// Returns false once the operator asked to quit
    fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::Stick(axis, direction) => {
                let value = direction * STICK_LEVELS[self.level];
                match axis {
                    Axis::Forward => self.request.forward = value,
                    Axis::Sideways => self.request.sideways = value,
                    Axis::Rotation => self.request.rotation = value,
                }
                self.last_stick = Instant::now();
            }
            Action::LevelUp | Action::LevelDown => {
                self.level = match action {
                    Action::LevelUp => (self.level + 1).min(STICK_LEVELS.len() - 1),
                    _ => self.level.saturating_sub(1),
                };
                info!("Stick level: {:.0}%", STICK_LEVELS[self.level] * 100.0);
            }
            Action::ToggleTurbo => {
                self.request.turbo = !self.request.turbo;
                info!("Turbo: {}", if self.request.turbo { "ON" } else { "OFF" });
            }
            Action::ToggleMode => {
                self.request.mode = match self.request.mode {
                    DriveMode::Arcade => DriveMode::FieldRelative,
                    DriveMode::FieldRelative => DriveMode::Arcade,
                };
                info!("Mode: {:?}", self.request.mode);
            }
            Action::Quit => return false,
        }
        true
    }

    /// Centre the sticks when no movement key has been seen for a while
    fn release_idle_sticks(&mut self) {
        if self.last_stick.elapsed() > STICK_RELEASE {
            self.request.forward = 0.0;
            self.request.sideways = 0.0;
            self.request.rotation = 0.0;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    info!("Publishing drive requests on {}", TOPIC_CMD_DRIVE);
    info!("Controls: WASD=move, Z/X=rotate, R/F=stick level, T=turbo, M=mode, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::new();

    loop {
        // The poll timeout paces publishing so the runtime watchdog stays fed
        if event::poll(PUBLISH_PERIOD)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = matches!(kind, KeyEventKind::Press | KeyEventKind::Repeat);
                if let Some(action) = action_for(code).filter(|_| pressed) {
                    if !teleop.apply(action) {
                        break;
                    }
                }
            }
        }

        teleop.release_idle_sticks();
        publisher.put(serde_json::to_string(&teleop.request)?).await?;
    }

    Ok(())
}
