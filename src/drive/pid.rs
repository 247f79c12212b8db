// PID controller with a velocity feedforward term

use serde::{Deserialize, Serialize};

/// Gains for one control loop.
///
/// `v` is the velocity feedforward: output contribution per unit of target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    #[serde(default)]
    pub v: f64,
}

impl PidGains {
    pub fn new(p: f64, i: f64, d: f64, v: f64) -> Self {
        Self { p, i, d, v }
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    integrated_error: f64,
    prev_error: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integrated_error: 0.0,
            prev_error: None,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Swap gains in place (live tuning). Accumulated state is kept.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    /// Feedback output for `error` over a step of `dt` seconds
    pub fn calculate(&mut self, error: f64, dt: f64) -> f64 {
        self.integrated_error += error * dt;

        // No derivative kick on the first sample
        let de_dt = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        self.gains.p * error + self.gains.i * self.integrated_error + self.gains.d * de_dt
    }

    /// Feedback output plus the `v * target` feedforward term
    pub fn calculate_with_feedforward(&mut self, target: f64, measured: f64, dt: f64) -> f64 {
        self.calculate(target - measured, dt) + self.gains.v * target
    }

    pub fn reset(&mut self) {
        self.integrated_error = 0.0;
        self.prev_error = None;
    }
}
