//! Simulation clock: how real time becomes simulation steps.
//!
//! Both modes run the same step pipeline; they differ only in how many steps
//! one [`SimClock::advance`] produces.

use serde::{Deserialize, Serialize};

/// Clock strategy. Chosen in [`GameConfig`](crate::game::GameConfig).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Accumulate real time and run as many whole fixed steps as fit,
    /// carrying the remainder forward.
    #[default]
    Fixed,
    /// Run exactly one step of whatever size the caller supplies.
    Variable,
}

/// Step planning result of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPlan {
    /// Number of steps to run.
    pub steps: u64,
    /// Size of each step in seconds.
    pub step_seconds: f64,
    /// Whole steps dropped by the catch-up cap.
    pub dropped: u64,
}

impl StepPlan {
    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }
}

/// Clock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    mode: ClockMode,
    step_seconds: f64,
    accumulator: f64,
    /// Simulated seconds since start.
    elapsed: f64,
    /// Steps run since start.
    steps: u64,
}

impl SimClock {
    /// `step_seconds` is the fixed step size; non-positive values fall back
    /// to 0.1 s.
    pub fn new(mode: ClockMode, step_seconds: f64) -> Self {
        let step_seconds = if step_seconds.is_finite() && step_seconds > 0.0 {
            step_seconds
        } else {
            0.1
        };
        Self {
            mode,
            step_seconds,
            accumulator: 0.0,
            elapsed: 0.0,
            steps: 0,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Unspent real time in fixed mode.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Plan the steps for `dt` seconds of real time. `max_steps` caps fixed
    /// mode; excess whole steps are dropped.
    pub fn advance(&mut self, dt: f64, max_steps: u64) -> StepPlan {
        if !(dt.is_finite() && dt > 0.0) {
            return StepPlan {
                steps: 0,
                step_seconds: self.step_seconds,
                dropped: 0,
            };
        }
        match self.mode {
            ClockMode::Variable => {
                self.record(1, dt);
                StepPlan {
                    steps: 1,
                    step_seconds: dt,
                    dropped: 0,
                }
            }
            ClockMode::Fixed => {
                self.accumulator += dt;
                let whole = (self.accumulator / self.step_seconds).floor();
                let whole = if whole.is_finite() { whole as u64 } else { u64::MAX };
                self.accumulator -= whole as f64 * self.step_seconds;
                if self.accumulator < 0.0 {
                    self.accumulator = 0.0;
                }
                let steps = whole.min(max_steps.max(1));
                let dropped = whole - steps;
                if dropped > 0 {
                    log::warn!("clock dropped {dropped} steps over the catch-up cap");
                }
                self.record(steps, self.step_seconds);
                StepPlan {
                    steps,
                    step_seconds: self.step_seconds,
                    dropped,
                }
            }
        }
    }

    fn record(&mut self, steps: u64, step_seconds: f64) {
        self.steps += steps;
        self.elapsed += steps as f64 * step_seconds;
    }

    /// Account for one step run outside [`advance`](Self::advance), such as
    /// a manual step or an offline chunk.
    pub fn record_step(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.record(1, seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_mode_carries_remainder() {
        let mut clock = SimClock::new(ClockMode::Fixed, 0.1);
        let plan = clock.advance(0.25, 100);
        assert_eq!(plan.steps, 2);
        assert!((clock.accumulator() - 0.05).abs() < 1e-9);

        let plan = clock.advance(0.06, 100);
        assert_eq!(plan.steps, 1);
        assert_eq!(clock.steps(), 3);
    }

    #[test]
    fn fixed_mode_caps_steps() {
        let mut clock = SimClock::new(ClockMode::Fixed, 1.0);
        let plan = clock.advance(50.5, 10);
        assert_eq!(plan.steps, 10);
        assert_eq!(plan.dropped, 40);
        assert!((clock.accumulator() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn variable_mode_runs_one_step_of_dt() {
        let mut clock = SimClock::new(ClockMode::Variable, 0.1);
        let plan = clock.advance(3.7, 100);
        assert_eq!(plan.steps, 1);
        assert_eq!(plan.step_seconds, 3.7);
        assert_eq!(clock.elapsed(), 3.7);
    }

    #[test]
    fn non_positive_dt_runs_nothing() {
        let mut clock = SimClock::new(ClockMode::Fixed, 0.1);
        assert!(clock.advance(0.0, 10).is_empty());
        assert!(clock.advance(-1.0, 10).is_empty());
        assert!(clock.advance(f64::NAN, 10).is_empty());
        assert_eq!(clock.steps(), 0);
    }

    #[test]
    fn invalid_step_size_falls_back() {
        let clock = SimClock::new(ClockMode::Fixed, 0.0);
        assert_eq!(clock.step_seconds(), 0.1);
    }
}
