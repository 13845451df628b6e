//! Learning rate schedules and scheduler configuration.
//!
//! A [`SchedulerConfig`] pairs an opaque [`LrSchedule`] with the stepping
//! policy inputs: the interval it fires at, a frequency divisor, and an
//! optional monitored metric name.

use serde::{Deserialize, Serialize};

use crate::error::{ManeuverError, Result};
use crate::optim::Optimizer;

/// Granularity a schedule advances at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Advance on optimizer steps.
    Step,
    /// Advance on epoch boundaries.
    Epoch,
}

/// Schedule shape and its hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Constant learning rate.
    Constant,
    /// Decay by `gamma` every `step_size` advances.
    Step {
        /// Advances between decays.
        step_size: usize,
        /// Multiplicative decay factor.
        gamma: f64,
    },
    /// Decay by `gamma` at each milestone advance.
    MultiStep {
        /// Advance counts at which to decay.
        milestones: Vec<usize>,
        /// Multiplicative decay factor.
        gamma: f64,
    },
    /// Decay by `factor` when the monitored value stops improving.
    Plateau {
        /// Multiplicative decay factor.
        factor: f64,
        /// Non-improving advances tolerated before decaying.
        patience: usize,
        /// Lower bound on the learning rate.
        min_lr: f64,
    },
}

/// A learning rate schedule with its advance counter and plateau state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LrSchedule {
    kind: ScheduleKind,
    ticks: usize,
    best: Option<f64>,
    wait: usize,
}

impl LrSchedule {
    /// Create a schedule.
    pub fn new(kind: ScheduleKind) -> Self {
        Self {
            kind,
            ticks: 0,
            best: None,
            wait: 0,
        }
    }

    /// Number of times this schedule has advanced.
    #[must_use]
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Advance the schedule once, updating the optimizer's learning rate.
    ///
    /// Count-keyed schedules ignore `monitor`; the plateau schedule requires
    /// it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a plateau schedule is advanced
    /// without a monitored value.
    pub fn step(&mut self, optimizer: &mut Optimizer, monitor: Option<f64>) -> Result<()> {
        self.ticks += 1;
        match &self.kind {
            ScheduleKind::Constant => {}
            ScheduleKind::Step { step_size, gamma } => {
                if *step_size > 0 && self.ticks % step_size == 0 {
                    let lr = optimizer.learning_rate() * gamma;
                    optimizer.set_learning_rate(lr);
                }
            }
            ScheduleKind::MultiStep { milestones, gamma } => {
                if milestones.contains(&self.ticks) {
                    let lr = optimizer.learning_rate() * gamma;
                    optimizer.set_learning_rate(lr);
                }
            }
            ScheduleKind::Plateau {
                factor,
                patience,
                min_lr,
            } => {
                let value = monitor.ok_or_else(|| {
                    ManeuverError::Config(
                        "plateau schedule stepped without a monitored value".into(),
                    )
                })?;
                let improved = self.best.map_or(true, |best| value < best);
                if improved {
                    self.best = Some(value);
                    self.wait = 0;
                } else {
                    self.wait += 1;
                    if self.wait > *patience {
                        let lr = (optimizer.learning_rate() * factor).max(*min_lr);
                        optimizer.set_learning_rate(lr);
                        self.wait = 0;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Canonical scheduler configuration consumed by the stepping policy.
///
/// Immutable after normalization, except for state inside the schedule
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// The schedule to advance.
    pub schedule: LrSchedule,
    /// Which level this schedule fires at.
    pub interval: Interval,
    /// Fire only when the level's counter divides evenly by this.
    pub frequency: usize,
    /// Metric name to resolve and pass to the schedule, if any.
    pub monitor: Option<String>,
}

impl SchedulerConfig {
    /// Whether the policy should fire at `level` with counter
    /// `current_value`.
    #[must_use]
    pub fn fires_at(&self, level: Interval, current_value: usize) -> bool {
        self.interval == level && current_value % self.frequency == 0
    }
}

/// Partially specified scheduler configuration, as a model may declare it.
///
/// Missing fields are filled from the defaults
/// `{interval: epoch, frequency: 1, monitor: "val_loss"}` during
/// normalization.
#[derive(Debug, Clone)]
pub struct SchedulerSpec {
    /// The schedule to advance.
    pub schedule: LrSchedule,
    /// Fire interval; `None` means unspecified.
    pub interval: Option<Interval>,
    /// Fire frequency; `None` means unspecified.
    pub frequency: Option<usize>,
    /// Monitor key. Outer `None`: unspecified (default `val_loss`);
    /// `Some(None)`: explicitly unmonitored.
    pub monitor: Option<Option<String>>,
}

impl SchedulerSpec {
    /// Wrap a schedule with every policy field left to the defaults.
    pub fn new(schedule: LrSchedule) -> Self {
        Self {
            schedule,
            interval: None,
            frequency: None,
            monitor: None,
        }
    }

    /// Fill unspecified fields with the documented defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero frequency.
    pub fn into_config(self) -> Result<SchedulerConfig> {
        let frequency = self.frequency.unwrap_or(1);
        if frequency == 0 {
            return Err(ManeuverError::Config(
                "scheduler frequency must be positive".into(),
            ));
        }
        Ok(SchedulerConfig {
            schedule: self.schedule,
            interval: self.interval.unwrap_or(Interval::Epoch),
            frequency,
            monitor: self.monitor.unwrap_or_else(|| Some("val_loss".into())),
        })
    }
}
