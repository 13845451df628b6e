//! Optimizer/scheduler normalization.
//!
//! A module's [`TrainingModule::configure_optimizers`] hook may declare its
//! optimization setup in several shapes. [`normalize`] reduces every accepted
//! shape to the canonical `(optimizer, scheduler-config)` pair the trainer
//! runs with.
//!
//! [`TrainingModule::configure_optimizers`]: crate::module::TrainingModule::configure_optimizers

use crate::error::{ManeuverError, Result};
use crate::optim::Optimizer;
use crate::scheduler::{LrSchedule, SchedulerConfig, SchedulerSpec};

/// The shapes a module may declare its optimization setup in.
pub enum OptimSetup {
    /// A bare optimizer.
    Optimizer(Optimizer),
    /// A bare schedule; policy fields take the defaults.
    Schedule(LrSchedule),
    /// A schedule with some policy fields specified.
    Config(SchedulerSpec),
    /// A sequence of the above, resolved by [`normalize`].
    Sequence(Vec<OptimSetup>),
}

fn is_optimizer(setup: &OptimSetup) -> bool {
    matches!(setup, OptimSetup::Optimizer(_))
}

fn is_scheduler_like(setup: &OptimSetup) -> bool {
    matches!(setup, OptimSetup::Schedule(_) | OptimSetup::Config(_))
}

/// Reduce a declared setup to the canonical
/// `(optimizer-or-none, scheduler-config-or-none)` pair.
///
/// Resolution precedence:
///
/// 1. a bare optimizer;
/// 2. a bare schedule, wrapped in the default config
///    `{interval: epoch, frequency: 1, monitor: "val_loss"}`;
/// 3. a partial config, missing fields filled from the same defaults;
/// 4. a sequence: a single optimizer, or a single scheduler-like element, or
///    exactly two elements combined (element 0 for the optimizer, element 1
///    for the scheduler). Anything else resolves to `(None, None)` and the
///    caller decides whether an optimizer was required.
///
/// # Errors
///
/// Returns a configuration error for a sequence of more than one optimizer,
/// or an invalid scheduler config.
pub fn normalize(setup: OptimSetup) -> Result<(Option<Optimizer>, Option<SchedulerConfig>)> {
    match setup {
        OptimSetup::Optimizer(optimizer) => Ok((Some(optimizer), None)),
        OptimSetup::Schedule(schedule) => {
            Ok((None, Some(SchedulerSpec::new(schedule).into_config()?)))
        }
        OptimSetup::Config(spec) => Ok((None, Some(spec.into_config()?))),
        OptimSetup::Sequence(mut items) => {
            if !items.is_empty() && items.iter().all(is_optimizer) {
                if items.len() == 1 {
                    return normalize(items.remove(0));
                }
                return Err(ManeuverError::Config(
                    "multiple optimizers unsupported".into(),
                ));
            }
            if !items.is_empty() && items.iter().all(is_scheduler_like) {
                if items.len() == 1 {
                    let (_, scheduler) = normalize(items.remove(0))?;
                    return Ok((None, scheduler));
                }
                return Ok((None, None));
            }
            if items.len() == 2 {
                let second = items.pop();
                let first = items.pop();
                let optimizer = match first.map(strip_sequence_unit) {
                    Some(item) => normalize(item)?.0,
                    None => None,
                };
                let scheduler = match second.map(strip_sequence_unit) {
                    Some(item) => normalize(item)?.1,
                    None => None,
                };
                return Ok((optimizer, scheduler));
            }
            Ok((None, None))
        }
    }
}

/// Unwrap single-element nested sequences so `([opt], [sched])` style
/// declarations resolve like their flat form. Multi-element sequences pass
/// through so `normalize` can reject or skip them itself.
fn strip_sequence_unit(setup: OptimSetup) -> OptimSetup {
    match setup {
        OptimSetup::Sequence(mut items) if items.len() == 1 => {
            strip_sequence_unit(items.remove(0))
        }
        other => other,
    }
}
