//! Callback hooks dispatched by the trainer.
//!
//! A callback implements whichever hooks it cares about; every hook has a
//! default empty body, so absent capabilities are no-ops by construction.
//! Hooks receive the engine state and may set the stop flag.

use crate::module::StepOutput;
use crate::trainer::EngineState;

/// The hook capabilities a callback may implement.
#[allow(unused_variables)]
pub trait Callback {
    /// Before the first training batch of an epoch.
    fn on_train_epoch_start(&mut self, state: &mut EngineState) {}
    /// After the last training batch of an epoch, including early
    /// termination.
    fn on_train_epoch_end(&mut self, state: &mut EngineState) {}
    /// Before each training batch.
    fn on_train_batch_start(&mut self, state: &mut EngineState, batch_idx: usize) {}
    /// After each training batch, with the detached step output.
    fn on_train_batch_end(&mut self, state: &mut EngineState, output: &StepOutput, batch_idx: usize) {
    }
    /// Before the backward pass.
    fn on_before_backward(&mut self, state: &mut EngineState) {}
    /// After the backward pass.
    fn on_after_backward(&mut self, state: &mut EngineState) {}
    /// Before accumulated gradients are cleared.
    fn on_before_zero_grad(&mut self, state: &mut EngineState) {}
    /// Before the optimizer applies an update.
    fn on_before_optimizer_step(&mut self, state: &mut EngineState) {}
    /// Before the model switches to evaluation mode.
    fn on_validation_model_eval(&mut self, state: &mut EngineState) {}
    /// After the model switches back to training mode.
    fn on_validation_model_train(&mut self, state: &mut EngineState) {}
    /// Before the first validation batch.
    fn on_validation_epoch_start(&mut self, state: &mut EngineState) {}
    /// After the last validation batch, including early exit.
    fn on_validation_epoch_end(&mut self, state: &mut EngineState) {}
    /// Before each validation batch.
    fn on_validation_batch_start(&mut self, state: &mut EngineState, batch_idx: usize) {}
    /// After each validation batch, with the detached step output.
    fn on_validation_batch_end(
        &mut self,
        state: &mut EngineState,
        output: &StepOutput,
        batch_idx: usize,
    ) {
    }
}

/// Stop training when a monitored validation metric stops improving.
///
/// Watches `monitor` in each validation batch output and, at validation
/// epoch end, sets the stop flag once the metric has failed to improve for
/// `patience` consecutive validation epochs.
pub struct EarlyStopping {
    monitor: String,
    patience: usize,
    best: Option<f64>,
    wait: usize,
    last_seen: Option<f64>,
}

impl EarlyStopping {
    /// Create an early-stopping callback for a key in the validation
    /// output, e.g. `loss` for the conventional `val_loss` monitor.
    pub fn new(monitor: impl Into<String>, patience: usize) -> Self {
        Self {
            monitor: monitor.into(),
            patience,
            best: None,
            wait: 0,
            last_seen: None,
        }
    }
}

impl Callback for EarlyStopping {
    fn on_validation_batch_end(
        &mut self,
        _state: &mut EngineState,
        output: &StepOutput,
        _batch_idx: usize,
    ) {
        let value = match output {
            StepOutput::Loss(t) if self.monitor == "loss" => crate::module::scalar_value(t).ok(),
            StepOutput::Metrics(map) => map
                .get(&self.monitor)
                .and_then(|t| crate::module::scalar_value(t).ok()),
            StepOutput::Loss(_) => None,
        };
        if value.is_some() {
            self.last_seen = value;
        }
    }

    fn on_validation_epoch_end(&mut self, state: &mut EngineState) {
        let Some(value) = self.last_seen.take() else {
            return;
        };
        let improved = self.best.map_or(true, |best| value < best);
        if improved {
            self.best = Some(value);
            self.wait = 0;
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                tracing::info!(
                    monitor = %self.monitor,
                    best = self.best.unwrap_or(f64::NAN),
                    "Early stopping: no improvement for {} validation epochs",
                    self.wait
                );
                state.should_stop = true;
            }
        }
    }
}
