//! The training orchestration engine.
//!
//! [`Trainer`] owns the engine state (epoch counter, global step, stop flag)
//! and sequences the loop drivers, the scheduler stepping policy, and
//! checkpoint persistence into a resumable fit loop. The loop is synchronous
//! and single-threaded per process; any parallelism lives behind the
//! [`Strategy`] seam.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::callbacks::Callback;
use crate::checkpoint::{
    checkpoint_file_name, latest_checkpoint, load_model_state, model_state, CheckpointRecord,
};
use crate::config::TrainerSettings;
use crate::data::{Batch, DataLoader};
use crate::error::{ManeuverError, Result};
use crate::module::{scalar_value, StepOutput, TrainingModule};
use crate::optim::{Optimizer, OptimizerState};
use crate::scheduler::{Interval, SchedulerConfig};
use crate::setup;
use crate::strategy::Strategy;

/// Engine counters and the stop flag.
///
/// Owned exclusively by the [`Trainer`]; the loop drivers read it and the
/// trainer writes it at well-defined points. Callbacks may set
/// `should_stop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineState {
    /// Completed epochs.
    pub current_epoch: usize,
    /// Completed optimizer steps since training began.
    pub global_step: usize,
    /// Request to end training at the next batch/epoch boundary.
    pub should_stop: bool,
}

/// Training orchestrator.
///
/// # Example
///
/// ```no_run
/// use maneuver_rs::config::ManeuverConfig;
/// use maneuver_rs::strategy::SingleDevice;
/// use maneuver_rs::trainer::Trainer;
///
/// # fn main() -> maneuver_rs::Result<()> {
/// let config = ManeuverConfig::from_preset("resnet-small")?;
/// let strategy = Box::new(SingleDevice::new()?);
/// let mut trainer = Trainer::new(strategy, &config.trainer);
/// # Ok(())
/// # }
/// ```
pub struct Trainer {
    strategy: Box<dyn Strategy>,
    callbacks: Vec<Box<dyn Callback>>,
    state: EngineState,
    grad_accum_steps: usize,
    max_epochs: Option<usize>,
    max_steps: Option<usize>,
    validation_frequency: usize,
    checkpoint_frequency: usize,
    checkpoint_dir: PathBuf,
    limit_train_batches: Option<usize>,
    limit_val_batches: Option<usize>,
    current_train_return: Option<StepOutput>,
    current_val_return: Option<StepOutput>,
    warned_no_validation_step: bool,
}

impl Trainer {
    /// Create a trainer over an execution strategy with the given engine
    /// settings.
    pub fn new(strategy: Box<dyn Strategy>, settings: &TrainerSettings) -> Self {
        Self {
            strategy,
            callbacks: Vec::new(),
            state: EngineState::default(),
            grad_accum_steps: settings.grad_accum_steps.max(1),
            max_epochs: settings.max_epochs,
            max_steps: settings.max_steps,
            validation_frequency: settings.validation_frequency.max(1),
            checkpoint_frequency: settings.checkpoint_frequency.max(1),
            checkpoint_dir: PathBuf::from(&settings.checkpoint_dir),
            limit_train_batches: settings.limit_train_batches,
            limit_val_batches: settings.limit_val_batches,
            current_train_return: None,
            current_val_return: None,
            warned_no_validation_step: false,
        }
    }

    /// Register a callback; hooks fire in registration order.
    #[must_use]
    pub fn with_callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Engine counters and stop flag.
    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Device the strategy places tensors on.
    #[must_use]
    pub fn device(&self) -> &candle_core::Device {
        self.strategy.device()
    }

    /// Run training to completion.
    ///
    /// Resumes from the latest checkpoint in the checkpoint directory when
    /// `resume` is set; an absent or empty directory is a cold start. The
    /// stop flag is reset on return so the trainer is reusable for a
    /// subsequent fit call.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unsupported strategy, a missing
    /// optimizer, or an unknown monitor key; a checkpoint error for a
    /// mismatched checkpoint; or any error from the model's steps.
    pub fn fit<M: TrainingModule>(
        &mut self,
        module: &mut M,
        train_loader: DataLoader,
        val_loader: Option<DataLoader>,
        resume: bool,
    ) -> Result<()> {
        self.strategy.launch()?;

        // The engine assumes single-process ownership of the optimizer and
        // parameters; resharding strategies break that invariant.
        if self.strategy.shards_parameters() {
            return Err(ManeuverError::Config(
                "unsupported configuration: strategy reshards parameters outside the engine's \
                 control"
                    .into(),
            ));
        }

        let train_loader = self.strategy.setup_dataloader(train_loader)?;
        let val_loader = match val_loader {
            Some(loader) => Some(self.strategy.setup_dataloader(loader)?),
            None => None,
        };

        let (optimizer, scheduler_cfg) = setup::normalize(module.configure_optimizers()?)?;
        let Some(mut optimizer) = optimizer else {
            return Err(ManeuverError::Config(
                "configure_optimizers produced no optimizer".into(),
            ));
        };
        let mut scheduler_cfg = scheduler_cfg;
        self.strategy.setup(module.varmap())?;

        if resume {
            if let Some(path) = latest_checkpoint(&self.checkpoint_dir) {
                self.load(&path, module, &mut optimizer, &mut scheduler_cfg)?;
                tracing::info!(
                    epoch = self.state.current_epoch,
                    step = self.state.global_step,
                    "Resumed from {}",
                    path.display()
                );
                if let Some(max_epochs) = self.max_epochs {
                    if self.state.current_epoch >= max_epochs {
                        self.state.should_stop = true;
                    }
                }
            }
        }

        while !self.state.should_stop {
            self.train_loop(module, &mut optimizer, &train_loader, &mut scheduler_cfg)?;

            if self.should_validate() {
                if let Some(loader) = &val_loader {
                    self.val_loop(module, loader)?;
                }
            }

            let epoch = self.state.current_epoch;
            self.step_scheduler(
                module,
                &mut optimizer,
                &mut scheduler_cfg,
                Interval::Epoch,
                epoch,
            )?;

            self.state.current_epoch += 1;

            if let Some(max_epochs) = self.max_epochs {
                if self.state.current_epoch >= max_epochs {
                    self.state.should_stop = true;
                }
            }

            if self.state.current_epoch % self.checkpoint_frequency == 0 || self.state.should_stop
            {
                self.save(module, &optimizer, scheduler_cfg.as_ref())?;
            }
        }

        // reset for the next fit call
        self.state.should_stop = false;
        Ok(())
    }

    /// One training epoch: batch iteration, gradient accumulation, optimizer
    /// stepping, hook dispatch, stop-condition evaluation.
    fn train_loop<M: TrainingModule>(
        &mut self,
        module: &mut M,
        optimizer: &mut Optimizer,
        loader: &DataLoader,
        scheduler_cfg: &mut Option<SchedulerConfig>,
    ) -> Result<()> {
        self.call(|cb, state| cb.on_train_epoch_start(state));

        let limit = self.limit_train_batches.unwrap_or(usize::MAX);
        let progress = self.progress_bar(
            loader.len().min(limit),
            &format!("Epoch {}", self.state.current_epoch),
        )?;

        for (batch_idx, batch) in loader.iter().enumerate() {
            self.call(|cb, state| cb.on_train_batch_start(state, batch_idx));

            // a batch is a stepping batch when it completes an accumulation
            // group; each epoch over N batches steps exactly floor(N/A) times
            let should_step = (batch_idx + 1) % self.grad_accum_steps == 0;

            if should_step {
                self.call(|cb, state| cb.on_before_optimizer_step(state));
            }

            let output = self.training_step(module, optimizer, batch, batch_idx)?;

            if should_step {
                optimizer.apply_and_reset()?;
                self.call(|cb, state| cb.on_before_zero_grad(state));
                optimizer.zero_grad();
            }

            self.call(|cb, state| cb.on_train_batch_end(state, &output, batch_idx));

            // only step the step-level schedule once per global step
            if should_step {
                let step = self.state.global_step;
                self.step_scheduler(module, optimizer, scheduler_cfg, Interval::Step, step)?;
            }

            progress.set_message(format_output(&output));
            progress.inc(1);

            if should_step {
                self.state.global_step += 1;
            }

            let limit_reached = batch_idx + 1 >= limit;
            let max_steps_reached = self
                .max_steps
                .map_or(false, |max| self.state.global_step >= max);
            if self.state.should_stop || limit_reached || max_steps_reached {
                self.state.should_stop = true;
                break;
            }
        }

        // a trailing partial accumulation group never crosses epochs
        optimizer.zero_grad();

        progress.finish_and_clear();
        self.call(|cb, state| cb.on_train_epoch_end(state));
        Ok(())
    }

    /// Forward pass, loss extraction, backward pass, and gradient
    /// accumulation for one batch. The optimizer apply is driven separately
    /// by the loop.
    fn training_step<M: TrainingModule>(
        &mut self,
        module: &mut M,
        optimizer: &mut Optimizer,
        batch: &Batch,
        batch_idx: usize,
    ) -> Result<StepOutput> {
        let output = module.training_step(batch, batch_idx)?;
        let loss = output.loss()?;

        self.call(|cb, state| cb.on_before_backward(state));
        let grads = self.strategy.backward(&loss)?;
        self.call(|cb, state| cb.on_after_backward(state));

        optimizer.accumulate(&grads)?;

        // detach stored values so no computation graph outlives the batch
        let detached = output.detached();
        self.current_train_return = Some(detached.clone());
        Ok(detached)
    }

    /// One evaluation pass with learning disabled.
    ///
    /// Skipped with a warning when the module lacks the validation-step
    /// capability. The eval/train mode bracket is restored on every exit
    /// path, including errors and early exits.
    fn val_loop<M: TrainingModule>(&mut self, module: &mut M, loader: &DataLoader) -> Result<()> {
        if !module.has_validation_step() {
            if !self.warned_no_validation_step {
                tracing::warn!(
                    "module does not implement validation_step but a validation loader was \
                     passed; skipping validation"
                );
                self.warned_no_validation_step = true;
            }
            return Ok(());
        }

        self.call(|cb, state| cb.on_validation_model_eval(state));
        module.set_training(false);

        let result = self.run_validation(module, loader);

        self.call(|cb, state| cb.on_validation_model_train(state));
        module.set_training(true);

        result
    }

    fn run_validation<M: TrainingModule>(
        &mut self,
        module: &mut M,
        loader: &DataLoader,
    ) -> Result<()> {
        self.call(|cb, state| cb.on_validation_epoch_start(state));

        let limit = self.limit_val_batches.unwrap_or(usize::MAX);
        let progress = self.progress_bar(loader.len().min(limit), "Validation")?;

        for (batch_idx, batch) in loader.iter().enumerate() {
            // early exit still fires the epoch-end hook below
            if self.state.should_stop || batch_idx >= limit {
                break;
            }

            self.call(|cb, state| cb.on_validation_batch_start(state, batch_idx));

            let output = module.validation_step(batch, batch_idx)?.detached();

            self.call(|cb, state| cb.on_validation_batch_end(state, &output, batch_idx));

            progress.set_message(format_output(&output));
            progress.inc(1);

            self.current_val_return = Some(output);
        }

        progress.finish_and_clear();
        self.call(|cb, state| cb.on_validation_epoch_end(state));
        Ok(())
    }

    /// The scheduler stepping policy.
    ///
    /// No-ops unless a schedule is configured, its interval matches `level`,
    /// and `current_value` divides evenly by its frequency. Otherwise
    /// resolves the monitor and advances the schedule exactly once.
    fn step_scheduler<M: TrainingModule>(
        &mut self,
        module: &mut M,
        optimizer: &mut Optimizer,
        scheduler_cfg: &mut Option<SchedulerConfig>,
        level: Interval,
        current_value: usize,
    ) -> Result<()> {
        let Some(cfg) = scheduler_cfg.as_mut() else {
            return Ok(());
        };
        if !cfg.fires_at(level, current_value) {
            return Ok(());
        }
        let monitor = self.resolve_monitor(cfg.monitor.as_deref())?;
        module.lr_scheduler_step(&mut cfg.schedule, optimizer, monitor)
    }

    /// Resolve a monitor name against the most recent train/validation
    /// outputs.
    ///
    /// Candidates are `train_`-prefixed entries from the last training
    /// output merged with `val_`-prefixed entries from the last validation
    /// output; a bare scalar output contributes `{prefix}_loss`. An absent
    /// monitor name resolves to no value.
    fn resolve_monitor(&self, monitor: Option<&str>) -> Result<Option<f64>> {
        let Some(key) = monitor else {
            return Ok(None);
        };
        let mut candidates: Vec<(String, f64)> = Vec::new();
        if let Some(output) = &self.current_train_return {
            output.monitor_candidates("train", &mut candidates)?;
        }
        if let Some(output) = &self.current_val_return {
            output.monitor_candidates("val", &mut candidates)?;
        }
        if let Some((_, value)) = candidates.iter().find(|(name, _)| name == key) {
            return Ok(Some(*value));
        }
        let mut valid: Vec<&str> = candidates.iter().map(|(name, _)| name.as_str()).collect();
        valid.sort_unstable();
        Err(ManeuverError::Config(format!(
            "monitor \"{key}\" is invalid; possible values: {valid:?}"
        )))
    }

    /// Whether to run validation after the current epoch.
    fn should_validate(&self) -> bool {
        self.state.current_epoch % self.validation_frequency == 0
    }

    /// Write a checkpoint for the just-finished epoch.
    ///
    /// Only rank zero writes; a barrier brackets the I/O so no rank races
    /// ahead with a half-written checkpoint on disk.
    fn save<M: TrainingModule>(
        &mut self,
        module: &M,
        optimizer: &Optimizer,
        scheduler_cfg: Option<&SchedulerConfig>,
    ) -> Result<()> {
        let mut record = CheckpointRecord::new();
        record.insert("model", model_state(module.varmap())?);
        record.insert("optim", serde_json::to_value(optimizer.state())?);
        record.insert(
            "scheduler",
            match scheduler_cfg {
                Some(cfg) => serde_json::to_value(cfg)?,
                None => Value::Null,
            },
        );
        record.insert("global_step", Value::from(self.state.global_step as u64));
        record.insert("current_epoch", Value::from(self.state.current_epoch as u64));

        let path = self
            .checkpoint_dir
            .join(checkpoint_file_name(self.state.current_epoch));
        if self.strategy.is_global_zero() {
            self.strategy.save(&path, &record)?;
            tracing::info!("Saved checkpoint to {}", path.display());
        }
        self.strategy.barrier()?;
        Ok(())
    }

    /// Restore engine state from a checkpoint file.
    ///
    /// Every component and both counters must be consumed; leftover entries
    /// mean the checkpoint does not match the expected state shape and are a
    /// fatal integrity error.
    fn load<M: TrainingModule>(
        &mut self,
        path: &Path,
        module: &mut M,
        optimizer: &mut Optimizer,
        scheduler_cfg: &mut Option<SchedulerConfig>,
    ) -> Result<()> {
        let mut record = self.strategy.load(path)?;

        let model_value = record
            .take("model")
            .ok_or_else(|| ManeuverError::Checkpoint("checkpoint is missing \"model\"".into()))?;
        load_model_state(module.varmap(), model_value, self.strategy.device())?;

        let optim_value = record
            .take("optim")
            .ok_or_else(|| ManeuverError::Checkpoint("checkpoint is missing \"optim\"".into()))?;
        let optim_state: OptimizerState = serde_json::from_value(optim_value)?;
        optimizer.load_state(&optim_state);

        match (record.take("scheduler"), scheduler_cfg.as_mut()) {
            (Some(Value::Null), _) => {}
            (Some(value), Some(cfg)) => *cfg = serde_json::from_value(value)?,
            (Some(_), None) => {
                return Err(ManeuverError::Checkpoint(
                    "checkpoint contains a scheduler but none is configured".into(),
                ))
            }
            (None, _) => {
                return Err(ManeuverError::Checkpoint(
                    "checkpoint is missing \"scheduler\"".into(),
                ))
            }
        }

        self.state.global_step = record.take_counter("global_step")?;
        self.state.current_epoch = record.take_counter("current_epoch")?;

        if !record.is_empty() {
            return Err(ManeuverError::Checkpoint(format!(
                "unused checkpoint values: {:?}",
                record.remaining()
            )));
        }
        Ok(())
    }

    /// Dispatch a hook to every registered callback, in order.
    fn call(&mut self, mut hook: impl FnMut(&mut dyn Callback, &mut EngineState)) {
        for callback in &mut self.callbacks {
            hook(callback.as_mut(), &mut self.state);
        }
    }

    /// Progress bar on rank zero, hidden elsewhere.
    fn progress_bar(&self, total: usize, prefix: &str) -> Result<ProgressBar> {
        if !self.strategy.is_global_zero() {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{wide_bar:.cyan/blue}] {pos:>4}/{len:4} {msg}")?
                .progress_chars("#>-"),
        );
        bar.set_prefix(prefix.to_string());
        Ok(bar)
    }
}

/// Render an output as a progress-bar postfix string.
fn format_output(output: &StepOutput) -> String {
    match output {
        StepOutput::Loss(t) => match scalar_value(t) {
            Ok(v) => format!("loss: {v:.3}"),
            Err(_) => String::new(),
        },
        StepOutput::Metrics(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            keys.iter()
                .filter_map(|key| {
                    scalar_value(&map[*key])
                        .ok()
                        .map(|v| format!("{key}: {v:.3}"))
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainerSettings;
    use crate::optim::OptimizerConfig;
    use crate::setup::OptimSetup;
    use crate::strategy::SingleDevice;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarMap;
    use std::collections::HashMap;

    struct ToyModule {
        varmap: VarMap,
        with_validation: bool,
        val_loss: f32,
    }

    impl ToyModule {
        fn new(with_validation: bool) -> Self {
            let varmap = VarMap::new();
            varmap
                .get(2, "w", candle_nn::Init::Const(1.0), DType::F32, &Device::Cpu)
                .unwrap();
            Self {
                varmap,
                with_validation,
                val_loss: 0.25,
            }
        }
    }

    impl TrainingModule for ToyModule {
        fn training_step(&mut self, _batch: &Batch, _batch_idx: usize) -> Result<StepOutput> {
            let loss = self.varmap.all_vars()[0].as_tensor().sum_all()?;
            let mut map = HashMap::new();
            map.insert("loss".to_string(), loss);
            Ok(StepOutput::Metrics(map))
        }

        fn has_validation_step(&self) -> bool {
            self.with_validation
        }

        fn validation_step(&mut self, _batch: &Batch, _batch_idx: usize) -> Result<StepOutput> {
            let mut map = HashMap::new();
            map.insert(
                "loss".to_string(),
                Tensor::new(self.val_loss, &Device::Cpu)?,
            );
            Ok(StepOutput::Metrics(map))
        }

        fn configure_optimizers(&self) -> Result<OptimSetup> {
            let config = OptimizerConfig {
                learning_rate: 0.01,
                ..OptimizerConfig::default()
            };
            Ok(OptimSetup::Optimizer(config.build_sgd(&self.varmap)))
        }

        fn varmap(&self) -> &VarMap {
            &self.varmap
        }
    }

    fn toy_loader(batches: usize) -> DataLoader {
        let items = (0..batches)
            .map(|_| Batch {
                features: Tensor::zeros((1, 1), DType::F32, &Device::Cpu).unwrap(),
                labels: Tensor::zeros(1, DType::U32, &Device::Cpu).unwrap(),
            })
            .collect();
        DataLoader::new(items)
    }

    fn settings(dir: &std::path::Path, max_epochs: usize) -> TrainerSettings {
        TrainerSettings {
            max_epochs: Some(max_epochs),
            checkpoint_dir: dir.to_string_lossy().into_owned(),
            ..TrainerSettings::default()
        }
    }

    fn trainer(settings: &TrainerSettings) -> Trainer {
        Trainer::new(Box::new(SingleDevice::with_device(Device::Cpu)), settings)
    }

    #[test]
    fn test_counters_start_at_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        let trainer = trainer(&settings(dir.path(), 1));
        assert_eq!(trainer.state().current_epoch, 0);
        assert_eq!(trainer.state().global_step, 0);
        assert!(!trainer.state().should_stop);
    }

    #[test]
    fn test_single_epoch_counts_steps() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut t = trainer(&settings(dir.path(), 1));
        let mut module = ToyModule::new(false);
        t.fit(&mut module, toy_loader(4), None, false).unwrap();
        assert_eq!(t.state().current_epoch, 1);
        assert_eq!(t.state().global_step, 4);
        assert!(!t.state().should_stop);
    }

    #[test]
    fn test_accumulation_steps_floor_n_over_a() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut s = settings(dir.path(), 1);
        s.grad_accum_steps = 2;
        let mut t = trainer(&s);
        let mut module = ToyModule::new(false);
        t.fit(&mut module, toy_loader(5), None, false).unwrap();
        // floor(5 / 2) optimizer steps
        assert_eq!(t.state().global_step, 2);
    }

    #[test]
    fn test_max_steps_stops_training() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut s = settings(dir.path(), 100);
        s.max_steps = Some(6);
        let mut t = trainer(&s);
        let mut module = ToyModule::new(false);
        t.fit(&mut module, toy_loader(4), None, false).unwrap();
        assert_eq!(t.state().global_step, 6);
        // stop flag is reset so the trainer stays reusable
        assert!(!t.state().should_stop);
    }

    #[test]
    fn test_validation_skipped_without_capability() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut t = trainer(&settings(dir.path(), 1));
        let mut module = ToyModule::new(false);
        // passing a val loader without the capability is advisory, not fatal
        t.fit(&mut module, toy_loader(2), Some(toy_loader(2)), false)
            .unwrap();
        assert!(t.current_val_return.is_none());
    }

    #[test]
    fn test_validation_retains_last_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut t = trainer(&settings(dir.path(), 1));
        let mut module = ToyModule::new(true);
        t.fit(&mut module, toy_loader(2), Some(toy_loader(3)), false)
            .unwrap();
        let output = t.current_val_return.as_ref().unwrap();
        let value = scalar_value(&output.loss().unwrap()).unwrap();
        assert!((value - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_monitor_resolution_from_train_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut t = trainer(&settings(dir.path(), 1));
        let mut map = HashMap::new();
        map.insert(
            "loss".to_string(),
            Tensor::new(0.5f32, &Device::Cpu).unwrap(),
        );
        t.current_train_return = Some(StepOutput::Metrics(map));

        let value = t.resolve_monitor(Some("train_loss")).unwrap();
        assert_eq!(value, Some(0.5));
        assert_eq!(t.resolve_monitor(None).unwrap(), None);

        let err = t.resolve_monitor(Some("val_loss")).unwrap_err();
        assert!(err.to_string().contains("train_loss"));
    }

    #[test]
    fn test_sharded_strategy_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let s = settings(dir.path(), 1);
        let mut t = Trainer::new(Box::new(crate::strategy::FullySharded::new()), &s);
        let mut module = ToyModule::new(false);
        let err = t.fit(&mut module, toy_loader(1), None, false).unwrap_err();
        assert!(err.to_string().contains("unsupported configuration"));
    }

    struct StopAfter {
        batches: usize,
    }

    impl Callback for StopAfter {
        fn on_train_batch_end(
            &mut self,
            state: &mut EngineState,
            _output: &StepOutput,
            batch_idx: usize,
        ) {
            if batch_idx + 1 >= self.batches {
                state.should_stop = true;
            }
        }
    }

    #[test]
    fn test_callback_stop_request_ends_training() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut t = trainer(&settings(dir.path(), 5))
            .with_callback(Box::new(StopAfter { batches: 3 }));
        let mut module = ToyModule::new(false);
        t.fit(&mut module, toy_loader(10), None, false).unwrap();
        // training ends within the batch that requested the stop
        assert_eq!(t.state().global_step, 3);
        assert_eq!(t.state().current_epoch, 1);
    }

    #[test]
    fn test_checkpoint_written_per_epoch() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut t = trainer(&settings(dir.path(), 2));
        let mut module = ToyModule::new(false);
        t.fit(&mut module, toy_loader(2), None, false).unwrap();
        assert!(dir.path().join("epoch-0001.ckpt").exists());
        assert!(dir.path().join("epoch-0002.ckpt").exists());
    }
}
