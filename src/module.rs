//! The model-facing contract consumed by the engine.
//!
//! A [`TrainingModule`] exposes the capabilities the trainer drives: a
//! training step, an optional validation step, an optimization setup hook,
//! and a scheduler-step hook. Absent capabilities are no-ops or advisory
//! skips, never errors at dispatch time.

use std::collections::HashMap;

use candle_core::{DType, Tensor};
use candle_nn::VarMap;

use crate::data::Batch;
use crate::error::{ManeuverError, Result};
use crate::optim::Optimizer;
use crate::scheduler::LrSchedule;
use crate::setup::OptimSetup;

/// Output of one training or validation step: either a bare loss or a map of
/// named metrics containing a `loss` entry.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// A single scalar loss tensor.
    Loss(Tensor),
    /// Named scalar metrics; must contain `loss` when produced by a
    /// training step.
    Metrics(HashMap<String, Tensor>),
}

impl StepOutput {
    /// The loss tensor backing this output.
    ///
    /// # Errors
    ///
    /// Returns a training error if a metric map lacks a `loss` entry.
    pub fn loss(&self) -> Result<Tensor> {
        match self {
            StepOutput::Loss(t) => Ok(t.clone()),
            StepOutput::Metrics(map) => map.get("loss").cloned().ok_or_else(|| {
                ManeuverError::Training("step output has no \"loss\" metric".into())
            }),
        }
    }

    /// Copy of this output with every tensor detached from the computation
    /// graph. Stored outputs are always detached to bound memory.
    #[must_use]
    pub fn detached(&self) -> StepOutput {
        match self {
            StepOutput::Loss(t) => StepOutput::Loss(t.detach()),
            StepOutput::Metrics(map) => StepOutput::Metrics(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.detach()))
                    .collect(),
            ),
        }
    }

    /// Append `(prefix_key, value)` monitor candidates from this output.
    ///
    /// A bare loss contributes `{prefix}_loss`; a metric map contributes
    /// `{prefix}_{key}` for every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric tensor is not a scalar.
    pub fn monitor_candidates(
        &self,
        prefix: &str,
        into: &mut Vec<(String, f64)>,
    ) -> Result<()> {
        match self {
            StepOutput::Loss(t) => {
                into.push((format!("{prefix}_loss"), scalar_value(t)?));
            }
            StepOutput::Metrics(map) => {
                for (key, value) in map {
                    into.push((format!("{prefix}_{key}"), scalar_value(value)?));
                }
            }
        }
        Ok(())
    }
}

/// Read a scalar tensor as `f64`.
///
/// # Errors
///
/// Returns a training error if the tensor holds more than one element.
pub fn scalar_value(tensor: &Tensor) -> Result<f64> {
    let values = tensor
        .detach()
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    match values.as_slice() {
        [v] => Ok(f64::from(*v)),
        other => Err(ManeuverError::Training(format!(
            "expected scalar metric, got {} elements",
            other.len()
        ))),
    }
}

/// Contract between the engine and the model being trained.
pub trait TrainingModule {
    /// Run the forward pass and loss for one training batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward computation fails.
    fn training_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<StepOutput>;

    /// Whether this module implements [`TrainingModule::validation_step`].
    fn has_validation_step(&self) -> bool {
        false
    }

    /// Run the forward pass and loss for one validation batch.
    ///
    /// # Errors
    ///
    /// The default implementation always errors; modules declaring the
    /// capability override both this and
    /// [`TrainingModule::has_validation_step`].
    fn validation_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<StepOutput> {
        let _ = (batch, batch_idx);
        Err(ManeuverError::Training(
            "validation_step not implemented".into(),
        ))
    }

    /// Declare the optimizer and (optionally) a learning rate schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the setup cannot be built.
    fn configure_optimizers(&self) -> Result<OptimSetup>;

    /// Advance a learning rate schedule on the engine's behalf.
    ///
    /// The default advances the schedule with the resolved monitor value;
    /// override to customize schedule stepping.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule cannot be advanced.
    fn lr_scheduler_step(
        &mut self,
        schedule: &mut LrSchedule,
        optimizer: &mut Optimizer,
        monitor: Option<f64>,
    ) -> Result<()> {
        schedule.step(optimizer, monitor)
    }

    /// Switch between training and evaluation mode.
    fn set_training(&mut self, training: bool) {
        let _ = training;
    }

    /// Parameter map backing this module, used for optimization and
    /// checkpoint persistence.
    fn varmap(&self) -> &VarMap;
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_loss_from_bare_output() {
        let t = Tensor::new(0.5f32, &Device::Cpu).unwrap();
        let out = StepOutput::Loss(t);
        assert!((scalar_value(&out.loss().unwrap()).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_loss_missing_from_metrics() {
        let mut map = HashMap::new();
        map.insert(
            "acc".to_string(),
            Tensor::new(0.9f32, &Device::Cpu).unwrap(),
        );
        let out = StepOutput::Metrics(map);
        assert!(out.loss().is_err());
    }

    #[test]
    fn test_monitor_candidates_prefixing() {
        let mut map = HashMap::new();
        map.insert(
            "loss".to_string(),
            Tensor::new(0.25f32, &Device::Cpu).unwrap(),
        );
        map.insert(
            "acc".to_string(),
            Tensor::new(0.75f32, &Device::Cpu).unwrap(),
        );
        let out = StepOutput::Metrics(map);
        let mut candidates = Vec::new();
        out.monitor_candidates("val", &mut candidates).unwrap();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(candidates[0].0, "val_acc");
        assert_eq!(candidates[1].0, "val_loss");
    }

    #[test]
    fn test_scalar_value_rejects_vectors() {
        let t = Tensor::from_vec(vec![1.0f32, 2.0], 2, &Device::Cpu).unwrap();
        assert!(scalar_value(&t).is_err());
    }
}
