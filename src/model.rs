//! Per-timestep maneuver classifier.
//!
//! A small MLP over the velocity features of each timestep. It exists to
//! exercise the engine end to end; the engine itself only sees it through
//! [`TrainingModule`].

use candle_core::{Device, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use std::collections::HashMap;

use crate::config::{ManeuverConfig, OptimizerSettings, SchedulerSettings};
use crate::data::{Batch, NUM_CLASSES};
use crate::error::{ManeuverError, Result};
use crate::module::{StepOutput, TrainingModule};
use crate::optim::OptimizerConfig;
use crate::scheduler::{Interval, LrSchedule, ScheduleKind, SchedulerSpec};
use crate::setup::OptimSetup;

/// MLP classifier mapping each timestep's features to maneuver logits.
pub struct ManeuverClassifier {
    varmap: VarMap,
    layers: Vec<Linear>,
    head: Linear,
    optimizer: OptimizerSettings,
    scheduler: SchedulerSettings,
    training: bool,
}

impl ManeuverClassifier {
    /// Build the classifier described by `config`, placing parameters on
    /// `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if parameter initialization fails.
    pub fn new(config: &ManeuverConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, candle_core::DType::F32, device);

        let in_dim = config.dataset.features.len();
        let hidden = config.model.hidden_dim;
        let mut layers = Vec::with_capacity(config.model.num_layers);
        let mut width = in_dim;
        for i in 0..config.model.num_layers {
            layers.push(linear(width, hidden, vb.pp(format!("fc{i}")))?);
            width = hidden;
        }
        let head = linear(width, NUM_CLASSES, vb.pp("head"))?;

        Ok(Self {
            varmap,
            layers,
            head,
            optimizer: config.optimizer.clone(),
            scheduler: config.lr_scheduler.clone(),
            training: true,
        })
    }

    /// Logits of shape `[seq_len, num_classes]` for a feature tensor of
    /// shape `[seq_len, num_features]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a layer computation fails.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let mut xs = features.clone();
        for layer in &self.layers {
            xs = layer.forward(&xs)?.relu()?;
        }
        Ok(self.head.forward(&xs)?)
    }

    /// Whether the model is in training mode.
    #[must_use]
    pub fn is_training(&self) -> bool {
        self.training
    }

    fn metrics(&self, batch: &Batch) -> Result<StepOutput> {
        let logits = self.forward(&batch.features)?;
        let loss = candle_nn::loss::cross_entropy(&logits, &batch.labels)?;
        let predictions = logits.argmax(D::Minus1)?;
        let accuracy = predictions
            .eq(&batch.labels)?
            .to_dtype(candle_core::DType::F32)?
            .mean_all()?;

        let mut map = HashMap::new();
        map.insert("loss".to_string(), loss);
        map.insert("acc".to_string(), accuracy);
        Ok(StepOutput::Metrics(map))
    }
}

impl TrainingModule for ManeuverClassifier {
    fn training_step(&mut self, batch: &Batch, _batch_idx: usize) -> Result<StepOutput> {
        self.metrics(batch)
    }

    fn has_validation_step(&self) -> bool {
        true
    }

    fn validation_step(&mut self, batch: &Batch, _batch_idx: usize) -> Result<StepOutput> {
        self.metrics(batch)
    }

    fn configure_optimizers(&self) -> Result<OptimSetup> {
        let config = OptimizerConfig {
            learning_rate: self.optimizer.lr,
            weight_decay: self.optimizer.weight_decay,
            ..OptimizerConfig::default()
        };
        let optimizer = match self.optimizer.opt.as_str() {
            "adam" => config.build_adamw(&self.varmap),
            "sgd" => config.build_sgd(&self.varmap),
            other => {
                return Err(ManeuverError::Config(format!(
                    "unknown optimizer: \"{other}\" (supported: adam, sgd)"
                )))
            }
        };

        let mut spec = match self.scheduler.lrs.as_str() {
            "step" => {
                let mut spec = SchedulerSpec::new(LrSchedule::new(ScheduleKind::Step {
                    step_size: self.scheduler.step_size,
                    gamma: self.scheduler.gamma,
                }));
                // keyed purely by epoch count, no metric involved
                spec.monitor = Some(None);
                spec
            }
            "multistep" => {
                let mut spec = SchedulerSpec::new(LrSchedule::new(ScheduleKind::MultiStep {
                    milestones: self.scheduler.milestones.clone(),
                    gamma: self.scheduler.gamma,
                }));
                spec.monitor = Some(None);
                spec
            }
            "plateau" => SchedulerSpec::new(LrSchedule::new(ScheduleKind::Plateau {
                factor: self.scheduler.gamma,
                patience: self.scheduler.patience,
                min_lr: self.scheduler.min_lr,
            })),
            other => {
                return Err(ManeuverError::Config(format!(
                    "unknown lr scheduler: \"{other}\" (supported: step, plateau, multistep)"
                )))
            }
        };
        spec.interval = Some(Interval::Epoch);

        Ok(OptimSetup::Sequence(vec![
            OptimSetup::Sequence(vec![OptimSetup::Optimizer(optimizer)]),
            OptimSetup::Sequence(vec![OptimSetup::Config(spec)]),
        ]))
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}
