//! Configuration parsing and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ManeuverError, Result};

/// Main configuration for a maneuver-classification training run.
///
/// # Example
///
/// ```rust
/// use maneuver_rs::ManeuverConfig;
///
/// # fn main() -> maneuver_rs::Result<()> {
/// let mut config = ManeuverConfig::from_preset("resnet-small")?;
/// config.trainer.max_epochs = Some(5);
/// config.validate()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManeuverConfig {
    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Optimizer settings.
    #[serde(default)]
    pub optimizer: OptimizerSettings,

    /// Learning rate scheduler settings.
    #[serde(default)]
    pub lr_scheduler: SchedulerSettings,

    /// Dataset settings.
    #[serde(default)]
    pub dataset: DatasetSettings,

    /// Trainer/engine settings.
    #[serde(default)]
    pub trainer: TrainerSettings,

    /// Distributed-execution strategy.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Random seed for data generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            optimizer: OptimizerSettings::default(),
            lr_scheduler: SchedulerSettings::default(),
            dataset: DatasetSettings::default(),
            trainer: TrainerSettings::default(),
            strategy: StrategyKind::default(),
            seed: default_seed(),
        }
    }
}

/// Classifier architecture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden layer width.
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,

    /// Number of hidden layers.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
}

fn default_hidden_dim() -> usize {
    64
}
fn default_num_layers() -> usize {
    2
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_dim: default_hidden_dim(),
            num_layers: default_num_layers(),
        }
    }
}

/// Optimizer choice and hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Optimizer name: `adam` or `sgd`.
    #[serde(default = "default_opt")]
    pub opt: String,

    /// Learning rate.
    #[serde(default = "default_lr")]
    pub lr: f64,

    /// Weight decay (AdamW only).
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
}

fn default_opt() -> String {
    "adam".into()
}
fn default_lr() -> f64 {
    1e-3
}
fn default_weight_decay() -> f64 {
    0.01
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            opt: default_opt(),
            lr: default_lr(),
            weight_decay: default_weight_decay(),
        }
    }
}

/// Learning rate schedule choice.
///
/// Exactly one schedule is built from these settings. The plateau schedule
/// monitors `val_loss` at epoch granularity; `step` and `multistep` are keyed
/// purely by epoch count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Schedule name: `step`, `plateau`, or `multistep`.
    #[serde(default = "default_lrs")]
    pub lrs: String,

    /// Decay interval in epochs (`step` schedule).
    #[serde(default = "default_step_size")]
    pub step_size: usize,

    /// Decay milestones in epochs (`multistep` schedule).
    #[serde(default = "default_milestones")]
    pub milestones: Vec<usize>,

    /// Multiplicative decay factor.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Plateau patience in monitored epochs.
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Lower bound on the learning rate (`plateau` schedule).
    #[serde(default = "default_min_lr")]
    pub min_lr: f64,
}

fn default_lrs() -> String {
    "multistep".into()
}
fn default_step_size() -> usize {
    100
}
fn default_milestones() -> Vec<usize> {
    vec![100, 150]
}
fn default_gamma() -> f64 {
    0.1
}
fn default_patience() -> usize {
    10
}
fn default_min_lr() -> f64 {
    1e-6
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lrs: default_lrs(),
            step_size: default_step_size(),
            milestones: default_milestones(),
            gamma: default_gamma(),
            patience: default_patience(),
            min_lr: default_min_lr(),
        }
    }
}

/// Trajectory dataset settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// Number of training trajectories.
    #[serde(default = "default_num_train")]
    pub num_train: usize,

    /// Number of validation trajectories.
    #[serde(default = "default_num_valid")]
    pub num_valid: usize,

    /// Timesteps per trajectory.
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,

    /// Feature columns fed to the model.
    #[serde(default = "default_features")]
    pub features: Vec<String>,
}

fn default_num_train() -> usize {
    64
}
fn default_num_valid() -> usize {
    16
}
fn default_seq_len() -> usize {
    32
}
fn default_features() -> Vec<String> {
    vec![
        "vx".into(),
        "vy".into(),
        "vz".into(),
        "dvx".into(),
        "dvy".into(),
        "dvz".into(),
    ]
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            num_train: default_num_train(),
            num_valid: default_num_valid(),
            seq_len: default_seq_len(),
            features: default_features(),
        }
    }
}

/// Engine knobs for the fit loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSettings {
    /// Maximum number of epochs to train.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: Option<usize>,

    /// Maximum number of optimizer steps to train.
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// How many batches to accumulate before each optimizer step.
    #[serde(default = "default_grad_accum_steps")]
    pub grad_accum_steps: usize,

    /// How many epochs to run before each validation epoch.
    #[serde(default = "default_frequency")]
    pub validation_frequency: usize,

    /// How many epochs to run before each checkpoint is written.
    #[serde(default = "default_frequency")]
    pub checkpoint_frequency: usize,

    /// Directory to store checkpoints in.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Limits the batches consumed per training epoch.
    #[serde(default)]
    pub limit_train_batches: Option<usize>,

    /// Limits the batches consumed per validation epoch.
    #[serde(default)]
    pub limit_val_batches: Option<usize>,
}

fn default_max_epochs() -> Option<usize> {
    Some(1000)
}
fn default_grad_accum_steps() -> usize {
    1
}
fn default_frequency() -> usize {
    1
}
fn default_checkpoint_dir() -> String {
    "logs/checkpoints".into()
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            max_epochs: default_max_epochs(),
            max_steps: None,
            grad_accum_steps: default_grad_accum_steps(),
            validation_frequency: default_frequency(),
            checkpoint_frequency: default_frequency(),
            checkpoint_dir: default_checkpoint_dir(),
            limit_train_batches: None,
            limit_val_batches: None,
        }
    }
}

/// Distributed-execution strategy selector.
///
/// Only `single` is runnable. `sharded` stands for strategies that reshard
/// parameters outside the engine's awareness; the trainer rejects it at fit
/// start because the engine assumes single-process optimizer ownership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Single-process, single-device execution.
    #[default]
    Single,
    /// Fully-sharded parameter strategy (unsupported).
    Sharded,
}

impl ManeuverConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Write configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown preset names.
    pub fn from_preset(name: &str) -> Result<Self> {
        match name {
            "resnet-small" => Ok(Self::default()),
            "resnet-small-sgd" => {
                let mut config = Self::default();
                config.optimizer.opt = "sgd".into();
                config.lr_scheduler.lrs = "step".into();
                Ok(config)
            }
            "plateau" => {
                let mut config = Self::default();
                config.lr_scheduler.lrs = "plateau".into();
                Ok(config)
            }
            other => Err(ManeuverError::Config(format!(
                "unknown preset: \"{other}\" (available: resnet-small, resnet-small-sgd, plateau)"
            ))),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        match self.optimizer.opt.as_str() {
            "adam" | "sgd" => {}
            other => {
                return Err(ManeuverError::Config(format!(
                    "unknown optimizer: \"{other}\" (supported: adam, sgd)"
                )))
            }
        }
        match self.lr_scheduler.lrs.as_str() {
            "step" | "plateau" | "multistep" => {}
            other => {
                return Err(ManeuverError::Config(format!(
                    "unknown lr scheduler: \"{other}\" (supported: step, plateau, multistep)"
                )))
            }
        }
        if self.optimizer.lr <= 0.0 {
            return Err(ManeuverError::Config(
                "learning rate must be positive".into(),
            ));
        }
        if self.trainer.grad_accum_steps == 0 {
            return Err(ManeuverError::Config(
                "grad_accum_steps must be at least 1".into(),
            ));
        }
        if self.trainer.validation_frequency == 0 || self.trainer.checkpoint_frequency == 0 {
            return Err(ManeuverError::Config(
                "validation_frequency and checkpoint_frequency must be at least 1".into(),
            ));
        }
        if self.dataset.features.is_empty() {
            return Err(ManeuverError::Config(
                "at least one input feature is required".into(),
            ));
        }
        for name in &self.dataset.features {
            if !crate::data::FEATURE_NAMES.contains(&name.as_str()) {
                return Err(ManeuverError::Config(format!(
                    "unknown feature \"{name}\" (available: {})",
                    crate::data::FEATURE_NAMES.join(", ")
                )));
            }
        }
        if self.dataset.seq_len == 0 {
            return Err(ManeuverError::Config("seq_len must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ManeuverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.optimizer.opt, "adam");
        assert_eq!(config.lr_scheduler.lrs, "multistep");
        assert_eq!(config.trainer.grad_accum_steps, 1);
    }

    #[test]
    fn test_unknown_optimizer_rejected() {
        let mut config = ManeuverConfig::default();
        config.optimizer.opt = "lbfgs".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown optimizer"));
    }

    #[test]
    fn test_unknown_scheduler_rejected() {
        let mut config = ManeuverConfig::default();
        config.lr_scheduler.lrs = "cyclic".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_accumulation_rejected() {
        let mut config = ManeuverConfig::default();
        config.trainer.grad_accum_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let mut config = ManeuverConfig::default();
        config.dataset.features.push("vxx".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown feature \"vxx\""));
    }

    #[test]
    fn test_preset_round_trip() {
        let config = ManeuverConfig::from_preset("resnet-small-sgd").unwrap();
        assert_eq!(config.optimizer.opt, "sgd");
        assert!(ManeuverConfig::from_preset("nope").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ManeuverConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ManeuverConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.trainer.checkpoint_dir, config.trainer.checkpoint_dir);
        assert_eq!(parsed.seed, config.seed);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "optimizer:\n  opt: sgd\n";
        let config: ManeuverConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.optimizer.opt, "sgd");
        assert_eq!(config.optimizer.lr, 1e-3);
        assert_eq!(config.trainer.validation_frequency, 1);
        assert_eq!(config.strategy, StrategyKind::Single);
    }
}
