//! Optimizers with an explicit two-phase step.
//!
//! The loop driver splits each optimizer update into `accumulate` (merge one
//! batch's gradients into the pending buffers) and `apply_and_reset` (apply
//! the update and clear the buffers). Gradients from intervening batches of a
//! gradient-accumulation group sum in place between applies.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use crate::error::{ManeuverError, Result};

/// Optimizer hyperparameters.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Learning rate.
    pub learning_rate: f64,
    /// Beta1 for Adam.
    pub beta1: f64,
    /// Beta2 for Adam.
    pub beta2: f64,
    /// Weight decay (decoupled, AdamW style).
    pub weight_decay: f64,
    /// Epsilon for numerical stability.
    pub eps: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.01,
            eps: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Create an AdamW optimizer over all vars in `varmap`.
    pub fn build_adamw(&self, varmap: &VarMap) -> Optimizer {
        let vars = varmap.all_vars();
        let moments = vars.iter().map(|_| None).collect();
        Optimizer::new(
            vars,
            self.learning_rate,
            Update::AdamW {
                beta1: self.beta1,
                beta2: self.beta2,
                eps: self.eps,
                weight_decay: self.weight_decay,
                moments,
            },
        )
    }

    /// Create a plain SGD optimizer over all vars in `varmap`.
    pub fn build_sgd(&self, varmap: &VarMap) -> Optimizer {
        Optimizer::new(varmap.all_vars(), self.learning_rate, Update::Sgd)
    }
}

/// Parameter update rule.
#[derive(Debug)]
enum Update {
    Sgd,
    AdamW {
        beta1: f64,
        beta2: f64,
        eps: f64,
        weight_decay: f64,
        /// First/second moment per var, lazily initialized.
        moments: Vec<Option<(Tensor, Tensor)>>,
    },
}

/// Serializable optimizer state for checkpoints.
///
/// Adam moments are rebuilt on resume; only the learning rate and applied
/// step count persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Current learning rate.
    pub learning_rate: f64,
    /// Number of applied optimizer steps.
    pub step_count: usize,
}

/// Two-phase optimizer over candle `Var`s.
#[derive(Debug)]
pub struct Optimizer {
    vars: Vec<Var>,
    lr: f64,
    update: Update,
    grads: Vec<Option<Tensor>>,
    pending: usize,
    step_count: usize,
}

impl Optimizer {
    fn new(vars: Vec<Var>, lr: f64, update: Update) -> Self {
        let grads = vars.iter().map(|_| None).collect();
        Self {
            vars,
            lr,
            update,
            grads,
            pending: 0,
            step_count: 0,
        }
    }

    /// Merge one batch's gradients into the pending buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if gradient tensors cannot be summed.
    pub fn accumulate(&mut self, grads: &GradStore) -> Result<()> {
        for (slot, var) in self.grads.iter_mut().zip(self.vars.iter()) {
            if let Some(grad) = grads.get(var.as_tensor()) {
                *slot = Some(match slot.take() {
                    None => grad.clone(),
                    Some(prev) => (prev + grad)?,
                });
            }
        }
        self.pending += 1;
        Ok(())
    }

    /// Number of batches accumulated since the last apply.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Apply the pending update to every parameter, then clear the buffers.
    ///
    /// # Errors
    ///
    /// Returns a training error if called with no accumulated gradients, or
    /// an error if a tensor operation fails.
    pub fn apply_and_reset(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Err(ManeuverError::Training(
                "optimizer step with no accumulated gradients".into(),
            ));
        }
        self.step_count += 1;
        let lr = self.lr;
        match &mut self.update {
            Update::Sgd => {
                for (var, slot) in self.vars.iter().zip(self.grads.iter()) {
                    if let Some(grad) = slot {
                        let next = (var.as_tensor() - grad.affine(lr, 0.0)?)?;
                        var.set(&next)?;
                    }
                }
            }
            Update::AdamW {
                beta1,
                beta2,
                eps,
                weight_decay,
                moments,
            } => {
                let t = self.step_count as i32;
                let bias1 = 1.0 - beta1.powi(t);
                let bias2 = 1.0 - beta2.powi(t);
                for ((var, slot), moment) in
                    self.vars.iter().zip(self.grads.iter()).zip(moments.iter_mut())
                {
                    let Some(grad) = slot else { continue };
                    let (m_prev, v_prev) = match moment.take() {
                        Some(pair) => pair,
                        None => (grad.zeros_like()?, grad.zeros_like()?),
                    };
                    let m = (m_prev.affine(*beta1, 0.0)? + grad.affine(1.0 - *beta1, 0.0)?)?;
                    let v = (v_prev.affine(*beta2, 0.0)?
                        + grad.sqr()?.affine(1.0 - *beta2, 0.0)?)?;
                    let m_hat = m.affine(1.0 / bias1, 0.0)?;
                    let v_hat = v.affine(1.0 / bias2, 0.0)?;
                    let denom = v_hat.sqrt()?.affine(1.0, *eps)?;
                    let step = (m_hat / denom)?;
                    let next = (var.as_tensor().affine(1.0 - lr * *weight_decay, 0.0)?
                        - step.affine(lr, 0.0)?)?;
                    var.set(&next)?;
                    *moment = Some((m, v));
                }
            }
        }
        self.zero_grad();
        Ok(())
    }

    /// Clear accumulated gradients without applying them.
    pub fn zero_grad(&mut self) {
        for slot in &mut self.grads {
            *slot = None;
        }
        self.pending = 0;
    }

    /// Current learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    /// Set the learning rate (used by schedules).
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// Number of applied optimizer steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Snapshot the persistent optimizer state.
    #[must_use]
    pub fn state(&self) -> OptimizerState {
        OptimizerState {
            learning_rate: self.lr,
            step_count: self.step_count,
        }
    }

    /// Restore persistent optimizer state from a checkpoint.
    pub fn load_state(&mut self, state: &OptimizerState) {
        self.lr = state.learning_rate;
        self.step_count = state.step_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn single_var_setup() -> (VarMap, Var) {
        let varmap = VarMap::new();
        varmap
            .get(3, "w", candle_nn::Init::Const(1.0), DType::F32, &Device::Cpu)
            .unwrap();
        let var = varmap.all_vars().pop().unwrap();
        (varmap, var)
    }

    fn grads_for(var: &Var, value: f32) -> GradStore {
        // build a graph whose gradient wrt var is `value` everywhere
        let loss = var
            .as_tensor()
            .affine(f64::from(value), 0.0)
            .unwrap()
            .sum_all()
            .unwrap();
        loss.backward().unwrap()
    }

    #[test]
    fn test_sgd_applies_accumulated_sum() {
        let (varmap, var) = single_var_setup();
        let config = OptimizerConfig {
            learning_rate: 0.1,
            ..OptimizerConfig::default()
        };
        let mut optimizer = config.build_sgd(&varmap);

        optimizer.accumulate(&grads_for(&var, 1.0)).unwrap();
        optimizer.accumulate(&grads_for(&var, 2.0)).unwrap();
        assert_eq!(optimizer.pending(), 2);
        optimizer.apply_and_reset().unwrap();

        // grads sum to 3.0 per element; update = 1.0 - 0.1 * 3.0
        let values = var.as_tensor().to_vec1::<f32>().unwrap();
        for v in values {
            assert!((v - 0.7).abs() < 1e-6);
        }
        assert_eq!(optimizer.pending(), 0);
        assert_eq!(optimizer.step_count(), 1);
    }

    #[test]
    fn test_apply_without_gradients_errors() {
        let (varmap, _var) = single_var_setup();
        let mut optimizer = OptimizerConfig::default().build_sgd(&varmap);
        assert!(optimizer.apply_and_reset().is_err());
    }

    #[test]
    fn test_adamw_moves_against_gradient() {
        let (varmap, var) = single_var_setup();
        let mut optimizer = OptimizerConfig::default().build_adamw(&varmap);
        optimizer.accumulate(&grads_for(&var, 1.0)).unwrap();
        optimizer.apply_and_reset().unwrap();
        let values = var.as_tensor().to_vec1::<f32>().unwrap();
        for v in values {
            assert!(v < 1.0);
        }
    }

    #[test]
    fn test_zero_grad_discards_pending() {
        let (varmap, var) = single_var_setup();
        let mut optimizer = OptimizerConfig::default().build_sgd(&varmap);
        optimizer.accumulate(&grads_for(&var, 1.0)).unwrap();
        optimizer.zero_grad();
        assert_eq!(optimizer.pending(), 0);
        assert!(optimizer.apply_and_reset().is_err());
    }

    #[test]
    fn test_state_round_trip() {
        let (varmap, _var) = single_var_setup();
        let mut optimizer = OptimizerConfig::default().build_adamw(&varmap);
        optimizer.set_learning_rate(5e-4);
        let state = optimizer.state();

        let mut restored = OptimizerConfig::default().build_adamw(&varmap);
        restored.load_state(&state);
        assert_eq!(restored.learning_rate(), 5e-4);
        assert_eq!(restored.step_count(), 0);
    }
}
