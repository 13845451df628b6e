//! Checkpoint records and directory discovery.
//!
//! Checkpoints are named `epoch-<4-digit-zero-padded>.ckpt` so lexicographic
//! order equals chronological order; [`latest_checkpoint`] relies on that
//! instead of parsing timestamps.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ManeuverError, Result};

/// File name for the checkpoint written at the end of `epoch`.
#[must_use]
pub fn checkpoint_file_name(epoch: usize) -> String {
    format!("epoch-{epoch:04}.ckpt")
}

/// The lexicographically last checkpoint in `dir`.
///
/// Returns `None` for a missing or empty directory; both are valid "no prior
/// checkpoint" signals, not errors.
#[must_use]
pub fn latest_checkpoint(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".ckpt"))
        .collect();
    names.sort();
    names.pop().map(|name| dir.join(name))
}

/// A persisted engine snapshot: logical component name to serialized state,
/// plus the two engine counters.
///
/// Restoring consumes entries one by one; leftover entries after restore are
/// an integrity error surfaced by the trainer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointRecord {
    entries: serde_json::Map<String, Value>,
}

impl CheckpointRecord {
    /// Empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a component.
    pub fn insert(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_string(), value);
    }

    /// Remove and return a component.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    /// Remove and return a required counter.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if the counter is missing or not an
    /// unsigned integer.
    pub fn take_counter(&mut self, name: &str) -> Result<usize> {
        let value = self.take(name).ok_or_else(|| {
            ManeuverError::Checkpoint(format!("checkpoint is missing \"{name}\""))
        })?;
        value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| {
                ManeuverError::Checkpoint(format!("checkpoint field \"{name}\" is not a counter"))
            })
    }

    /// Names of the entries still present.
    #[must_use]
    pub fn remaining(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Whether every entry has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialized form of one model parameter.
#[derive(Debug, Serialize, Deserialize)]
struct TensorState {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Serialize every parameter in `varmap` into a checkpoint value.
///
/// # Errors
///
/// Returns an error if a tensor cannot be read back to host memory.
pub fn model_state(varmap: &VarMap) -> Result<Value> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| ManeuverError::Checkpoint("parameter table lock poisoned".into()))?;
    let mut entries = serde_json::Map::new();
    for (name, var) in vars.iter() {
        let flat = var.as_tensor().to_dtype(DType::F32)?.flatten_all()?;
        let state = TensorState {
            shape: var.as_tensor().dims().to_vec(),
            data: flat.to_vec1::<f32>()?,
        };
        entries.insert(name.clone(), serde_json::to_value(state)?);
    }
    Ok(Value::Object(entries))
}

/// Restore every parameter in `varmap` from a checkpoint value.
///
/// The parameter sets must match exactly in both directions.
///
/// # Errors
///
/// Returns a checkpoint error for a missing or extra parameter or a shape
/// mismatch.
pub fn load_model_state(varmap: &VarMap, value: Value, device: &Device) -> Result<()> {
    let states: std::collections::HashMap<String, TensorState> = serde_json::from_value(value)?;
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| ManeuverError::Checkpoint("parameter table lock poisoned".into()))?;
    for name in states.keys() {
        if !vars.contains_key(name) {
            return Err(ManeuverError::Checkpoint(format!(
                "checkpoint contains unknown parameter \"{name}\""
            )));
        }
    }
    for (name, var) in vars.iter() {
        let state = states.get(name).ok_or_else(|| {
            ManeuverError::Checkpoint(format!("checkpoint is missing parameter \"{name}\""))
        })?;
        if state.shape.as_slice() != var.as_tensor().dims() {
            return Err(ManeuverError::Checkpoint(format!(
                "parameter \"{name}\" shape mismatch: checkpoint {:?}, model {:?}",
                state.shape,
                var.as_tensor().dims()
            )));
        }
        let tensor = Tensor::from_vec(state.data.clone(), state.shape.clone(), device)?
            .to_dtype(var.as_tensor().dtype())?;
        var.set(&tensor)?;
    }
    Ok(())
}
