//! Distributed-execution seam.
//!
//! The engine consumes the execution backend only through [`Strategy`]:
//! device placement, the backward pass, checkpoint I/O and its on-disk
//! format, and rank topology all live behind it. The engine itself stays a
//! single synchronous loop per process.

use std::path::Path;

use candle_core::backprop::GradStore;
use candle_core::{Device, Tensor};
use candle_nn::VarMap;

use crate::checkpoint::CheckpointRecord;
use crate::config::StrategyKind;
use crate::data::DataLoader;
use crate::error::Result;

/// Contract between the engine and the execution backend.
pub trait Strategy {
    /// Bring up backend processes. Called once at fit start.
    fn launch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Prepare model parameters for execution (device moves, wrapping).
    fn setup(&self, varmap: &VarMap) -> Result<()> {
        let _ = varmap;
        Ok(())
    }

    /// Wrap a batch source (e.g. shard it across ranks).
    fn setup_dataloader(&self, loader: DataLoader) -> Result<DataLoader> {
        Ok(loader)
    }

    /// Run the backward pass, returning gradients for the local parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the backward pass fails.
    fn backward(&self, loss: &Tensor) -> Result<GradStore>;

    /// Persist a checkpoint record. The strategy owns the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn save(&self, path: &Path, record: &CheckpointRecord) -> Result<()>;

    /// Read a checkpoint record back.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn load(&self, path: &Path) -> Result<CheckpointRecord>;

    /// Whether this process is rank zero.
    fn is_global_zero(&self) -> bool {
        true
    }

    /// Synchronize all ranks (no-op for a single process).
    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the backend reshards parameters outside the engine's
    /// awareness. The trainer rejects such strategies at fit start.
    fn shards_parameters(&self) -> bool {
        false
    }

    /// Device this strategy places tensors on.
    fn device(&self) -> &Device;
}

/// Single-process, single-device execution.
///
/// Checkpoints are stored as JSON records, one file per epoch.
pub struct SingleDevice {
    device: Device,
}

impl SingleDevice {
    /// Select a device: CUDA when available, CPU otherwise. Set
    /// `MANEUVER_FORCE_CPU=1` to skip CUDA probing.
    ///
    /// # Errors
    ///
    /// Returns an error if device initialization fails.
    pub fn new() -> Result<Self> {
        let force_cpu = std::env::var("MANEUVER_FORCE_CPU")
            .ok()
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        let device = if force_cpu {
            tracing::info!("CPU mode forced via MANEUVER_FORCE_CPU");
            Device::Cpu
        } else {
            match Device::cuda_if_available(0)? {
                device @ Device::Cuda(_) => {
                    tracing::info!("Training device: CUDA");
                    device
                }
                device => {
                    tracing::info!("Training device: CPU");
                    device
                }
            }
        };
        Ok(Self { device })
    }

    /// Use a specific device.
    pub fn with_device(device: Device) -> Self {
        Self { device }
    }
}

impl Strategy for SingleDevice {
    fn backward(&self, loss: &Tensor) -> Result<GradStore> {
        Ok(loss.backward()?)
    }

    fn save(&self, path: &Path, record: &CheckpointRecord) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(record)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<CheckpointRecord> {
        let contents = std::fs::read_to_string(path)?;
        let record: CheckpointRecord = serde_json::from_str(&contents)?;
        Ok(record)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Stand-in for fully-sharded parameter strategies.
///
/// Exists so configurations selecting a resharding backend fail fast in the
/// trainer rather than half-initializing.
pub struct FullySharded {
    inner: SingleDevice,
}

impl FullySharded {
    /// Create the stand-in on the CPU device.
    pub fn new() -> Self {
        Self {
            inner: SingleDevice::with_device(Device::Cpu),
        }
    }
}

impl Default for FullySharded {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for FullySharded {
    fn backward(&self, loss: &Tensor) -> Result<GradStore> {
        self.inner.backward(loss)
    }

    fn save(&self, path: &Path, record: &CheckpointRecord) -> Result<()> {
        self.inner.save(path, record)
    }

    fn load(&self, path: &Path) -> Result<CheckpointRecord> {
        self.inner.load(path)
    }

    fn shards_parameters(&self) -> bool {
        true
    }

    fn device(&self) -> &Device {
        self.inner.device()
    }
}

/// Build the strategy selected by the configuration.
///
/// # Errors
///
/// Returns an error if device initialization fails.
pub fn build_strategy(kind: StrategyKind) -> Result<Box<dyn Strategy>> {
    match kind {
        StrategyKind::Single => Ok(Box::new(SingleDevice::new()?)),
        StrategyKind::Sharded => Ok(Box::new(FullySharded::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_device_checkpoint_round_trip() {
        let strategy = SingleDevice::with_device(Device::Cpu);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("epoch-0001.ckpt");

        let mut record = CheckpointRecord::new();
        record.insert("global_step", serde_json::json!(7));
        strategy.save(&path, &record).unwrap();

        let mut restored = strategy.load(&path).unwrap();
        assert_eq!(restored.take_counter("global_step").unwrap(), 7);
        assert!(restored.is_empty());
    }

    #[test]
    fn test_load_missing_file_errors() {
        let strategy = SingleDevice::with_device(Device::Cpu);
        assert!(strategy.load(Path::new("/no/such/file.ckpt")).is_err());
    }

    #[test]
    fn test_sharded_stub_reports_resharding() {
        let strategy = FullySharded::new();
        assert!(strategy.shards_parameters());
        let single = SingleDevice::with_device(Device::Cpu);
        assert!(!single.shards_parameters());
    }

    #[test]
    fn test_backward_produces_gradients() {
        let strategy = SingleDevice::with_device(Device::Cpu);
        let var = candle_core::Var::new(&[1.0f32, 2.0], &Device::Cpu).unwrap();
        let loss = var.as_tensor().sum_all().unwrap();
        let grads = strategy.backward(&loss).unwrap();
        assert!(grads.get(var.as_tensor()).is_some());
    }
}
