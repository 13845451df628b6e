//! Flight-trajectory batch source.
//!
//! The engine treats the data side as an external collaborator: anything that
//! yields a finite sequence of [`Batch`]es works. This module provides a
//! seeded synthetic generator producing per-timestep maneuver labels so runs
//! are reproducible without on-disk data.

use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DatasetSettings;
use crate::error::Result;

/// Maneuver classes predicted per timestep.
pub const MANEUVERS: [&str; 5] = ["takeoff", "turn", "line", "orbit", "landing"];

/// Feature channels the generator can emit.
pub const FEATURE_NAMES: [&str; 6] = ["vx", "vy", "vz", "dvx", "dvy", "dvz"];

/// Number of maneuver classes.
pub const NUM_CLASSES: usize = MANEUVERS.len();

/// One trajectory: per-timestep feature rows and maneuver labels.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Feature tensor of shape `[seq_len, num_features]`, f32.
    pub features: Tensor,
    /// Label tensor of shape `[seq_len]`, u32 class indices.
    pub labels: Tensor,
}

/// A finite, ordered batch source.
///
/// Wraps the materialized batches so a distributed strategy can reshard it
/// without the loops caring.
#[derive(Debug, Clone)]
pub struct DataLoader {
    batches: Vec<Batch>,
}

impl DataLoader {
    /// Wrap a set of batches.
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    /// Number of batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether the loader holds no batches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Iterate over batches in yield order.
    pub fn iter(&self) -> std::slice::Iter<'_, Batch> {
        self.batches.iter()
    }
}

/// Generate `count` synthetic trajectories.
///
/// Each trajectory follows one maneuver profile (velocity pattern per class)
/// with additive noise; labels mark the profile at every timestep. The
/// feature list in `settings` selects which channels are emitted, in order.
///
/// # Errors
///
/// Returns an error if tensor construction fails.
pub fn generate_trajectories(
    settings: &DatasetSettings,
    count: usize,
    seed: u64,
    device: &Device,
) -> Result<DataLoader> {
    let mut rng = StdRng::seed_from_u64(seed);
    let seq_len = settings.seq_len;
    let num_features = settings.features.len();

    let mut batches = Vec::with_capacity(count);
    for _ in 0..count {
        let class = rng.gen_range(0..NUM_CLASSES) as u32;
        let mut rows = Vec::with_capacity(seq_len * num_features);
        let mut prev = [0.0f32; 3];
        for t in 0..seq_len {
            let v = velocity_at(class as usize, t, seq_len, &mut rng);
            let dv = [v[0] - prev[0], v[1] - prev[1], v[2] - prev[2]];
            prev = v;
            for name in &settings.features {
                rows.push(match name.as_str() {
                    "vx" => v[0],
                    "vy" => v[1],
                    "vz" => v[2],
                    "dvx" => dv[0],
                    "dvy" => dv[1],
                    "dvz" => dv[2],
                    _ => 0.0,
                });
            }
        }
        let features = Tensor::from_vec(rows, (seq_len, num_features), device)?;
        let labels = Tensor::from_vec(vec![class; seq_len], seq_len, device)?
            .to_dtype(DType::U32)?;
        batches.push(Batch { features, labels });
    }
    Ok(DataLoader::new(batches))
}

/// Velocity profile for one maneuver class at timestep `t`.
fn velocity_at(class: usize, t: usize, seq_len: usize, rng: &mut StdRng) -> [f32; 3] {
    let phase = t as f32 / seq_len as f32;
    let mut noise = || (rng.gen::<f32>() - 0.5) * 0.1;
    let base = match class {
        // takeoff: accelerating climb
        0 => [phase, 0.0, phase * 0.8],
        // turn: rotating horizontal velocity
        1 => [
            (phase * std::f32::consts::PI).cos(),
            (phase * std::f32::consts::PI).sin(),
            0.0,
        ],
        // line: constant cruise
        2 => [1.0, 0.2, 0.0],
        // orbit: full circle
        3 => [
            (phase * std::f32::consts::TAU).cos(),
            (phase * std::f32::consts::TAU).sin(),
            0.0,
        ],
        // landing: decelerating descent
        _ => [1.0 - phase, 0.0, -0.5 * (1.0 - phase)],
    };
    [base[0] + noise(), base[1] + noise(), base[2] + noise()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shapes() {
        let settings = DatasetSettings::default();
        let loader =
            generate_trajectories(&settings, 4, 7, &Device::Cpu).unwrap();
        assert_eq!(loader.len(), 4);
        let batch = loader.iter().next().unwrap();
        assert_eq!(
            batch.features.dims(),
            &[settings.seq_len, settings.features.len()]
        );
        assert_eq!(batch.labels.dims(), &[settings.seq_len]);
        assert_eq!(batch.labels.dtype(), DType::U32);
    }

    #[test]
    fn test_generation_is_seeded() {
        let settings = DatasetSettings::default();
        let a = generate_trajectories(&settings, 2, 11, &Device::Cpu).unwrap();
        let b = generate_trajectories(&settings, 2, 11, &Device::Cpu).unwrap();
        let fa = a.iter().next().unwrap().features.to_vec2::<f32>().unwrap();
        let fb = b.iter().next().unwrap().features.to_vec2::<f32>().unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn test_labels_within_class_range() {
        let settings = DatasetSettings::default();
        let loader =
            generate_trajectories(&settings, 8, 3, &Device::Cpu).unwrap();
        for batch in loader.iter() {
            for label in batch.labels.to_vec1::<u32>().unwrap() {
                assert!((label as usize) < NUM_CLASSES);
            }
        }
    }
}
