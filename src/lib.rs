//! # maneuver-rs
//!
//! A compact training engine for per-timestep flight-maneuver
//! classification.
//!
//! The crate separates the orchestration engine from the model: a
//! [`Trainer`] drives any [`TrainingModule`] through training epochs,
//! optional validation epochs, learning rate scheduling, and resumable
//! checkpointing, while [`ManeuverClassifier`] provides the bundled model.
//!
//! ## Quick start
//!
//! ```no_run
//! use maneuver_rs::config::ManeuverConfig;
//! use maneuver_rs::data::generate_trajectories;
//! use maneuver_rs::model::ManeuverClassifier;
//! use maneuver_rs::strategy::build_strategy;
//! use maneuver_rs::trainer::Trainer;
//!
//! # fn main() -> maneuver_rs::Result<()> {
//! let mut config = ManeuverConfig::from_preset("resnet-small")?;
//! config.trainer.max_epochs = Some(3);
//! config.validate()?;
//!
//! let strategy = build_strategy(config.strategy)?;
//! let mut trainer = Trainer::new(strategy, &config.trainer);
//!
//! let device = trainer.device().clone();
//! let mut model = ManeuverClassifier::new(&config, &device)?;
//! let train = generate_trajectories(&config.dataset, config.dataset.num_train, config.seed, &device)?;
//! let val = generate_trajectories(&config.dataset, config.dataset.num_valid, config.seed + 1, &device)?;
//!
//! trainer.fit(&mut model, train, Some(val), false)?;
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod module;
pub mod optim;
pub mod scheduler;
pub mod setup;
pub mod strategy;
pub mod trainer;

pub use callbacks::{Callback, EarlyStopping};
pub use config::ManeuverConfig;
pub use data::{Batch, DataLoader};
pub use error::{ManeuverError, Result};
pub use model::ManeuverClassifier;
pub use module::{StepOutput, TrainingModule};
pub use trainer::{EngineState, Trainer};
