//! Error types for maneuver-rs.
//!
//! # Example
//!
//! ```rust
//! use maneuver_rs::{ManeuverError, Result};
//!
//! fn check_frequency(freq: usize) -> Result<()> {
//!     if freq == 0 {
//!         return Err(ManeuverError::Config(
//!             "frequency must be positive".to_string(),
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_frequency(0).is_err());
//! assert!(check_frequency(1).is_ok());
//! ```

use thiserror::Error;

/// Result type alias for maneuver-rs operations.
pub type Result<T> = std::result::Result<T, ManeuverError>;

/// Errors that can occur in maneuver-rs.
///
/// Configuration and checkpoint errors are fatal and never retried: they
/// indicate a setup mistake or a mismatched checkpoint, not a transient
/// condition.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ManeuverError {
    /// Configuration error (unsupported optimizer/scheduler shape, multiple
    /// optimizers, unknown monitor key, unsupported strategy).
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Checkpoint error, including integrity failures on restore.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// Dataset error.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Checkpoint (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Progress bar template error.
    #[error("template error: {0}")]
    Template(String),
}

impl From<indicatif::style::TemplateError> for ManeuverError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        ManeuverError::Template(err.to_string())
    }
}
