//! Error types for Hebb operations.
//!
//! Most numeric faults never reach this module: out-of-range strengths are
//! clamped, non-finite results are reset to defaults, and unknown keys read
//! as defaults. What remains are store failures, rejected configuration and
//! malformed caller input.

use thiserror::Error;

/// Result type for Hebb operations.
pub type Result<T> = std::result::Result<T, HebbError>;

/// Errors that can occur during Hebb operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HebbError {
    /// Caller supplied malformed input (NaN reading, value outside [0,1], ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The record store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A configuration change was rejected.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot or record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors (wrapped).
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for HebbError {
    fn from(e: std::io::Error) -> Self {
        HebbError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for HebbError {
    fn from(e: serde_json::Error) -> Self {
        HebbError::Serialization(e.to_string())
    }
}

/// Failures reported by an [`AssociationStore`](crate::store::AssociationStore).
///
/// "Not found" is never one of these; a missing record is `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the operation.
    #[error("backend failure: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("record codec failure: {0}")]
    Codec(String),
}

/// Configuration errors. The prior configuration is always retained.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Component is not one of vocab, dimensions, sequences, performance, safety.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Parameter is not recognized for the component.
    #[error("unknown parameter {component}.{parameter}")]
    UnknownParameter { component: String, parameter: String },

    /// Value outside the permitted range.
    #[error("{field} out of range: {value} (must be {min}-{max})")]
    OutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    /// Integer parameter given a fractional value.
    #[error("{field} must be an integer, got {value}")]
    NotAnInteger { field: String, value: f64 },

    /// A manual strength override pins a value outside [0,1].
    #[error("invalid override for {term}/{context}: {value}")]
    InvalidOverride {
        term: String,
        context: String,
        value: f64,
    },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

// Convenience constructors
impl HebbError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        HebbError::InvalidInput(msg.into())
    }

    pub fn out_of_range(field: impl Into<String>, min: f64, max: f64, value: f64) -> Self {
        HebbError::Config(ConfigError::OutOfRange {
            field: field.into(),
            min,
            max,
            value,
        })
    }
}
