//! Error types for the safety agent.
//!
//! All errors are strongly typed using thiserror. Most of them never
//! reach the host: training failures degrade to rule-only mode and
//! inference failures degrade a single call. Only record parsing,
//! configuration and persistence surface errors to the caller.

use thiserror::Error;

use crate::profile::{ItemId, RestaurantId};

/// Malformed or missing required field in a user, item or restaurant record.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("Required field '{field}' is missing from {record} record")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("Budget range '{raw}' is malformed, expected 'min-max'")]
    MalformedBudget {
        raw: String,
    },

    #[error("Budget range [{min}, {max}] is inverted")]
    InvertedBudget {
        min: u32,
        max: u32,
    },

    #[error("Menu item {item} references unknown restaurant {restaurant}")]
    UnknownRestaurant {
        item: ItemId,
        restaurant: RestaurantId,
    },
}

/// The encoder could not turn a record triple into a feature vector.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Menu item belongs to restaurant {expected}, but restaurant {actual} was supplied")]
    RestaurantMismatch {
        expected: RestaurantId,
        actual: RestaurantId,
    },

    #[error("Feature schema has no columns")]
    EmptySchema,
}

/// Training could not produce a usable classifier.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingFailure {
    #[error("Training population is empty")]
    EmptyPopulation,

    #[error("Feature matrix has no columns")]
    EmptyFeatureMatrix,

    #[error("Only one label value present ({positives} unsafe of {total} examples)")]
    SingleLabel {
        positives: usize,
        total: usize,
    },

    #[error("Model fit diverged at epoch {epoch}: {reason}")]
    FitDiverged {
        epoch: usize,
        reason: String,
    },

    #[error("Encoding failed during training: {0}")]
    Encoding(#[from] EncodingError),
}

/// The classifier failed for a single `evaluate` call.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceFailure {
    #[error("Feature vector has {actual} values, model expects {expected}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("Classifier produced a non-finite probability")]
    NonFiniteOutput,

    #[error("Classifier probability {value} is outside [0.0, 1.0]")]
    ProbabilityOutOfRange {
        value: f64,
    },

    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

/// Training was cancelled before it published a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Training was cancelled")]
pub struct TrainingCancelled;

/// A background training run could not be joined.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackgroundError {
    #[error("Background training did not finish within {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
    },

    #[error("Background training worker exited without a report")]
    WorkerLost,
}

/// Invalid agent configuration.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Threshold '{name}' = {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        name: &'static str,
        value: f64,
    },

    #[error("Threshold ordering violated: {reason}")]
    ThresholdOrder {
        reason: String,
    },

    #[error("Training parameter '{name}' is invalid: {reason}")]
    InvalidTrainingParameter {
        name: &'static str,
        reason: String,
    },

    #[error("Invalid seafood keyword '{keyword}': {reason}")]
    InvalidKeyword {
        keyword: String,
        reason: String,
    },

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while saving or loading a fitted classifier.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model state is corrupted: {reason}")]
    Corrupted {
        reason: String,
    },

    #[error("Unsupported state version {found} (expected {expected})")]
    UnsupportedVersion {
        found: u8,
        expected: u8,
    },

    #[error("Schema fingerprint mismatch: stored {stored}, computed {computed}")]
    FingerprintMismatch {
        stored: String,
        computed: String,
    },

    #[error("Classifier '{name}' cannot be exported")]
    NotExportable {
        name: String,
    },
}

/// Top-level error type for the crate.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl SafetyError {
    /// Returns true if this is a record data error.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for fallible crate operations.
pub type SafetyResult<T> = Result<T, SafetyError>;
