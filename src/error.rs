//! Error types for rust_pade

use thiserror::Error;

/// Main error type for PADE operations
#[derive(Error, Debug)]
pub enum PadeError {
    #[error("Invalid measurement table: {reason}")]
    InvalidMeasurementTable { reason: String },

    #[error("Invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("Sample '{sample_id}' is in the measurement table but not in the schema")]
    SampleNotInSchema { sample_id: String },

    #[error("Unknown variables {unknown}. Valid variables are {known}.")]
    UnknownFactor { unknown: String, known: String },

    #[error("Unsupported layout: {reason}")]
    UnsupportedLayout { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("Invalid sample indexes: {reason}")]
    InvalidSampleIndexes { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for PADE operations
pub type Result<T> = std::result::Result<T, PadeError>;
