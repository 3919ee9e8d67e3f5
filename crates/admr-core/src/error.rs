//! Error types shared by the core layer

use thiserror::Error;

/// Errors raised while building or checking layouts and core data.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Unknown BS.2051 layout name
    #[error("unknown layout name '{0}'")]
    UnknownLayout(String),

    /// Speaker position outside the allowed BS.2051 range
    #[error("{channel}: {coordinate} {value} out of range ({min}, {max})")]
    PositionOutOfRange {
        channel: String,
        coordinate: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Problem in a speakers file
    #[error("speakers file: {0}")]
    SpeakersFile(String),

    /// A value failed range validation
    #[error("value {value} out of range ({min}, {max})")]
    ValueOutOfRange { value: f64, min: f64, max: f64 },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
