//! Error types for the model layer

use thiserror::Error;

/// Errors raised while building, validating or selecting from an ADM document.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Malformed document content
    #[error("ADM parse error: {0}")]
    Parse(String),

    /// Dangling, cyclic or ambiguous references
    #[error("ADM reference error: {0}")]
    Reference(String),

    /// Conflicting or ambiguous format references during pack allocation
    #[error("{message}{}", format_possible(.possible_errors))]
    FormatRef {
        message: String,
        possible_errors: Vec<String>,
    },

    /// Inconsistent rtime/duration information
    #[error("ADM timing error: {0}")]
    Timing(String),

    /// Structure violates the ADM rules
    #[error("ADM validation error: {0}")]
    Validation(String),
}

fn format_possible(possible: &[String]) -> String {
    if possible.is_empty() {
        String::new()
    } else {
        let mut out = String::from("; possible errors:");
        for e in possible {
            out.push_str("\n  - ");
            out.push_str(e);
        }
        out
    }
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
