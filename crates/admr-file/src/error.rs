//! Error types for the file layer

use thiserror::Error;

/// Errors raised while reading or writing BW64 files.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a RIFF/BW64/RF64 WAV file
    #[error("bad WAV file: {0}")]
    BadFormat(String),

    /// Missing or malformed chunk
    #[error("bad {chunk} chunk: {message}")]
    BadChunk {
        chunk: &'static str,
        message: String,
    },

    /// Unsupported sample encoding
    #[error("unsupported sample format: {0}")]
    UnsupportedEncoding(String),

    /// Malformed ADM document payload
    #[error("ADM parse error: {0}")]
    AdmParse(String),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;
