//! Core error type definitions

use std::path::PathBuf;

/// Result type alias for blkfeature operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for blkfeature operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A trace or snapshot file could not be parsed in the expected format
    #[error("malformed {kind} at {path}: {message}")]
    InputFormat {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    /// A numeric field violated the bounds the format requires
    #[error("{field} out of range: {message}")]
    InputRange { field: &'static str, message: String },

    /// A BAFM entry was addressed that does not exist
    #[error("block address {addr} not found in feature map of size {map_size}")]
    NotFound { addr: u64, map_size: usize },

    /// An internal aggregate no longer matches its definition
    #[error("invariant violated: {message}")]
    Invariant { message: String },

    /// The checkpoint log exists but cannot be trusted for resume
    #[error("checkpoint log at {path} is corrupt: {message}")]
    ResumeCorrupt { path: PathBuf, message: String },

    /// Underlying I/O failure
    #[error("io error during {operation} on {path}: {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A 64-bit counter would have overflowed
    #[error("arithmetic overflow in {context}")]
    Overflow { context: &'static str },

    /// CLI-only: bad argument combination, not a data problem
    #[error("usage error: {message}")]
    Usage { message: String },
}

impl Error {
    /// Maps this error onto the process's exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InputFormat { .. } | Error::InputRange { .. } | Error::Usage { .. } => 2,
            Error::ResumeCorrupt { .. } => 3,
            Error::Overflow { .. } => 4,
            Error::NotFound { .. } | Error::Invariant { .. } | Error::Io { .. } => 1,
        }
    }
}
