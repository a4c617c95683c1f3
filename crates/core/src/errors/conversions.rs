//! Conversion implementations for error types

use super::types::Error;
use std::path::PathBuf;

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::InputFormat {
            kind: "json",
            path: PathBuf::new(),
            message: error.to_string(),
        }
    }
}
