//! Extension traits for error handling

use super::types::{Error, Result};
use std::path::Path;

/// Extension trait for attaching a path/operation to an I/O `Result`.
pub trait IoResultExt<T> {
    /// Wrap an `std::io::Error` with the path and operation that produced it.
    fn io_context(self, path: &Path, operation: &'static str) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn io_context(self, path: &Path, operation: &'static str) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            operation,
            source,
        })
    }
}
