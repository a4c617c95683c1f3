//! Error types and result extensions for blkfeature operations

mod conversions;
mod extensions;
mod types;

pub use extensions::IoResultExt;
pub use types::{Error, Result};
