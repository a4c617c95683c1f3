//! Shared error types and numeric primitives for the `blkfeature` workspace.
//!
//! This crate establishes the foundational building blocks used throughout
//! the rest of the workspace: a single `Error`/`Result` pair covering every
//! abstract failure kind, and checked-arithmetic helpers over the 64-bit
//! counters every aggregate in this system is built from.

pub mod errors;
pub mod numeric;

pub use errors::{Error, IoResultExt, Result};
