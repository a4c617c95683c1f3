//! Incremental feature-delta calculus and error-model scoring.

pub mod aggregate;
pub mod delta;
pub mod error_model;

pub use aggregate::stats_from_bafm;
pub use delta::apply_removal;
pub use error_model::{error_dict, ErrorDict, ErrorMetric};
