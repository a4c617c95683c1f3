//! Block access feature map: per-address counts, IAT sums, and
//! misalignment byte totals split by positional class and read/write.

pub mod entry;
pub mod map;

pub use entry::{BafmEntry, ClassCounters};
pub use map::Bafm;
