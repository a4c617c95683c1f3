//! The greedy, feature-error-minimizing block removal optimizer.
//!
//! Given a seeded spatial sample's [`Bafm`](blkfeature_bafm::Bafm) and the
//! full trace's reference features, [`GreedyOptimizer`] repeatedly removes
//! the address (or `--bits`-wide address region) whose removal most
//! reduces the chosen error metric, until a target sampling rate is
//! reached or no improving move exists.

pub mod candidate;
pub mod optimizer;

pub use candidate::{simulate_region_removal, RegionPlan};
pub use optimizer::{GreedyOptimizer, StepOutcome};
