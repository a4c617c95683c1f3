//! The greedy removal loop: scan every candidate region, apply the one
//! that improves the error score the most, log it, repeat.

use crate::candidate::{group_into_regions, simulate_region_removal, RegionPlan};
use blkfeature_bafm::Bafm;
use blkfeature_checkpoint::{CheckpointLog, CheckpointRow};
use blkfeature_core::Result;
use blkfeature_feature::{apply_removal, error_dict, ErrorMetric};
use blkfeature_trace::{WorkloadFeatures, WorkloadStats};
use std::time::Instant;

/// What happened in one call to [`GreedyOptimizer::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A region was removed; the address count tells the caller how many
    /// individual addresses (and log rows) that step produced.
    Removed { addresses: usize },
    /// No candidate strictly improved the current score: a local optimum.
    NoImprovingMove,
}

/// Iteratively removes addresses from its `Bafm` to drive the chosen
/// error metric toward zero, appending one [`CheckpointRow`] per address
/// removed to `log`.
///
/// Owns its `Bafm` rather than borrowing it: a parallel candidate scan
/// needs every reducer to see an immutable snapshot of the map for that
/// iteration, and a `&mut Bafm` field could never be shared across
/// `rayon`'s worker threads even read-only. Ownership keeps every field
/// `Sync`, so [`GreedyOptimizer::scan`] can fan out under the `parallel`
/// feature with no further synchronization.
pub struct GreedyOptimizer {
    bafm: Bafm,
    stats: WorkloadStats,
    full_features: WorkloadFeatures,
    metric: ErrorMetric,
    bits: u32,
    block_size_byte: u64,
    /// Address count the run started from; `target_rate` is expressed as
    /// a fraction of this, since there is no separate "full, unsampled
    /// trace" unique-block count available to divide by instead.
    initial_block_count: u64,
}

impl GreedyOptimizer {
    pub fn new(
        bafm: Bafm,
        stats: WorkloadStats,
        full_features: WorkloadFeatures,
        metric: ErrorMetric,
        bits: u32,
        block_size_byte: u64,
    ) -> Self {
        let initial_block_count = bafm.len() as u64;
        Self {
            bafm,
            stats,
            full_features,
            metric,
            bits,
            block_size_byte,
            initial_block_count,
        }
    }

    /// Like [`Self::new`], but for a `bafm` that has already had
    /// `already_removed` addresses taken out of it by a prior run (via
    /// [`blkfeature_checkpoint::resume`]). `rate()` stays a fraction of
    /// the address count the run originally started from, not of
    /// whatever is left after resuming.
    pub fn resume(
        bafm: Bafm,
        stats: WorkloadStats,
        full_features: WorkloadFeatures,
        metric: ErrorMetric,
        bits: u32,
        block_size_byte: u64,
        already_removed: u64,
    ) -> Self {
        let initial_block_count = bafm.len() as u64 + already_removed;
        Self {
            bafm,
            stats,
            full_features,
            metric,
            bits,
            block_size_byte,
            initial_block_count,
        }
    }

    pub fn stats(&self) -> &WorkloadStats {
        &self.stats
    }

    pub fn bafm(&self) -> &Bafm {
        &self.bafm
    }

    pub fn into_bafm(self) -> Bafm {
        self.bafm
    }

    pub fn block_count(&self) -> u64 {
        self.bafm.len() as u64
    }

    /// Fraction of the optimizer's starting address count still sampled.
    pub fn rate(&self) -> f64 {
        if self.initial_block_count == 0 {
            0.0
        } else {
            self.block_count() as f64 / self.initial_block_count as f64
        }
    }

    fn current_score(&self) -> f64 {
        error_dict(&self.full_features, &self.stats.feature_dict()).score(self.metric)
    }

    /// Scans every candidate (one address per region, or several under
    /// `--bits`), returning the first-in-iteration-order region whose
    /// removal strictly minimizes the score, with the stats that removal
    /// would produce. `None` if nothing strictly improves on the current
    /// score.
    fn scan(&self) -> Result<Option<(RegionPlan, WorkloadStats, f64)>> {
        let regions = group_into_regions(&self.bafm, self.bits);
        let current_score = self.current_score();
        let scored = self.score_regions(regions);

        let mut best: Option<(RegionPlan, WorkloadStats, f64)> = None;
        for candidate in scored {
            let (region, new_stats, score) = candidate?;
            if score < current_score {
                let is_better = match &best {
                    None => true,
                    Some((_, _, best_score)) => score < *best_score,
                };
                if is_better {
                    best = Some((region, new_stats, score));
                }
            }
        }
        Ok(best)
    }

    fn score_region(&self, region: RegionPlan) -> Result<(RegionPlan, WorkloadStats, f64)> {
        let new_stats =
            simulate_region_removal(&self.bafm, &self.stats, self.block_size_byte, &region.addrs)?;
        let score = error_dict(&self.full_features, &new_stats.feature_dict()).score(self.metric);
        Ok((region, new_stats, score))
    }

    /// Scores every region. Serial by default; under the `parallel`
    /// feature this read-only scan fans out across `rayon`'s worker pool,
    /// since every scorer only reads `self`'s immutable snapshot of
    /// `Bafm`/`WorkloadStats` for this iteration; the winner is still
    /// applied single-threaded in [`Self::step`].
    #[cfg(not(feature = "parallel"))]
    fn score_regions(&self, regions: Vec<RegionPlan>) -> Vec<Result<(RegionPlan, WorkloadStats, f64)>> {
        regions.into_iter().map(|region| self.score_region(region)).collect()
    }

    #[cfg(feature = "parallel")]
    fn score_regions(&self, regions: Vec<RegionPlan>) -> Vec<Result<(RegionPlan, WorkloadStats, f64)>> {
        use rayon::prelude::*;
        regions.into_par_iter().map(|region| self.score_region(region)).collect()
    }

    /// Runs one greedy step: scans every candidate, applies the winner
    /// (if any) to the real `Bafm`, and appends one log row per address
    /// the winning region actually removed. Addresses within a region
    /// are applied, scored, and logged one at a time in ascending order,
    /// so `log`'s per-row granularity stays a single address even when
    /// `--bits > 0` groups several addresses into one greedy decision —
    /// this is what lets [`blkfeature_checkpoint::resume`] replay the log
    /// address-by-address regardless of `bits`.
    pub fn step(&mut self, log: &mut CheckpointLog) -> Result<StepOutcome> {
        let Some((region, _, _)) = self.scan()? else {
            return Ok(StepOutcome::NoImprovingMove);
        };

        let started = Instant::now();
        for addr in &region.addrs {
            let entry = *self.bafm.get(*addr).expect("scanned region address must still exist");
            self.stats = apply_removal(&self.stats, &entry, self.block_size_byte)?;
            self.bafm.remove(*addr)?;

            let error = error_dict(&self.full_features, &self.stats.feature_dict());
            log.append(CheckpointRow {
                addr: *addr,
                error,
                block_count: self.block_count(),
                rate: self.rate(),
                runtime_ns: started.elapsed().as_nanos() as u64,
            })?;
        }

        Ok(StepOutcome::Removed {
            addresses: region.addrs.len(),
        })
    }

    /// Runs greedy steps until the sampling rate reaches `target_rate`,
    /// no improving move exists, or `should_stop` returns `true` between
    /// iterations. Returns the number of addresses removed.
    pub fn run_to_target_rate(
        &mut self,
        log: &mut CheckpointLog,
        target_rate: f64,
        mut should_stop: impl FnMut() -> bool,
    ) -> Result<usize> {
        let mut removed = 0usize;
        while self.rate() > target_rate {
            if should_stop() {
                break;
            }
            match self.step(log)? {
                StepOutcome::Removed { addresses } => removed += addresses,
                StepOutcome::NoImprovingMove => break,
            }
        }
        Ok(removed)
    }

    /// Runs greedy steps until `n` addresses have been removed, no
    /// improving move exists, or `should_stop` returns `true`. A strict
    /// generalization of `run_to_target_rate`'s loop body: useful when
    /// the caller wants a fixed removal budget rather than a rate.
    pub fn run_n(
        &mut self,
        log: &mut CheckpointLog,
        n: usize,
        mut should_stop: impl FnMut() -> bool,
    ) -> Result<usize> {
        let mut removed = 0usize;
        while removed < n {
            if should_stop() {
                break;
            }
            match self.step(log)? {
                StepOutcome::Removed { addresses } => removed += addresses,
                StepOutcome::NoImprovingMove => break,
            }
        }
        Ok(removed)
    }
}
