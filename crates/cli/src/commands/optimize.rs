//! `optimize`: runs the greedy removal loop from a BAFM snapshot toward a
//! target sampling rate, resuming from an existing checkpoint log if one
//! is already present at `--log`.

use blkfeature_bafm::Bafm;
use blkfeature_checkpoint::{resume, CheckpointLog};
use blkfeature_core::Result;
use blkfeature_feature::{stats_from_bafm, ErrorMetric};
use blkfeature_optimize::{GreedyOptimizer, StepOutcome};
use blkfeature_trace::WorkloadStats;
use std::path::PathBuf;
use std::time::Instant;

pub struct Args {
    pub bafm: PathBuf,
    pub full_stats: PathBuf,
    pub log: PathBuf,
    pub metric: ErrorMetric,
    pub target_rate: f64,
    pub bits: u32,
    pub max_removals: Option<usize>,
    pub cache_block_size_byte: u64,
    pub progress_interval_secs: u64,
}

pub fn run(args: Args) -> Result<()> {
    let mut bafm = Bafm::load(&args.bafm)?;
    let initial_stats = stats_from_bafm(&bafm, args.cache_block_size_byte)?;
    let full_features = WorkloadStats::read_json(&args.full_stats)?.feature_dict();

    let (mut log, mut optimizer) = if args.log.exists() {
        let already_removed = CheckpointLog::load(&args.log)?.len() as u64;
        let (stats, log) = resume(
            &args.log,
            &mut bafm,
            initial_stats,
            &full_features,
            args.cache_block_size_byte,
        )?;
        tracing::info!(already_removed, path = %args.log.display(), "resumed checkpoint log");
        let optimizer = GreedyOptimizer::resume(
            bafm,
            stats,
            full_features,
            args.metric,
            args.bits,
            args.cache_block_size_byte,
            already_removed,
        );
        (log, optimizer)
    } else {
        let log = CheckpointLog::create(&args.log)?;
        let optimizer = GreedyOptimizer::new(
            bafm,
            initial_stats,
            full_features,
            args.metric,
            args.bits,
            args.cache_block_size_byte,
        );
        (log, optimizer)
    };

    let mut removed_total = 0usize;
    let mut last_progress = Instant::now();
    loop {
        if optimizer.rate() <= args.target_rate {
            tracing::info!(rate = optimizer.rate(), "target rate reached");
            break;
        }
        if let Some(max) = args.max_removals {
            if removed_total >= max {
                tracing::info!(removed_total, "max-removals reached");
                break;
            }
        }

        match optimizer.step(&mut log)? {
            StepOutcome::Removed { addresses } => {
                removed_total += addresses;
                if last_progress.elapsed().as_secs() >= args.progress_interval_secs {
                    tracing::info!(
                        removed_total,
                        rate = optimizer.rate(),
                        block_count = optimizer.block_count(),
                        "progress"
                    );
                    last_progress = Instant::now();
                }
            }
            StepOutcome::NoImprovingMove => {
                tracing::info!("no improving move remains");
                break;
            }
        }
    }

    tracing::info!(
        removed_total,
        rate = optimizer.rate(),
        block_count = optimizer.block_count(),
        "optimize finished"
    );
    Ok(())
}
