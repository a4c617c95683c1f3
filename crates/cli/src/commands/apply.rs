//! `apply`: filters a cache trace down to the addresses a checkpoint log
//! never removed, producing the reduced sample cache trace.

use blkfeature_checkpoint::CheckpointLog;
use blkfeature_core::Result;
use blkfeature_trace::filter_removed_addrs;
use std::collections::HashSet;
use std::path::PathBuf;

pub fn run(log: PathBuf, cache_trace: PathBuf, out_sample_cache_trace: PathBuf) -> Result<()> {
    let removed: HashSet<u64> = CheckpointLog::load(&log)?.into_iter().map(|row| row.addr).collect();
    tracing::info!(removed = removed.len(), "applying checkpoint log");
    filter_removed_addrs(&cache_trace, &out_sample_cache_trace, &removed)?;
    tracing::info!(out = %out_sample_cache_trace.display(), "sample cache trace written");
    Ok(())
}
