//! `build-bafm`: streams a cache trace (or a block trace expanded into
//! one) into a BAFM snapshot.

use blkfeature_bafm::Bafm;
use blkfeature_core::{Error, Result};
use blkfeature_trace::cache_trace_from_block_trace;
use std::path::{Path, PathBuf};

pub fn run(
    cache_trace: Option<PathBuf>,
    block_trace: Option<PathBuf>,
    out: PathBuf,
    cache_block_size_byte: u64,
) -> Result<()> {
    // Holds the block-trace-expansion case's temporary cache trace alive
    // for the duration of this call; the file is removed when this drops.
    let tmp_guard;
    let cache_trace_path: &Path = match (&cache_trace, &block_trace) {
        (Some(path), None) => path,
        (None, Some(block_trace_path)) => {
            let tmp = tempfile::NamedTempFile::new().map_err(|source| Error::Io {
                path: PathBuf::from("<tempfile>"),
                operation: "create temporary cache trace",
                source,
            })?;
            tracing::debug!(block_trace = %block_trace_path.display(), "expanding block trace into cache trace");
            cache_trace_from_block_trace(block_trace_path, tmp.path(), cache_block_size_byte)?;
            tmp_guard = tmp;
            tmp_guard.path()
        }
        (Some(_), Some(_)) | (None, None) => {
            return Err(Error::Usage {
                message: "exactly one of --cache-trace or --block-trace is required".to_string(),
            })
        }
    };

    tracing::info!(cache_trace = %cache_trace_path.display(), "building bafm");
    let bafm = Bafm::build_from_cache_trace(cache_trace_path)?;
    bafm.write(&out)?;
    tracing::info!(addrs = bafm.len(), out = %out.display(), "bafm written");
    Ok(())
}
