use blkfeature_feature::ErrorMetric;
use blkfeature_trace::DEFAULT_CACHE_BLOCK_SIZE_BYTE;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blkfeature")]
#[command(about = "Feature-accuracy optimizer for block-storage trace samples", long_about = None)]
pub struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a BAFM snapshot from a cache trace or a block-storage trace
    BuildBafm(BuildBafmArgs),

    /// Greedily remove addresses from a BAFM to approach a target sampling rate
    Optimize {
        /// BAFM snapshot to optimize
        #[arg(long, value_name = "PATH")]
        bafm: PathBuf,

        /// WorkloadStats JSON of the full (unsampled) reference trace
        #[arg(long, value_name = "PATH")]
        full_stats: PathBuf,

        /// Checkpoint log to append to; resumed from if it already exists
        #[arg(long, value_name = "PATH")]
        log: PathBuf,

        /// Error reduction driving the greedy search
        #[arg(long, default_value = "mean")]
        metric: ErrorMetric,

        /// Stop once the sampling rate falls to or below this fraction of the starting BAFM
        #[arg(long, default_value_t = 0.0)]
        target_rate: f64,

        /// Address bits to ignore, grouping addresses into 2^bits-wide removal regions
        #[arg(long, default_value_t = 0)]
        bits: u32,

        /// Stop after removing this many addresses, regardless of target-rate
        #[arg(long, value_name = "N")]
        max_removals: Option<usize>,

        /// Cache block size in bytes
        #[arg(long, default_value_t = DEFAULT_CACHE_BLOCK_SIZE_BYTE)]
        cache_block_size_byte: u64,

        /// Minimum seconds between progress log lines
        #[arg(long, default_value_t = 5)]
        progress_interval_secs: u64,
    },

    /// Apply a checkpoint log to a cache trace, producing the reduced sample
    Apply {
        /// Checkpoint log naming the addresses to remove
        #[arg(long, value_name = "PATH")]
        log: PathBuf,

        /// Cache trace to filter
        #[arg(long, value_name = "PATH")]
        cache_trace: PathBuf,

        /// Where to write the filtered sample cache trace
        #[arg(long, value_name = "PATH")]
        out_sample_cache_trace: PathBuf,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("input").required(true).args(["cache_trace", "block_trace"])))]
pub struct BuildBafmArgs {
    /// Pre-flattened cache trace to build the map from
    #[arg(long, value_name = "PATH")]
    pub cache_trace: Option<PathBuf>,

    /// Block-storage trace to expand into a cache trace before building the map
    #[arg(long, value_name = "PATH")]
    pub block_trace: Option<PathBuf>,

    /// Where to write the BAFM snapshot
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Cache block size in bytes, used only when expanding a block trace
    #[arg(long, default_value_t = DEFAULT_CACHE_BLOCK_SIZE_BYTE)]
    pub cache_block_size_byte: u64,
}
