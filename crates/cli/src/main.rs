mod cli;
mod commands;

use blkfeature_core::Error;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::BuildBafm(cli::BuildBafmArgs {
            cache_trace,
            block_trace,
            out,
            cache_block_size_byte,
        }) => commands::build_bafm::run(cache_trace, block_trace, out, cache_block_size_byte),
        Commands::Optimize {
            bafm,
            full_stats,
            log,
            metric,
            target_rate,
            bits,
            max_removals,
            cache_block_size_byte,
            progress_interval_secs,
        } => commands::optimize::run(commands::optimize::Args {
            bafm,
            full_stats,
            log,
            metric,
            target_rate,
            bits,
            max_removals,
            cache_block_size_byte,
            progress_interval_secs,
        }),
        Commands::Apply {
            log,
            cache_trace,
            out_sample_cache_trace,
        } => commands::apply::run(log, cache_trace, out_sample_cache_trace),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        tracing::error!("{err}");
        std::process::exit(err.exit_code());
    }
}
