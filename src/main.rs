//! disk-searcher - Parallel prefix search and copy
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use disk_searcher::config::{CliArgs, SearchConfig};
use disk_searcher::pipeline::SearchCoordinator;
use disk_searcher::progress::{elapsed_line, print_header, print_summary};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = SearchConfig::from_args(args).context("Invalid configuration")?;

    if !config.quiet {
        print_header(
            &config.prefix,
            &config.root,
            &config.destination,
            config.filter_count,
            config.sink_count,
        );
    }

    let coordinator = SearchCoordinator::new(config.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Run the search
    let result = coordinator.run().context("Search failed")?;

    if !config.quiet {
        print_summary(&result, &config.destination);
    }
    println!("{}", elapsed_line(result.duration));

    // Worker failures are logged, not reflected in the exit status
    if result.failed_workers > 0 {
        info!(failed = result.failed_workers, "Search completed with failed workers");
    }
    if !result.completed {
        info!("Search was interrupted before completion");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("disk_searcher=debug,warn")
    } else {
        EnvFilter::new("disk_searcher=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(verbose)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
