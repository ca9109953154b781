//! Run header and summary output

use crate::pipeline::SearchResult;
use console::style;
use humansize::{format_size, BINARY};
use std::path::Path;
use std::time::Duration;

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// The elapsed-time line printed at the end of every run
pub fn elapsed_line(duration: Duration) -> String {
    format!("Total running time of the program is: {}", duration.as_millis())
}

/// Print a header at the start of the run
pub fn print_header(prefix: &str, root: &Path, destination: &Path, filters: usize, sinks: usize) {
    println!();
    println!(
        "{} {}",
        style("disk-searcher").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Prefix:").bold(), prefix);
    println!("  {} {}", style("Root:").bold(), root.display());
    println!("  {} {}", style("Destination:").bold(), destination.display());
    println!("  {} {} filter, {} sink", style("Workers:").bold(), filters, sinks);
    println!();
}

/// Print a summary of the run results
pub fn print_summary(result: &SearchResult, destination: &Path) {
    println!();
    if result.completed {
        println!("{}", style("Search Complete").green().bold());
    } else {
        println!("{}", style("Search Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(result.dirs_scouted)
    );
    println!(
        "  {} {}",
        style("Matched:").bold(),
        format_number(result.files_matched)
    );
    println!(
        "  {} {} ({})",
        style("Copied:").bold(),
        format_number(result.files_copied),
        format_size(result.bytes_copied, BINARY)
    );
    if result.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(result.skipped)
        );
    }
    if result.failed_workers > 0 {
        println!(
            "  {} {}",
            style("Failed workers:").red().bold(),
            result.failed_workers
        );
    }
    println!("  {} {}", style("Destination:").bold(), destination.display());
    println!();
}
