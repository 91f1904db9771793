//! Display utilities for the ferrosplice CLI

use crate::json_output::ProbeResultJson;
use console::style;
use ferrosplice_types::TransferStats;
use std::path::PathBuf;
use std::time::Duration;

/// What a finished `send` did
#[derive(Debug)]
pub struct SendSummary {
    /// File that was sent
    pub file: PathBuf,
    /// Remote address
    pub destination: String,
    /// Bytes delivered
    pub bytes: u64,
    /// Whether the splice path carried the bytes
    pub spliced: bool,
    /// Unused part of the byte limit, if one was given
    pub remaining: Option<i64>,
    /// Wall-clock duration of the transfer
    pub elapsed: Duration,
}

impl SendSummary {
    /// Throughput in MB/s
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }
}

/// Print the result of a `send`
pub fn print_send_summary(summary: &SendSummary) {
    println!();
    println!(
        "{} Sent {} to {}",
        style("✓").green().bold(),
        style(summary.file.display()).cyan(),
        style(&summary.destination).cyan()
    );
    println!("  Bytes: {}", style(format_bytes(summary.bytes)).green());
    println!(
        "  Path: {}",
        if summary.spliced {
            style("splice").green()
        } else {
            style("buffered copy").yellow()
        }
    );
    println!("  Duration: {:.2?}", summary.elapsed);
    println!(
        "  Throughput: {} MB/s",
        style(format!("{:.1}", summary.throughput_mbps())).green()
    );
    if let Some(remaining) = summary.remaining {
        println!("  Unused limit: {}", style(remaining).dim());
    }
}

/// Print accumulated engine statistics
pub fn print_transfer_stats(stats: &TransferStats) {
    println!();
    println!(
        "{} {}",
        style("📊").blue().bold(),
        style("Transfer Statistics").bold().underlined()
    );
    println!("  Transfers: {}", style(stats.attempts).cyan());
    println!(
        "  Spliced: {} ({:.1}%)",
        style(stats.spliced).green(),
        stats.splice_rate() * 100.0
    );
    println!("  Declined: {}", style(stats.declined).yellow());
    println!("  Buffered fallbacks: {}", style(stats.fallbacks).yellow());
    if stats.errors > 0 {
        println!("  Errors: {}", style(stats.errors).red().bold());
    }
    println!(
        "  Bytes: {} spliced, {} buffered",
        style(format_bytes(stats.bytes_spliced)).green(),
        style(format_bytes(stats.bytes_fallback)).yellow()
    );
    println!("  Zero-copy share: {:.1}%", stats.efficiency() * 100.0);
}

/// Print a relay pipe probe
pub fn print_probe(probe: &ProbeResultJson) {
    println!(
        "{} {}",
        style("🔍").blue().bold(),
        style("Relay Pipe Probe").bold().underlined()
    );
    match probe.pipe_capacity {
        Some(capacity) => {
            println!("  Pipe capacity: {}", style(format_bytes(capacity as u64)).cyan());
        }
        None => println!("  Pipe capacity: {}", style("unavailable").yellow()),
    }
    if let Some(requested) = probe.requested_pipe_size {
        println!("  Requested pipe size: {}", format_bytes(requested as u64));
    }
    println!("  Chunk ceiling: {}", style(format_bytes(probe.max_chunk as u64)).cyan());

    match &probe.error {
        Some(e) => println!("  {} {}", style("✗").red().bold(), style(e).red()),
        None if probe.splice_available => {
            println!("  {} Chunk ceiling fits the relay pipe", style("✓").green().bold());
        }
        None => println!(
            "  {} Splice unavailable, transfers use the buffered copy",
            style("ℹ").yellow()
        ),
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
