//! rustevent CLI - Command-line driver for event-backed histogram workspaces.
//!
//! Builds deterministic synthetic event workspaces and exercises lazy
//! rebinning and the histogram cache.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

mod synthetic;

use std::time::Instant;

use clap::{Parser, Subcommand};
use rustevent_core::{BinEdges, Histogram, SortOrder};
use rustevent_workspace::{CacheStats, EventWorkspace, MatrixWorkspace, WorkspaceConfig};
use serde::Serialize;
use thiserror::Error;

use crate::synthetic::SyntheticRun;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("Core error: {0}")]
    Core(#[from] rustevent_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Event-backed histogram workspace driver.
#[derive(Parser)]
#[command(name = "rustevent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bin a synthetic event workspace and print per-row totals
    Rebin {
        /// Number of spectra
        #[arg(long, default_value = "64")]
        rows: usize,

        /// Events per spectrum
        #[arg(long, default_value = "100000")]
        events: usize,

        /// Rebin parameters x0,dx,x1[,dx,x2...]; a negative dx gives logarithmic bins
        #[arg(
            long,
            value_delimiter = ',',
            allow_hyphen_values = true,
            default_value = "0,100,20000"
        )]
        params: Vec<f64>,

        /// Seed of the synthetic data
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Process spectra one after another
        #[arg(long)]
        serial: bool,
    },

    /// Time cold (cache miss) against warm (cache hit) reads of every spectrum
    Benchmark {
        /// Number of spectra
        #[arg(long, default_value = "256")]
        rows: usize,

        /// Events per spectrum
        #[arg(long, default_value = "50000")]
        events: usize,

        /// Rebin parameters x0,dx,x1[,dx,x2...]
        #[arg(
            long,
            value_delimiter = ',',
            allow_hyphen_values = true,
            default_value = "0,10,20000"
        )]
        params: Vec<f64>,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,

        /// Cache capacity (defaults to one entry per spectrum)
        #[arg(long)]
        mru_capacity: Option<usize>,
    },
}

/// Summary of one materialized row.
#[derive(Debug, Serialize, PartialEq)]
struct RowSummary {
    row: usize,
    events: usize,
    total: f64,
    error: f64,
    peak_bin: Option<usize>,
}

impl RowSummary {
    fn new(row: usize, events: usize, histogram: &Histogram) -> Self {
        let error = histogram.e().iter().map(|e| e * e).sum::<f64>().sqrt();
        let peak_bin = histogram
            .y()
            .iter()
            .enumerate()
            .filter(|&(_, &y)| y > 0.0)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(bin, _)| bin);
        Self {
            row,
            events,
            total: histogram.total(),
            error,
            peak_bin,
        }
    }
}

#[derive(Debug, Serialize)]
struct RebinReport {
    bins: usize,
    first_edge: f64,
    last_edge: f64,
    rows: Vec<RowSummary>,
    cache: CacheStats,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rebin {
            rows,
            events,
            params,
            seed,
            json,
            serial,
        } => {
            let edges = BinEdges::from_rebin_params(&params)?;
            let run = SyntheticRun {
                rows,
                events_per_row: events,
                seed,
                ..SyntheticRun::default()
            };
            let config = WorkspaceConfig::new()
                .try_with_mru_capacity(rows.max(1))?
                .with_parallel(!serial);

            let start = Instant::now();
            let mut workspace = run.build(config)?;
            log::info!(
                "generated {} events in {:.2?}",
                workspace.number_events(),
                start.elapsed()
            );

            workspace.set_all_x(edges.clone())?;
            let start = Instant::now();
            let report = rebin_report(&workspace, &edges)?;
            log::info!("materialized {} rows in {:.2?}", rows, start.elapsed());

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} bins over [{}, {})",
                    report.bins, report.first_edge, report.last_edge
                );
                println!(
                    "{:<6} | {:<10} | {:<14} | {:<12} | {:<8}",
                    "Row", "Events", "Total", "Error", "Peak bin"
                );
                println!("{:-<62}", "");
                for summary in &report.rows {
                    let peak = summary
                        .peak_bin
                        .map_or_else(|| "-".to_string(), |bin| bin.to_string());
                    println!(
                        "{:<6} | {:<10} | {:<14.3} | {:<12.3} | {:<8}",
                        summary.row, summary.events, summary.total, summary.error, peak
                    );
                }
            }
        }

        Commands::Benchmark {
            rows,
            events,
            params,
            iterations,
            mru_capacity,
        } => {
            if iterations == 0 {
                return Err(CliError::InvalidArgument(
                    "iterations must be at least 1".to_string(),
                ));
            }
            let edges = BinEdges::from_rebin_params(&params)?;
            let run = SyntheticRun {
                rows,
                events_per_row: events,
                ..SyntheticRun::default()
            };
            let config =
                WorkspaceConfig::new().try_with_mru_capacity(mru_capacity.unwrap_or(rows).max(1))?;
            let mut workspace = run.build(config)?;
            workspace.set_all_x(edges)?;

            println!(
                "Benchmarking {} rows x {} events, {} iterations",
                rows, events, iterations
            );

            let start = Instant::now();
            workspace.sort_all(SortOrder::Tof);
            println!("Initial sort: {:.2?}", start.elapsed());

            let mut cold = Vec::with_capacity(iterations);
            let mut warm = Vec::with_capacity(iterations);
            for _ in 0..iterations {
                workspace.clear_mru();
                cold.push(time_ms(|| workspace.materialize_all())?);
                warm.push(time_ms(|| workspace.materialize_all())?);
            }

            println!(
                "{:<6} | {:<15} | {:<15} | {:<15}",
                "Pass", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<58}", "");
            for (name, times) in [("Cold", &cold), ("Warm", &warm)] {
                let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let mean_time = times.iter().sum::<f64>() / times.len() as f64;
                println!(
                    "{:<6} | {:<15.3} | {:<15.3} | {:<15.3}",
                    name, mean_time, min_time, max_time
                );
            }

            let stats = workspace.cache_stats();
            println!(
                "Cache: {} hits, {} misses, {} evictions, {} invalidations ({:.1}% hit rate)",
                stats.hits,
                stats.misses,
                stats.evictions,
                stats.invalidations,
                stats.hit_rate() * 100.0
            );
        }
    }

    Ok(())
}

/// Materializes every row of `workspace` at its declared edges.
fn rebin_report(workspace: &EventWorkspace, edges: &BinEdges) -> Result<RebinReport> {
    let histograms = workspace.materialize_all()?;
    let rows = histograms
        .iter()
        .enumerate()
        .map(|(row, histogram)| {
            let events = workspace.event_list(row)?.number_events();
            Ok(RowSummary::new(row, events, histogram))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RebinReport {
        bins: edges.n_bins(),
        first_edge: edges.first(),
        last_edge: edges.last(),
        rows,
        cache: workspace.cache_stats(),
    })
}

fn time_ms<T, F>(f: F) -> Result<f64>
where
    F: FnOnce() -> rustevent_core::Result<T>,
{
    let start = Instant::now();
    f()?;
    Ok(start.elapsed().as_secs_f64() * 1000.0)
}
