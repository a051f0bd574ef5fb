//! NWP ingester command-line tool.
//!
//! Converts one parameter on one level type from a set of local GRIB1/GRIB2
//! files into a single Zarr (or NetCDF) dataset, or lists what the files
//! contain.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dataset_writer::OutputFormat;
use ingestion::{IngestConfig, Ingester, Selector};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Convert GRIB model output into analysis-ready datasets")]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, global = true, env = "NWP_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads for scanning and decoding (0 = one per CPU)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge one parameter on one level type into a dataset
    Convert {
        /// Parameter short name ("t") or code ("253.11", "0.0.0")
        #[arg(short, long)]
        param: String,

        /// Level type, e.g. height-above-ground, hybrid, other:1:1
        #[arg(short, long)]
        level_type: String,

        /// Destination; a ".nc" extension selects NetCDF
        #[arg(short, long)]
        output: PathBuf,

        /// Output format, overriding the destination extension
        #[arg(short, long, value_parser = parse_format)]
        format: Option<OutputFormat>,

        /// Replace an existing destination
        #[arg(long)]
        overwrite: bool,

        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// List the parameters and level types found in the inputs
    Inventory {
        /// Print JSON instead of one line per entry
        #[arg(long)]
        json: bool,

        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn parse_format(s: &str) -> std::result::Result<OutputFormat, String> {
    OutputFormat::from_name(s).ok_or_else(|| format!("unknown output format '{}'", s))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    let mut config = load_config(&args)?;

    match args.command {
        Command::Convert {
            param,
            level_type,
            output,
            format,
            overwrite,
            inputs,
        } => {
            if format.is_some() {
                config.format = format;
            }
            config.writer.overwrite |= overwrite;

            let selector = Selector::parse(&param, &level_type).context("Invalid query")?;
            let ingester = Ingester::new(config).context("Invalid configuration")?;
            let report = ingester
                .convert(&inputs, &selector, &output)
                .with_context(|| format!("Failed to convert {} into {}", selector, output.display()))?;

            info!(
                destination = %report.output.destination.display(),
                records = report.records_merged,
                diagnostics = report.diagnostics.len(),
                "Dataset written"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Inventory { json, inputs } => {
            let ingester = Ingester::new(config).context("Invalid configuration")?;
            let index = ingester.index(&inputs).context("Failed to index inputs")?;
            let summary = index.summary();

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for entry in &summary {
                    println!("{}", entry);
                }
                for diagnostic in index.diagnostics() {
                    println!("{}", diagnostic);
                }
            }
        }
    }

    Ok(())
}

/// Configuration file (if any), then environment, then command-line flags.
fn load_config(args: &Args) -> Result<IngestConfig> {
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => IngestConfig::default(),
    };
    config.apply_env();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}

/// Logs go to stderr; stdout carries the command's output.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
