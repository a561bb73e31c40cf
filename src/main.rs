//! CLI entry point for the TLC demand pipeline.
//!
//! Provides subcommands for running the demand-aggregation pipeline over a
//! trip dataset and for inspecting a zone lookup table.

use anyhow::{bail, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tlc_demand::bucketer::Granularity;
use tlc_demand::pipeline::{run, CancelFlag, PipelineConfig, RunOutcome};
use tlc_demand::source::SourceFormat;
use tlc_demand::zones::ZoneRegistry;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "tlc_demand")]
#[command(about = "A tool to aggregate TLC trip records into demand tensors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demand pipeline over a trip dataset
    Run {
        /// Path to the trip dataset (.parquet, .csv, or .csv.gz)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// IANA timezone used for time bucketing
        #[arg(short, long, default_value = "America/New_York")]
        timezone: String,

        /// Bucket width in minutes; must divide a day evenly
        #[arg(short, long, default_value_t = 60)]
        granularity: u32,

        /// Zone lookup CSV; filters unknown zones and fixes the zone axis
        #[arg(short, long)]
        zones: Option<PathBuf>,

        /// Explicit source format (parquet, csv, csv.gz) instead of the
        /// file extension
        #[arg(short, long)]
        format: Option<SourceFormat>,

        /// Output artifact path
        #[arg(short, long, default_value = "demand_tensor.json")]
        output: PathBuf,

        /// Keep a partially written artifact when the run fails
        #[arg(long, default_value_t = false)]
        keep_partial: bool,
    },
    /// List the zones in a lookup CSV
    Zones {
        /// Path to the zone lookup CSV
        #[arg(value_name = "LOOKUP_CSV")]
        lookup: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/tlc_demand.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("tlc_demand.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            timezone,
            granularity,
            zones,
            format,
            output,
            keep_partial,
        } => {
            let timezone: Tz = match timezone.parse() {
                Ok(tz) => tz,
                Err(e) => bail!("invalid timezone {timezone}: {e}"),
            };
            let Some(granularity) = Granularity::from_minutes(granularity) else {
                bail!("granularity must be 1-1440 minutes and divide a day evenly");
            };

            let registry = match zones {
                Some(path) => {
                    let registry = ZoneRegistry::load(&path)?;
                    info!(zones = registry.len(), path = %path.display(), "Zone registry loaded");
                    Some(registry)
                }
                None => None,
            };

            let config = PipelineConfig {
                input,
                format,
                timezone,
                granularity,
                output,
                keep_partial,
            };

            let cancel = CancelFlag::new();
            let signal_flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping at the next batch boundary");
                    signal_flag.cancel();
                }
            });

            let outcome =
                tokio::task::spawn_blocking(move || run(&config, registry.as_ref(), &cancel))
                    .await??;

            match outcome {
                RunOutcome::Completed(summary) => {
                    info!(
                        artifact = %summary.artifact_path.display(),
                        processed = summary.diagnostics.processed_count(),
                        skipped = summary.diagnostics.skipped_count,
                        zones = summary.zone_count,
                        buckets = summary.bucket_count,
                        "Demand tensor written"
                    );
                }
                RunOutcome::Cancelled {
                    records_seen,
                    batches_seen,
                } => {
                    warn!(records_seen, batches_seen, "Run cancelled, no artifact written");
                }
            }
        }
        Commands::Zones { lookup } => {
            let registry = ZoneRegistry::load(&lookup)?;

            for zone in registry.iter() {
                info!(
                    id = zone.id,
                    borough = %zone.borough,
                    zone = %zone.name,
                    service_zone = %zone.service_zone,
                    "Zone"
                );
            }

            let mut by_borough: HashMap<&str, usize> = HashMap::new();
            for zone in registry.iter() {
                *by_borough.entry(zone.borough.as_str()).or_default() += 1;
            }
            let mut boroughs: Vec<_> = by_borough.into_iter().collect();
            boroughs.sort();
            for (borough, count) in boroughs {
                info!(borough, count, "Borough");
            }

            info!(total = registry.len(), "Zone registry summary");
        }
    }

    Ok(())
}
