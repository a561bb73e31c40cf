//! Pipeline orchestration: source → aggregator → tensor builder → artifact.
//!
//! The orchestrator owns stage sequencing, per-stage progress logging,
//! cancellation, and partial-output cleanup. Stage errors pass through
//! unchanged; the only error handled locally is the aggregator's
//! per-record skip policy, which is diagnostics rather than an error.

use crate::aggregator::{DemandAggregator, Diagnostics};
use crate::bucketer::Granularity;
use crate::error::PipelineError;
use crate::output::write_artifact;
use crate::source::{open_source, SourceFormat};
use crate::tensor::build;
use crate::zones::ZoneRegistry;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Cooperative cancellation handle, observed at batch boundaries. Clones
/// share one flag, so a signal handler on another thread can stop a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Parameters for one pipeline run. Runs share no state; any number may
/// execute concurrently on different inputs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    /// Explicit source format; `None` selects by file extension.
    pub format: Option<SourceFormat>,
    pub timezone: Tz,
    pub granularity: Granularity,
    pub output: PathBuf,
    /// Keep a partially written artifact when a run fails. Default off:
    /// failed runs leave no output behind.
    pub keep_partial: bool,
}

/// How many records a completed run saw, and the resulting tensor shape.
#[derive(Debug)]
pub struct RunSummary {
    pub diagnostics: Diagnostics,
    pub zone_count: usize,
    pub bucket_count: usize,
    pub artifact_path: PathBuf,
}

/// Terminal state of a run. Cancellation is not an error, but it is also
/// not success: a cancelled run writes no artifact, so a truncated tensor
/// can never be mistaken for a complete one.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled {
        records_seen: u64,
        batches_seen: u64,
    },
}

/// Executes the full pipeline once.
///
/// `registry`, when present, supplies both the valid-zone filter and the
/// zone axis; otherwise the axis is the observed zones, ascending. The
/// bucket axis is always the observed buckets in chronological order.
#[tracing::instrument(skip_all, fields(input = %config.input.display()))]
pub fn run(
    config: &PipelineConfig,
    registry: Option<&ZoneRegistry>,
    cancel: &CancelFlag,
) -> Result<RunOutcome, PipelineError> {
    info!(stage = "source", "Opening record source");
    let mut source = open_source(&config.input, config.format)?;

    let valid_zones = registry.map(|r| r.valid_set());
    let mut aggregator = DemandAggregator::new(
        config.timezone,
        config.granularity,
        valid_zones.as_ref(),
    );

    let mut batches_seen = 0u64;
    loop {
        if cancel.is_cancelled() {
            let records_seen = aggregator.diagnostics().total_count;
            warn!(
                stage = "aggregate",
                records_seen, batches_seen, "Cancellation observed, discarding partial aggregate"
            );
            // Dropping the source here releases its file handle; the
            // partial aggregate is dropped with the aggregator.
            return Ok(RunOutcome::Cancelled {
                records_seen,
                batches_seen,
            });
        }

        match source.next_batch() {
            Ok(Some(batch)) => {
                batches_seen += 1;
                aggregator.consume_batch(&batch);
            }
            Ok(None) => break,
            Err(e) => {
                let diagnostics = aggregator.diagnostics();
                warn!(
                    stage = "aggregate",
                    processed = diagnostics.processed_count(),
                    total = diagnostics.total_count,
                    batches = batches_seen,
                    "Source failed mid-stream"
                );
                return Err(e);
            }
        }
    }

    let (aggregate, diagnostics) = aggregator.finish();
    info!(
        stage = "aggregate",
        total = diagnostics.total_count,
        skipped = diagnostics.skipped_count,
        batches = batches_seen,
        "Aggregation complete"
    );

    let zone_order = match registry {
        Some(r) => r.ordered_ids(),
        None => aggregate.zones(),
    };
    let bucket_order = aggregate.buckets();

    info!(
        stage = "tensor",
        zones = zone_order.len(),
        buckets = bucket_order.len(),
        "Building demand tensor"
    );
    let (tensor, distribution) = build(aggregate, zone_order, bucket_order)?;

    info!(stage = "output", path = %config.output.display(), "Writing artifact");
    if let Err(e) = write_artifact(
        &config.output,
        &tensor,
        &distribution,
        config.timezone.name(),
        config.granularity,
    ) {
        if !config.keep_partial && config.output.exists() {
            if let Err(cleanup) = std::fs::remove_file(&config.output) {
                warn!(path = %config.output.display(), error = %cleanup, "Failed to remove partial artifact");
            }
        }
        return Err(e);
    }

    let summary = RunSummary {
        diagnostics,
        zone_count: tensor.zones().len(),
        bucket_count: tensor.buckets().len(),
        artifact_path: config.output.clone(),
    };
    info!(
        stage = "output",
        processed = summary.diagnostics.processed_count(),
        skipped = summary.diagnostics.skipped_count,
        zones = summary.zone_count,
        buckets = summary.bucket_count,
        "Pipeline run complete"
    );

    Ok(RunOutcome::Completed(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
