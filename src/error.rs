//! Error taxonomy for the demand pipeline.
//!
//! Per-record data-quality problems are never errors; they are tallied in
//! [`Diagnostics`](crate::aggregator::Diagnostics) and the run continues.
//! Everything here is structural and fatal to the run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input file is missing, unreadable, or its schema lacks a
    /// required column. Not retryable: a data file does not become valid
    /// by trying again.
    #[error("failed to open source {}: {reason}", .path.display())]
    SourceOpen { path: PathBuf, reason: String },

    /// A record stream handle was polled again after it reported
    /// exhaustion. Collaborator bug: streams are finite and one-shot.
    #[error("record source for {} was already exhausted", .path.display())]
    ExhaustedSource { path: PathBuf },

    /// The tensor builder was invoked with an empty axis ordering.
    #[error("tensor axes must be non-empty (zones: {zones}, buckets: {buckets})")]
    Shape { zones: usize, buckets: usize },

    /// Writing the output artifact failed. The orchestrator removes the
    /// partial file (unless configured otherwise) and re-surfaces this.
    #[error("failed to write artifact {}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
