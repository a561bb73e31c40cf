//! Record sources: lazy, finite, non-restartable streams of trip batches.
//!
//! A source yields records strictly in file order, one batch at a time.
//! Batch size is an internal chunking detail; consumers must treat the
//! stream as record-by-record. Opening the same path twice yields two
//! independent streams, but a single handle is one-shot: polling it again
//! after exhaustion is a collaborator bug and fails with
//! [`PipelineError::ExhaustedSource`].

mod csv;
mod parquet;

pub use csv::CsvSource;
pub use parquet::ParquetSource;

use crate::error::PipelineError;
use crate::record::TripRecord;
use std::path::Path;

/// Records per batch handed to the consumer.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Columns a trip dataset must carry for aggregation to be possible.
/// Everything else is read best-effort.
pub const REQUIRED_COLUMNS: &[&str] = &["tpep_pickup_datetime", "PULocationID"];

/// On-disk format of a trip dataset. Chosen by file extension or passed
/// explicitly by the ingest job; file contents are never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Parquet,
    Csv,
    CsvGz,
}

impl SourceFormat {
    /// Picks a format from the path's extension(s). `None` for anything
    /// unrecognized.
    pub fn from_path(path: &Path) -> Option<SourceFormat> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".parquet") {
            Some(SourceFormat::Parquet)
        } else if name.ends_with(".csv.gz") {
            Some(SourceFormat::CsvGz)
        } else if name.ends_with(".csv") {
            Some(SourceFormat::Csv)
        } else {
            None
        }
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(SourceFormat::Parquet),
            "csv" => Ok(SourceFormat::Csv),
            "csv.gz" | "csv-gz" | "gz" => Ok(SourceFormat::CsvGz),
            other => Err(format!("unknown source format: {other}")),
        }
    }
}

/// A finite, forward-only stream of trip record batches.
pub trait RecordSource: std::fmt::Debug {
    /// Returns the next batch in file order, or `Ok(None)` exactly once at
    /// exhaustion. Underlying resources are released at that point; any
    /// later call fails with [`PipelineError::ExhaustedSource`].
    fn next_batch(&mut self) -> Result<Option<Vec<TripRecord>>, PipelineError>;
}

/// Opens `path` with the given format, or with the extension-derived format
/// when `format` is `None`.
pub fn open_source(
    path: &Path,
    format: Option<SourceFormat>,
) -> Result<Box<dyn RecordSource>, PipelineError> {
    let format = match format.or_else(|| SourceFormat::from_path(path)) {
        Some(f) => f,
        None => {
            return Err(PipelineError::SourceOpen {
                path: path.to_path_buf(),
                reason: "unrecognized file extension and no explicit format given".to_string(),
            });
        }
    };

    match format {
        SourceFormat::Parquet => Ok(Box::new(ParquetSource::open(path, DEFAULT_BATCH_SIZE)?)),
        SourceFormat::Csv => Ok(Box::new(CsvSource::open(path, false, DEFAULT_BATCH_SIZE)?)),
        SourceFormat::CsvGz => Ok(Box::new(CsvSource::open(path, true, DEFAULT_BATCH_SIZE)?)),
    }
}
