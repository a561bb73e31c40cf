//! Row-oriented CSV source, with optional gzip decompression.

use crate::error::PipelineError;
use crate::record::{RawTripRow, TripRecord};
use crate::source::{RecordSource, REQUIRED_COLUMNS};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

type RowIter = csv::DeserializeRecordsIntoIter<Box<dyn Read + Send>, RawTripRow>;

/// Streams a TLC CSV export (optionally `.csv.gz`) as record batches.
///
/// The header row is validated at open; rows that later fail to
/// deserialize are surfaced as records with no pickup timestamp so the
/// aggregator can tally them instead of the run aborting.
pub struct CsvSource {
    path: PathBuf,
    rows: Option<RowIter>,
    batch_size: usize,
    exhausted: bool,
}

impl CsvSource {
    pub fn open(path: &Path, gzipped: bool, batch_size: usize) -> Result<Self, PipelineError> {
        let open_err = |reason: String| PipelineError::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let input: Box<dyn Read + Send> = if gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| open_err(format!("unreadable header row: {e}")))?;
        for required in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == *required) {
                return Err(open_err(format!("missing required column {required}")));
            }
        }

        Ok(CsvSource {
            path: path.to_path_buf(),
            rows: Some(reader.into_deserialize()),
            batch_size,
            exhausted: false,
        })
    }

    /// A placeholder for a row the CSV layer could not deserialize at all.
    /// No pickup timestamp, so the aggregator counts it as skipped.
    fn malformed_row() -> TripRecord {
        TripRecord {
            vendor_id: None,
            pickup_datetime: None,
            dropoff_datetime: None,
            passenger_count: None,
            trip_distance: 0.0,
            pickup_zone: None,
            dropoff_zone: None,
            payment_type: None,
            fare_amount: 0.0,
            extra: 0.0,
            mta_tax: 0.0,
            tip_amount: 0.0,
            tolls_amount: 0.0,
            improvement_surcharge: 0.0,
            total_amount: 0.0,
        }
    }
}

impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("path", &self.path)
            .field("batch_size", &self.batch_size)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl RecordSource for CsvSource {
    fn next_batch(&mut self) -> Result<Option<Vec<TripRecord>>, PipelineError> {
        if self.exhausted {
            return Err(PipelineError::ExhaustedSource {
                path: self.path.clone(),
            });
        }

        let Some(rows) = self.rows.as_mut() else {
            // rows is only None once exhausted is set
            unreachable!("row iterator taken before exhaustion");
        };

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match rows.next() {
                Some(Ok(raw)) => batch.push(TripRecord::from(raw)),
                Some(Err(e)) if e.is_io_error() => {
                    return Err(PipelineError::SourceOpen {
                        path: self.path.clone(),
                        reason: format!("read failed mid-stream (truncated file?): {e}"),
                    });
                }
                // Structurally broken row: hand it to the aggregator's
                // skip policy rather than aborting a large ingest.
                Some(Err(_)) => batch.push(Self::malformed_row()),
                None => break,
            }
        }

        if batch.is_empty() {
            self.exhausted = true;
            self.rows = None; // releases file handle and gzip buffers
            return Ok(None);
        }

        Ok(Some(batch))
    }
}
