//! Columnar Parquet source, the format the TLC public trip datasets ship in.

use crate::error::PipelineError;
use crate::record::{parse_timestamp, TripRecord};
use crate::source::{RecordSource, REQUIRED_COLUMNS};
use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Column positions resolved once at open; the reader yields every batch
/// with the file schema.
struct ColumnMap {
    vendor_id: Option<usize>,
    pickup_datetime: usize,
    dropoff_datetime: Option<usize>,
    passenger_count: Option<usize>,
    trip_distance: Option<usize>,
    pickup_zone: usize,
    dropoff_zone: Option<usize>,
    payment_type: Option<usize>,
    fare_amount: Option<usize>,
    extra: Option<usize>,
    mta_tax: Option<usize>,
    tip_amount: Option<usize>,
    tolls_amount: Option<usize>,
    improvement_surcharge: Option<usize>,
    total_amount: Option<usize>,
}

impl ColumnMap {
    fn resolve(schema: &Schema) -> Option<ColumnMap> {
        let idx = |name: &str| schema.index_of(name).ok();
        Some(ColumnMap {
            vendor_id: idx("VendorID"),
            pickup_datetime: idx(REQUIRED_COLUMNS[0])?,
            dropoff_datetime: idx("tpep_dropoff_datetime"),
            passenger_count: idx("passenger_count"),
            trip_distance: idx("trip_distance"),
            pickup_zone: idx(REQUIRED_COLUMNS[1])?,
            dropoff_zone: idx("DOLocationID"),
            payment_type: idx("payment_type"),
            fare_amount: idx("fare_amount"),
            extra: idx("extra"),
            mta_tax: idx("mta_tax"),
            tip_amount: idx("tip_amount"),
            tolls_amount: idx("tolls_amount"),
            improvement_surcharge: idx("improvement_surcharge"),
            total_amount: idx("total_amount"),
        })
    }
}

/// Streams a Parquet trip file as record batches in row-group order.
pub struct ParquetSource {
    path: PathBuf,
    reader: Option<ParquetRecordBatchReader>,
    columns: ColumnMap,
    exhausted: bool,
}

impl ParquetSource {
    pub fn open(path: &Path, batch_size: usize) -> Result<Self, PipelineError> {
        let open_err = |reason: String| PipelineError::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        // Footer and metadata are validated here, so a truncated file
        // fails at open rather than mid-stream.
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| open_err(format!("not a readable parquet file: {e}")))?;

        let columns = ColumnMap::resolve(builder.schema())
            .ok_or_else(|| open_err(format!("missing required columns {REQUIRED_COLUMNS:?}")))?;

        let reader = builder
            .with_batch_size(batch_size)
            .build()
            .map_err(|e| open_err(format!("failed to start parquet reader: {e}")))?;

        Ok(ParquetSource {
            path: path.to_path_buf(),
            reader: Some(reader),
            columns,
            exhausted: false,
        })
    }

    fn convert_batch(&self, batch: &RecordBatch) -> Vec<TripRecord> {
        let col = |i: Option<usize>| i.map(|i| batch.column(i));
        let vendor_id = col(self.columns.vendor_id);
        let pickup = batch.column(self.columns.pickup_datetime);
        let dropoff = col(self.columns.dropoff_datetime);
        let passengers = col(self.columns.passenger_count);
        let distance = col(self.columns.trip_distance);
        let pu_zone = batch.column(self.columns.pickup_zone);
        let do_zone = col(self.columns.dropoff_zone);
        let payment = col(self.columns.payment_type);
        let fare = col(self.columns.fare_amount);
        let extra = col(self.columns.extra);
        let mta = col(self.columns.mta_tax);
        let tip = col(self.columns.tip_amount);
        let tolls = col(self.columns.tolls_amount);
        let surcharge = col(self.columns.improvement_surcharge);
        let total = col(self.columns.total_amount);

        let mut records = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            records.push(TripRecord {
                vendor_id: vendor_id.and_then(|c| int_value(c, row)),
                pickup_datetime: timestamp_value(pickup, row),
                dropoff_datetime: dropoff.and_then(|c| timestamp_value(c, row)),
                passenger_count: passengers.and_then(|c| int_value(c, row)),
                trip_distance: distance.and_then(|c| float_value(c, row)).unwrap_or(0.0),
                pickup_zone: int_value(pu_zone, row),
                dropoff_zone: do_zone.and_then(|c| int_value(c, row)),
                payment_type: payment.and_then(|c| int_value(c, row)),
                fare_amount: fare.and_then(|c| float_value(c, row)).unwrap_or(0.0),
                extra: extra.and_then(|c| float_value(c, row)).unwrap_or(0.0),
                mta_tax: mta.and_then(|c| float_value(c, row)).unwrap_or(0.0),
                tip_amount: tip.and_then(|c| float_value(c, row)).unwrap_or(0.0),
                tolls_amount: tolls.and_then(|c| float_value(c, row)).unwrap_or(0.0),
                improvement_surcharge: surcharge
                    .and_then(|c| float_value(c, row))
                    .unwrap_or(0.0),
                total_amount: total.and_then(|c| float_value(c, row)).unwrap_or(0.0),
            });
        }
        records
    }
}

impl std::fmt::Debug for ParquetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSource")
            .field("path", &self.path)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl RecordSource for ParquetSource {
    fn next_batch(&mut self) -> Result<Option<Vec<TripRecord>>, PipelineError> {
        if self.exhausted {
            return Err(PipelineError::ExhaustedSource {
                path: self.path.clone(),
            });
        }

        let Some(reader) = self.reader.as_mut() else {
            unreachable!("batch reader taken before exhaustion");
        };

        match reader.next() {
            Some(Ok(batch)) => Ok(Some(self.convert_batch(&batch))),
            Some(Err(e)) => Err(PipelineError::SourceOpen {
                path: self.path.clone(),
                reason: format!("parquet read failed mid-stream: {e}"),
            }),
            None => {
                self.exhausted = true;
                self.reader = None; // releases file handle and decode buffers
                Ok(None)
            }
        }
    }
}

/// Reads an integer cell, widening from the 32-bit columns older TLC files
/// use and accepting the float-typed count columns some exports carry.
fn int_value(col: &ArrayRef, row: usize) -> Option<i64> {
    if col.is_null(row) {
        return None;
    }
    if let Some(a) = col.as_any().downcast_ref::<Int64Array>() {
        return Some(a.value(row));
    }
    if let Some(a) = col.as_any().downcast_ref::<Int32Array>() {
        return Some(a.value(row) as i64);
    }
    if let Some(a) = col.as_any().downcast_ref::<Float64Array>() {
        return Some(a.value(row) as i64);
    }
    None
}

fn float_value(col: &ArrayRef, row: usize) -> Option<f64> {
    if col.is_null(row) {
        return None;
    }
    if let Some(a) = col.as_any().downcast_ref::<Float64Array>() {
        return Some(a.value(row));
    }
    if let Some(a) = col.as_any().downcast_ref::<Float32Array>() {
        return Some(a.value(row) as f64);
    }
    if let Some(a) = col.as_any().downcast_ref::<Int64Array>() {
        return Some(a.value(row) as f64);
    }
    None
}

/// Reads a timestamp cell. Arrow timestamps are epoch-offset values, so a
/// file with no zone metadata is read as UTC, matching the treatment of
/// naive timestamps elsewhere.
fn timestamp_value(col: &ArrayRef, row: usize) -> Option<DateTime<Utc>> {
    if col.is_null(row) {
        return None;
    }
    match col.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => col
            .as_any()
            .downcast_ref::<TimestampSecondArray>()
            .and_then(|a| DateTime::from_timestamp(a.value(row), 0)),
        DataType::Timestamp(TimeUnit::Millisecond, _) => col
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .and_then(|a| DateTime::from_timestamp_millis(a.value(row))),
        DataType::Timestamp(TimeUnit::Microsecond, _) => col
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .and_then(|a| DateTime::from_timestamp_micros(a.value(row))),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => col
            .as_any()
            .downcast_ref::<TimestampNanosecondArray>()
            .map(|a| DateTime::from_timestamp_nanos(a.value(row))),
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .and_then(|a| parse_timestamp(a.value(row))),
        _ => None,
    }
}
