//! Trip record types shared by all source formats.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// Integer id of a TLC taxi zone, as assigned by the zone lookup table.
pub type ZoneId = i64;

/// One observed trip, as read from a TLC trip dataset.
///
/// Records are ephemeral: they live only inside the batch being consumed.
/// The aggregation stage reads nothing beyond `pickup_datetime` and
/// `pickup_zone`; the remaining fields are carried so every format decodes
/// to the same row shape.
///
/// A pickup timestamp that failed to parse is carried as `None` rather than
/// failing the read. The aggregator tallies such rows as skipped.
#[derive(Debug, Clone)]
pub struct TripRecord {
    pub vendor_id: Option<i64>,
    pub pickup_datetime: Option<DateTime<Utc>>,
    pub dropoff_datetime: Option<DateTime<Utc>>,
    pub passenger_count: Option<i64>,
    pub trip_distance: f64,
    pub pickup_zone: Option<ZoneId>,
    pub dropoff_zone: Option<ZoneId>,
    pub payment_type: Option<i64>,
    pub fare_amount: f64,
    pub extra: f64,
    pub mta_tax: f64,
    pub tip_amount: f64,
    pub tolls_amount: f64,
    pub improvement_surcharge: f64,
    pub total_amount: f64,
}

/// Parses a TLC timestamp string.
///
/// Accepts RFC 3339 (`2026-02-08T18:15:00Z`) and the naive forms the public
/// CSV exports use (`2026-02-08 18:15:00`). Naive timestamps carry no zone
/// marking and are treated as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    None
}

/// Raw CSV row in the TLC export layout. Numeric fields are optional since
/// the public files contain blank cells; timestamps stay strings here and
/// are parsed leniently in the conversion below.
#[derive(Debug, Deserialize)]
pub struct RawTripRow {
    #[serde(rename = "VendorID", default)]
    pub vendor_id: Option<i64>,
    pub tpep_pickup_datetime: String,
    #[serde(default)]
    pub tpep_dropoff_datetime: Option<String>,
    #[serde(default)]
    pub passenger_count: Option<f64>,
    #[serde(default)]
    pub trip_distance: Option<f64>,
    #[serde(rename = "PULocationID", default)]
    pub pu_location_id: Option<ZoneId>,
    #[serde(rename = "DOLocationID", default)]
    pub do_location_id: Option<ZoneId>,
    #[serde(default)]
    pub payment_type: Option<i64>,
    #[serde(default)]
    pub fare_amount: Option<f64>,
    #[serde(default)]
    pub extra: Option<f64>,
    #[serde(default)]
    pub mta_tax: Option<f64>,
    #[serde(default)]
    pub tip_amount: Option<f64>,
    #[serde(default)]
    pub tolls_amount: Option<f64>,
    #[serde(default)]
    pub improvement_surcharge: Option<f64>,
    #[serde(default)]
    pub total_amount: Option<f64>,
}

impl From<RawTripRow> for TripRecord {
    fn from(row: RawTripRow) -> Self {
        TripRecord {
            vendor_id: row.vendor_id,
            pickup_datetime: parse_timestamp(&row.tpep_pickup_datetime),
            dropoff_datetime: row
                .tpep_dropoff_datetime
                .as_deref()
                .and_then(parse_timestamp),
            // The exports store passenger counts as floats; the count itself
            // is integral.
            passenger_count: row.passenger_count.map(|c| c as i64),
            trip_distance: row.trip_distance.unwrap_or(0.0),
            pickup_zone: row.pu_location_id,
            dropoff_zone: row.do_location_id,
            payment_type: row.payment_type,
            fare_amount: row.fare_amount.unwrap_or(0.0),
            extra: row.extra.unwrap_or(0.0),
            mta_tax: row.mta_tax.unwrap_or(0.0),
            tip_amount: row.tip_amount.unwrap_or(0.0),
            tolls_amount: row.tolls_amount.unwrap_or(0.0),
            improvement_surcharge: row.improvement_surcharge.unwrap_or(0.0),
            total_amount: row.total_amount.unwrap_or(0.0),
        }
    }
}
