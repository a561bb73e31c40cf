//! Demand aggregation: a single pass over the record stream, counting
//! pickups per (zone, time bucket).

use crate::bucketer::{bucket_for, Granularity, TimeBucket};
use crate::error::PipelineError;
use crate::record::{TripRecord, ZoneId};
use crate::source::RecordSource;
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Processed-vs-skipped tallies for one aggregation pass.
///
/// Skipping is the deliberate partial-failure policy for noisy trip data:
/// a record with no parseable pickup timestamp, no pickup zone, or a zone
/// outside the valid set is dropped and tallied here, never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub total_count: u64,
    pub skipped_count: u64,
}

impl Diagnostics {
    pub fn processed_count(&self) -> u64 {
        self.total_count - self.skipped_count
    }
}

/// Sparse demand counts keyed by zone, then bucket. A missing pair means
/// zero. Built once per run and consumed exactly once by the tensor
/// builder.
#[derive(Debug, Default)]
pub struct DemandAggregate {
    counts: HashMap<ZoneId, HashMap<TimeBucket, u64>>,
}

impl DemandAggregate {
    pub fn count(&self, zone: ZoneId, bucket: &TimeBucket) -> u64 {
        self.counts
            .get(&zone)
            .and_then(|per_bucket| per_bucket.get(bucket))
            .copied()
            .unwrap_or(0)
    }

    /// Distinct zones seen, ascending.
    pub fn zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self.counts.keys().copied().collect();
        zones.sort_unstable();
        zones
    }

    /// Distinct buckets seen, chronological.
    pub fn buckets(&self) -> Vec<TimeBucket> {
        let mut buckets: Vec<TimeBucket> = self
            .counts
            .values()
            .flat_map(|per_bucket| per_bucket.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        buckets.sort();
        buckets
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn increment(&mut self, zone: ZoneId, bucket: TimeBucket) {
        *self
            .counts
            .entry(zone)
            .or_default()
            .entry(bucket)
            .or_insert(0) += 1;
    }
}

/// Incremental aggregation state. The orchestrator feeds it one batch at a
/// time so cancellation can be observed between batches; [`aggregate`]
/// wraps it for callers that just want a source drained.
pub struct DemandAggregator<'a> {
    timezone: Tz,
    granularity: Granularity,
    valid_zones: Option<&'a HashSet<ZoneId>>,
    aggregate: DemandAggregate,
    diagnostics: Diagnostics,
}

impl<'a> DemandAggregator<'a> {
    pub fn new(
        timezone: Tz,
        granularity: Granularity,
        valid_zones: Option<&'a HashSet<ZoneId>>,
    ) -> Self {
        DemandAggregator {
            timezone,
            granularity,
            valid_zones,
            aggregate: DemandAggregate::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn consume(&mut self, record: &TripRecord) {
        self.diagnostics.total_count += 1;

        let (Some(pickup), Some(zone_id)) = (record.pickup_datetime, record.pickup_zone) else {
            self.diagnostics.skipped_count += 1;
            return;
        };

        if let Some(valid) = self.valid_zones {
            if !valid.contains(&zone_id) {
                self.diagnostics.skipped_count += 1;
                return;
            }
        }

        let bucket = bucket_for(pickup, self.timezone, self.granularity);
        self.aggregate.increment(zone_id, bucket);
    }

    pub fn consume_batch(&mut self, batch: &[TripRecord]) {
        for record in batch {
            self.consume(record);
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn finish(self) -> (DemandAggregate, Diagnostics) {
        (self.aggregate, self.diagnostics)
    }
}

/// Drains `source` to exhaustion and returns the aggregate with its
/// diagnostics. Memory stays bounded by the output map plus one in-flight
/// batch.
pub fn aggregate(
    source: &mut dyn RecordSource,
    timezone: Tz,
    granularity: Granularity,
    valid_zones: Option<&HashSet<ZoneId>>,
) -> Result<(DemandAggregate, Diagnostics), PipelineError> {
    let mut aggregator = DemandAggregator::new(timezone, granularity, valid_zones);
    while let Some(batch) = source.next_batch()? {
        aggregator.consume_batch(&batch);
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_timestamp;
    use chrono_tz::UTC;

    fn record(pickup: &str, zone: Option<ZoneId>) -> TripRecord {
        TripRecord {
            vendor_id: Some(1),
            pickup_datetime: parse_timestamp(pickup),
            dropoff_datetime: None,
            passenger_count: Some(1),
            trip_distance: 1.0,
            pickup_zone: zone,
            dropoff_zone: None,
            payment_type: Some(1),
            fare_amount: 10.0,
            extra: 0.0,
            mta_tax: 0.5,
            tip_amount: 0.0,
            tolls_amount: 0.0,
            improvement_surcharge: 0.3,
            total_amount: 10.8,
        }
    }

    fn bucket(label_ts: &str) -> TimeBucket {
        bucket_for(parse_timestamp(label_ts).unwrap(), UTC, Granularity::HOURLY)
    }

    #[test]
    fn test_three_record_scenario() {
        let mut agg = DemandAggregator::new(UTC, Granularity::HOURLY, None);
        agg.consume(&record("2026-02-08T18:15:00Z", Some(1)));
        agg.consume(&record("2026-02-08T18:45:00Z", Some(1)));
        agg.consume(&record("2026-02-08T19:05:00Z", Some(2)));
        let (aggregate, diagnostics) = agg.finish();

        assert_eq!(aggregate.count(1, &bucket("2026-02-08T18:00:00Z")), 2);
        assert_eq!(aggregate.count(2, &bucket("2026-02-08T19:00:00Z")), 1);
        assert_eq!(aggregate.count(2, &bucket("2026-02-08T18:00:00Z")), 0);
        assert_eq!(diagnostics.total_count, 3);
        assert_eq!(diagnostics.skipped_count, 0);
    }

    #[test]
    fn test_malformed_timestamp_is_skipped_not_fatal() {
        let mut agg = DemandAggregator::new(UTC, Granularity::HOURLY, None);
        agg.consume(&record("2026-02-08T18:15:00Z", Some(1)));
        agg.consume(&record("garbage", Some(1)));
        agg.consume(&record("2026-02-08T18:45:00Z", Some(1)));
        let (aggregate, diagnostics) = agg.finish();

        assert_eq!(diagnostics.total_count, 3);
        assert_eq!(diagnostics.skipped_count, 1);
        assert_eq!(aggregate.count(1, &bucket("2026-02-08T18:00:00Z")), 2);
    }

    #[test]
    fn test_missing_zone_is_skipped() {
        let mut agg = DemandAggregator::new(UTC, Granularity::HOURLY, None);
        agg.consume(&record("2026-02-08T18:15:00Z", None));
        let (aggregate, diagnostics) = agg.finish();

        assert!(aggregate.is_empty());
        assert_eq!(diagnostics.skipped_count, 1);
    }

    #[test]
    fn test_zone_outside_valid_set_is_skipped() {
        let valid: HashSet<ZoneId> = [1, 2].into_iter().collect();
        let mut agg = DemandAggregator::new(UTC, Granularity::HOURLY, Some(&valid));
        agg.consume(&record("2026-02-08T18:15:00Z", Some(1)));
        agg.consume(&record("2026-02-08T18:15:00Z", Some(999)));
        let (aggregate, diagnostics) = agg.finish();

        assert_eq!(diagnostics.total_count, 2);
        assert_eq!(diagnostics.skipped_count, 1);
        assert_eq!(aggregate.zones(), vec![1]);
    }

    #[test]
    fn test_conservation_per_zone() {
        // Every valid record lands in exactly one bucket of its zone.
        let mut agg = DemandAggregator::new(UTC, Granularity::HOURLY, None);
        let pickups = [
            ("2026-02-08T18:15:00Z", 1),
            ("2026-02-08T18:45:00Z", 1),
            ("2026-02-08T19:05:00Z", 1),
            ("2026-02-08T19:06:00Z", 2),
            ("2026-02-09T03:00:00Z", 2),
        ];
        for (ts, zone) in pickups {
            agg.consume(&record(ts, Some(zone)));
        }
        let (aggregate, diagnostics) = agg.finish();

        for zone in [1, 2] {
            let total: u64 = aggregate
                .buckets()
                .iter()
                .map(|b| aggregate.count(zone, b))
                .sum();
            let expected = pickups.iter().filter(|(_, z)| *z == zone).count() as u64;
            assert_eq!(total, expected, "zone {zone}");
        }
        assert_eq!(diagnostics.processed_count(), 5);
    }

    #[derive(Debug)]
    struct VecSource {
        batches: Vec<Vec<TripRecord>>,
        exhausted: bool,
    }

    impl RecordSource for VecSource {
        fn next_batch(&mut self) -> Result<Option<Vec<TripRecord>>, PipelineError> {
            if self.exhausted {
                return Err(PipelineError::ExhaustedSource {
                    path: "memory".into(),
                });
            }
            match self.batches.pop() {
                Some(batch) => Ok(Some(batch)),
                None => {
                    self.exhausted = true;
                    Ok(None)
                }
            }
        }
    }

    #[test]
    fn test_aggregate_drains_source_to_exhaustion() {
        let mut source = VecSource {
            batches: vec![
                vec![record("2026-02-08T19:05:00Z", Some(2))],
                vec![
                    record("2026-02-08T18:15:00Z", Some(1)),
                    record("2026-02-08T18:45:00Z", Some(1)),
                ],
            ],
            exhausted: false,
        };

        let (result, diagnostics) =
            aggregate(&mut source, UTC, Granularity::HOURLY, None).unwrap();

        assert_eq!(diagnostics.total_count, 3);
        assert_eq!(result.count(1, &bucket("2026-02-08T18:00:00Z")), 2);
        assert_eq!(result.count(2, &bucket("2026-02-08T19:00:00Z")), 1);
        // The drain consumed the source fully; the handle is now dead.
        assert!(source.next_batch().is_err());
    }

    #[test]
    fn test_zones_and_buckets_are_sorted() {
        let mut agg = DemandAggregator::new(UTC, Granularity::HOURLY, None);
        agg.consume(&record("2026-02-09T00:05:00Z", Some(50)));
        agg.consume(&record("2026-02-08T18:15:00Z", Some(3)));
        agg.consume(&record("2026-02-08T23:15:00Z", Some(161)));
        let (aggregate, _) = agg.finish();

        assert_eq!(aggregate.zones(), vec![3, 50, 161]);
        let buckets = aggregate.buckets();
        let labels: Vec<&str> = buckets.iter().map(|b| b.as_str()).collect();
        assert_eq!(
            labels,
            vec!["2026-02-08 18:00", "2026-02-08 23:00", "2026-02-09 00:00"]
        );
    }
}
