//! Dense tensor materialization from the sparse demand aggregate.

use crate::aggregator::DemandAggregate;
use crate::bucketer::TimeBucket;
use crate::error::PipelineError;
use crate::record::ZoneId;

/// Dense demand counts over (zone × time bucket), row-major with zones as
/// rows. Axis orders are exactly the caller-supplied orderings; pairs absent
/// from the aggregate are zero-filled. Immutable once built.
#[derive(Debug)]
pub struct DemandTensor {
    zones: Vec<ZoneId>,
    buckets: Vec<TimeBucket>,
    values: Vec<u64>,
}

impl DemandTensor {
    pub fn zones(&self) -> &[ZoneId] {
        &self.zones
    }

    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    /// Cell by axis position.
    pub fn value(&self, zone_idx: usize, bucket_idx: usize) -> u64 {
        self.values[zone_idx * self.buckets.len() + bucket_idx]
    }

    /// Row-major cells, one row per zone.
    pub fn rows(&self) -> Vec<Vec<u64>> {
        self.values
            .chunks(self.buckets.len())
            .map(|row| row.to_vec())
            .collect()
    }
}

/// Per-bucket pickup probability over zones: each column of the demand
/// tensor divided by its sum. A column with no demand stays all zero,
/// never NaN, so consumers need no guards.
#[derive(Debug)]
pub struct ProbabilityDistribution {
    zones: Vec<ZoneId>,
    buckets: Vec<TimeBucket>,
    values: Vec<f64>,
}

impl ProbabilityDistribution {
    pub fn zones(&self) -> &[ZoneId] {
        &self.zones
    }

    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    pub fn value(&self, zone_idx: usize, bucket_idx: usize) -> f64 {
        self.values[zone_idx * self.buckets.len() + bucket_idx]
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.values
            .chunks(self.buckets.len())
            .map(|row| row.to_vec())
            .collect()
    }
}

/// Materializes `aggregate` into a dense tensor and its probability
/// distribution, in the caller-supplied axis orders.
///
/// The aggregate is consumed: it is built once per run and read exactly
/// once, here. Fails with [`PipelineError::Shape`] before any allocation
/// when either ordering is empty.
pub fn build(
    aggregate: DemandAggregate,
    zone_order: Vec<ZoneId>,
    bucket_order: Vec<TimeBucket>,
) -> Result<(DemandTensor, ProbabilityDistribution), PipelineError> {
    if zone_order.is_empty() || bucket_order.is_empty() {
        return Err(PipelineError::Shape {
            zones: zone_order.len(),
            buckets: bucket_order.len(),
        });
    }

    let n_buckets = bucket_order.len();
    let mut values = vec![0u64; zone_order.len() * n_buckets];
    for (zi, zone) in zone_order.iter().enumerate() {
        for (bi, bucket) in bucket_order.iter().enumerate() {
            values[zi * n_buckets + bi] = aggregate.count(*zone, bucket);
        }
    }

    let mut probabilities = vec![0.0f64; values.len()];
    for bi in 0..n_buckets {
        let column_sum: u64 = (0..zone_order.len()).map(|zi| values[zi * n_buckets + bi]).sum();
        if column_sum == 0 {
            continue;
        }
        for zi in 0..zone_order.len() {
            probabilities[zi * n_buckets + bi] =
                values[zi * n_buckets + bi] as f64 / column_sum as f64;
        }
    }

    let tensor = DemandTensor {
        zones: zone_order.clone(),
        buckets: bucket_order.clone(),
        values,
    };
    let distribution = ProbabilityDistribution {
        zones: zone_order,
        buckets: bucket_order,
        values: probabilities,
    };

    Ok((tensor, distribution))
}
