//! Output artifact: serialized demand tensor plus probability distribution.

use crate::bucketer::{Granularity, TimeBucket};
use crate::error::PipelineError;
use crate::record::ZoneId;
use crate::tensor::{DemandTensor, ProbabilityDistribution};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// On-disk artifact layout. Axis label lists and the two row-major arrays
/// correspond index-for-index: `demand[z][t]` is the count for
/// `zones[z]` in `buckets[t]`.
///
/// Deliberately carries no wall-clock metadata so that identical inputs
/// serialize to byte-identical artifacts.
#[derive(Serialize)]
struct Artifact<'a> {
    timezone: &'a str,
    granularity_minutes: u32,
    zones: &'a [ZoneId],
    buckets: &'a [TimeBucket],
    demand: Vec<Vec<u64>>,
    probability: Vec<Vec<f64>>,
}

/// Writes the artifact as pretty-printed JSON to `path`.
pub fn write_artifact(
    path: &Path,
    tensor: &DemandTensor,
    distribution: &ProbabilityDistribution,
    timezone: &str,
    granularity: Granularity,
) -> Result<(), PipelineError> {
    let artifact = Artifact {
        timezone,
        granularity_minutes: granularity.minutes(),
        zones: tensor.zones(),
        buckets: tensor.buckets(),
        demand: tensor.rows(),
        probability: distribution.rows(),
    };

    let artifact_err = |source: std::io::Error| PipelineError::Artifact {
        path: path.to_path_buf(),
        source,
    };

    let mut body = serde_json::to_vec_pretty(&artifact).map_err(|e| artifact_err(e.into()))?;
    body.push(b'\n');

    debug!(path = %path.display(), bytes = body.len(), "Writing artifact");
    std::fs::write(path, body).map_err(artifact_err)?;

    Ok(())
}
