//! TLC zone registry, loaded from the public zone lookup CSV
//! (`LocationID,Borough,Zone,service_zone`).
//!
//! The registry supplies the valid-zone set used to filter malformed
//! records and the ascending zone ordering for the tensor axis.

use crate::error::PipelineError;
use crate::record::ZoneId;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// One row of the zone lookup table.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneRecord {
    #[serde(rename = "LocationID")]
    pub id: ZoneId,
    #[serde(rename = "Borough", default)]
    pub borough: String,
    #[serde(rename = "Zone", default)]
    pub name: String,
    #[serde(rename = "service_zone", default)]
    pub service_zone: String,
}

/// The full zone table, held sorted ascending by id.
#[derive(Debug)]
pub struct ZoneRegistry {
    zones: Vec<ZoneRecord>,
}

impl ZoneRegistry {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let open_err = |reason: String| PipelineError::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let mut reader = csv::Reader::from_reader(file);

        let mut zones = Vec::new();
        for row in reader.deserialize() {
            let record: ZoneRecord = row.map_err(|e| open_err(format!("bad zone row: {e}")))?;
            zones.push(record);
        }
        zones.sort_unstable_by_key(|z| z.id);

        Ok(ZoneRegistry { zones })
    }

    /// Ascending zone ids, the canonical tensor zone axis.
    pub fn ordered_ids(&self) -> Vec<ZoneId> {
        self.zones.iter().map(|z| z.id).collect()
    }

    pub fn valid_set(&self) -> HashSet<ZoneId> {
        self.zones.iter().map(|z| z.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneRecord> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
