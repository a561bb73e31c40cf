//! Time bucketing: maps a UTC instant to a local wall-clock bucket label.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Width of a time bucket, in minutes that evenly divide a day so bucket
/// boundaries line up across days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granularity {
    minutes: u32,
}

impl Granularity {
    pub const HOURLY: Granularity = Granularity { minutes: 60 };

    /// Returns `None` unless `minutes` is in `1..=1440` and divides a day.
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        if minutes == 0 || minutes > MINUTES_PER_DAY || MINUTES_PER_DAY % minutes != 0 {
            return None;
        }
        Some(Granularity { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::HOURLY
    }
}

/// Canonical label of one fixed-width time interval, e.g. `2026-02-08 18:00`.
///
/// Within one timezone and granularity, lexicographic order of labels equals
/// chronological order, so sorted labels form a valid tensor axis.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeBucket(String);

impl TimeBucket {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Assigns the bucket containing `instant`, in `timezone` local time.
///
/// The conversion goes from the UTC instant through the IANA zone database,
/// so local times skipped or repeated by a DST transition resolve by the
/// zone's offset at that instant. Deterministic and stateless.
pub fn bucket_for(instant: DateTime<Utc>, timezone: Tz, granularity: Granularity) -> TimeBucket {
    let local = instant.with_timezone(&timezone);

    let minutes_into_day = local.hour() * 60 + local.minute();
    let floored = minutes_into_day - minutes_into_day % granularity.minutes();

    TimeBucket(format!(
        "{} {:02}:{:02}",
        local.format("%Y-%m-%d"),
        floored / 60,
        floored % 60
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::{America::New_York, UTC};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_hourly_label_format() {
        let b = bucket_for(utc(2026, 2, 8, 18, 15), UTC, Granularity::HOURLY);
        assert_eq!(b.as_str(), "2026-02-08 18:00");
    }

    #[test]
    fn test_deterministic() {
        let ts = utc(2026, 2, 8, 18, 45);
        let a = bucket_for(ts, New_York, Granularity::HOURLY);
        let b = bucket_for(ts, New_York, Granularity::HOURLY);
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_local_hour_same_bucket() {
        let a = bucket_for(utc(2026, 2, 8, 18, 0), UTC, Granularity::HOURLY);
        let b = bucket_for(utc(2026, 2, 8, 18, 59), UTC, Granularity::HOURLY);
        let c = bucket_for(utc(2026, 2, 8, 19, 0), UTC, Granularity::HOURLY);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_timezone_shifts_label() {
        // 18:15 UTC is 13:15 in New York (EST, UTC-5).
        let b = bucket_for(utc(2026, 2, 8, 18, 15), New_York, Granularity::HOURLY);
        assert_eq!(b.as_str(), "2026-02-08 13:00");
    }

    #[test]
    fn test_dst_spring_forward_does_not_fail() {
        // 2026-03-08 07:30 UTC falls just after the US spring-forward;
        // New York local 02:30 does not exist that day, but the instant
        // itself maps cleanly to 03:30 EDT.
        let b = bucket_for(utc(2026, 3, 8, 7, 30), New_York, Granularity::HOURLY);
        assert_eq!(b.as_str(), "2026-03-08 03:00");
    }

    #[test]
    fn test_dst_fall_back_is_deterministic() {
        // Both instants read 01:30 on a New York wall clock (EDT then EST);
        // each maps to the 01:00 label without ambiguity errors.
        let first = bucket_for(utc(2026, 11, 1, 5, 30), New_York, Granularity::HOURLY);
        let second = bucket_for(utc(2026, 11, 1, 6, 30), New_York, Granularity::HOURLY);
        assert_eq!(first.as_str(), "2026-11-01 01:00");
        assert_eq!(second.as_str(), "2026-11-01 01:00");
    }

    #[test]
    fn test_sub_hour_granularity() {
        let g = Granularity::from_minutes(15).unwrap();
        let b = bucket_for(utc(2026, 2, 8, 18, 44), UTC, g);
        assert_eq!(b.as_str(), "2026-02-08 18:30");
    }

    #[test]
    fn test_granularity_validation() {
        assert!(Granularity::from_minutes(0).is_none());
        assert!(Granularity::from_minutes(7).is_none());
        assert!(Granularity::from_minutes(1441).is_none());
        assert_eq!(Granularity::from_minutes(60), Some(Granularity::HOURLY));
        assert!(Granularity::from_minutes(1440).is_some());
    }

    #[test]
    fn test_labels_sort_chronologically() {
        let mut labels = vec![
            bucket_for(utc(2026, 2, 9, 0, 0), UTC, Granularity::HOURLY),
            bucket_for(utc(2026, 2, 8, 19, 0), UTC, Granularity::HOURLY),
            bucket_for(utc(2026, 2, 8, 18, 0), UTC, Granularity::HOURLY),
        ];
        labels.sort();
        let strs: Vec<_> = labels.iter().map(|b| b.as_str()).collect();
        assert_eq!(
            strs,
            vec!["2026-02-08 18:00", "2026-02-08 19:00", "2026-02-09 00:00"]
        );
    }
}
