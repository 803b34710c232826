#![forbid(unsafe_code)]

use crate::UnixTimeSec;

/// Dedup discipline for the history log. One mode is chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketMode {
    /// Timestamps are truncated to a fixed interval boundary; at most one record per boundary.
    Exact { interval_seconds: u64 },
    /// Timestamps are the fetch instant; records closer than the window with unchanged
    /// values collapse into one.
    Tolerance { tolerance_seconds: u64 },
}

impl BucketMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketMode::Exact { .. } => "exact",
            BucketMode::Tolerance { .. } => "tolerance",
        }
    }

    /// Timestamp a sample observed at `now` is stamped with.
    pub fn bucket_for(self, now: UnixTimeSec) -> UnixTimeSec {
        match self {
            BucketMode::Exact { interval_seconds } => {
                let interval = i64::try_from(interval_seconds.max(1)).unwrap_or(i64::MAX);
                now.div_euclid(interval) * interval
            }
            BucketMode::Tolerance { .. } => now,
        }
    }
}

/// Retention and dedup settings owned by the history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub bucket_mode: BucketMode,
    pub retention_seconds: u64,
    pub max_points: usize,
}

impl HistoryPolicy {
    pub fn cutoff(&self, now: UnixTimeSec) -> UnixTimeSec {
        let retention = i64::try_from(self.retention_seconds).unwrap_or(i64::MAX);
        now.saturating_sub(retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_bucket_01_exact_mode_truncates_to_interval_boundary() {
        let mode = BucketMode::Exact {
            interval_seconds: 300,
        };
        assert_eq!(mode.bucket_for(1_700_000_123), 1_700_000_100);
        assert_eq!(mode.bucket_for(1_700_000_100), 1_700_000_100);
        assert_eq!(mode.bucket_for(599), 300);
    }

    #[test]
    fn at_bucket_02_tolerance_mode_keeps_fetch_time() {
        let mode = BucketMode::Tolerance {
            tolerance_seconds: 60,
        };
        assert_eq!(mode.bucket_for(1_700_000_123), 1_700_000_123);
    }

    #[test]
    fn at_bucket_03_cutoff_saturates_for_huge_retention() {
        let policy = HistoryPolicy {
            bucket_mode: BucketMode::Tolerance {
                tolerance_seconds: 0,
            },
            retention_seconds: u64::MAX,
            max_points: 10,
        };
        assert_eq!(policy.cutoff(100), 100 - i64::MAX);
        let policy = HistoryPolicy {
            retention_seconds: 3600,
            ..policy
        };
        assert_eq!(policy.cutoff(10_000), 6_400);
    }
}
