#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use beamlog_kernel_contracts::history::{BucketMode, HistoryPolicy};
use beamlog_kernel_contracts::sample::Sample;
use beamlog_kernel_contracts::UnixTimeSec;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fs_io::{self, StorageError};

/// The dedup-relevant view of a stored record. Parsed leniently so that a record written by
/// an older schema still anchors the append decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHead {
    pub timestamp: UnixTimeSec,
    pub energy: Option<f64>,
    pub beam_intensity1: Option<f64>,
    pub beam_intensity2: Option<f64>,
    pub luminosity: Option<f64>,
    pub species: Option<String>,
}

impl RecordHead {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp,
            energy: sample.energy,
            beam_intensity1: sample.beam_intensity1,
            beam_intensity2: sample.beam_intensity2,
            luminosity: sample.luminosity,
            species: Some(sample.species.as_str().to_string()),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let timestamp = record_timestamp(value)?;
        let number = |key: &str| value.get(key).and_then(Value::as_f64);
        Some(Self {
            timestamp,
            energy: number("energy"),
            beam_intensity1: number("beamIntensity1"),
            beam_intensity2: number("beamIntensity2"),
            luminosity: number("luminosity"),
            species: value
                .get("species")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn same_tracked_fields(&self, other: &RecordHead) -> bool {
        self.energy == other.energy
            && self.beam_intensity1 == other.beam_intensity1
            && self.beam_intensity2 == other.beam_intensity2
            && self.luminosity == other.luminosity
            && self.species == other.species
    }
}

/// Numeric `timestamp` of a stored JSON record, if it has one.
pub fn record_timestamp(value: &Value) -> Option<UnixTimeSec> {
    let ts = value.get("timestamp")?;
    ts.as_i64().or_else(|| {
        ts.as_f64()
            .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
            .map(|v| v.floor() as i64)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendDecision {
    Appended,
    /// Same bucket (exact mode) or unchanged values inside the window (tolerance mode).
    SkippedDuplicate { last_timestamp: UnixTimeSec },
    /// Candidate is older than the last stored record.
    SkippedStale { last_timestamp: UnixTimeSec },
}

impl AppendDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppendDecision::Appended => "appended",
            AppendDecision::SkippedDuplicate { .. } => "skipped_duplicate",
            AppendDecision::SkippedStale { .. } => "skipped_stale",
        }
    }
}

/// Pure append rule shared by both bucket modes.
pub fn append_decision(
    mode: BucketMode,
    last: Option<&RecordHead>,
    candidate: &RecordHead,
) -> AppendDecision {
    let Some(last) = last else {
        return AppendDecision::Appended;
    };
    let last_timestamp = last.timestamp;
    if candidate.timestamp < last_timestamp {
        return AppendDecision::SkippedStale { last_timestamp };
    }
    match mode {
        BucketMode::Exact { .. } => {
            if candidate.timestamp > last_timestamp {
                AppendDecision::Appended
            } else {
                AppendDecision::SkippedDuplicate { last_timestamp }
            }
        }
        BucketMode::Tolerance { tolerance_seconds } => {
            let gap = candidate.timestamp.abs_diff(last_timestamp);
            if gap > tolerance_seconds || !candidate.same_tracked_fields(last) {
                AppendDecision::Appended
            } else {
                AppendDecision::SkippedDuplicate { last_timestamp }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimStats {
    pub kept: usize,
    pub dropped_expired: usize,
    pub dropped_corrupt: usize,
    pub dropped_cap: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimOutcome {
    /// No log file exists yet.
    NoLog,
    Rewritten(TrimStats),
    /// The untrimmed file was left in place.
    Failed { reason: String },
}

/// Append-only JSON Lines history with retention trimming.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    policy: HistoryPolicy,
}

impl HistoryStore {
    pub fn new(path: PathBuf, policy: HistoryPolicy) -> Self {
        Self { path, policy }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    pub fn bucket_timestamp(&self, now: UnixTimeSec) -> UnixTimeSec {
        self.policy.bucket_mode.bucket_for(now)
    }

    /// Most recent readable record, found by reading backwards from the file tail.
    /// Unreadable trailing lines are skipped, so only a log with no readable record at all
    /// reads as empty.
    pub fn last_record(&self) -> Result<Option<RecordHead>, StorageError> {
        let mut skipped = false;
        let head = fs_io::read_last_matching_line(&self.path, |line| {
            let head = serde_json::from_str::<Value>(line)
                .ok()
                .as_ref()
                .and_then(RecordHead::from_value);
            skipped |= head.is_none();
            head
        })?;
        if skipped {
            warn!(path = %self.path.display(), "unreadable history lines skipped while locating the last record");
        }
        Ok(head)
    }

    /// Appends `sample` unless it falls into the bucket of the last stored record.
    pub fn append(&self, sample: &Sample) -> Result<AppendDecision, StorageError> {
        let last = self.last_record()?;
        let decision = append_decision(
            self.policy.bucket_mode,
            last.as_ref(),
            &RecordHead::from_sample(sample),
        );
        if decision == AppendDecision::Appended {
            let line = serde_json::to_string(sample)?;
            fs_io::append_line(&self.path, &line)?;
        }
        debug!(
            path = %self.path.display(),
            timestamp = sample.timestamp,
            decision = decision.as_str(),
            "history append evaluated"
        );
        Ok(decision)
    }

    /// Drops expired and corrupt lines, enforces the point cap, and rewrites the log.
    /// Never fails the caller: on error the untrimmed file stays and the reason is returned.
    pub fn trim(&self, now: UnixTimeSec) -> TrimOutcome {
        match self.try_trim(now) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "history trim failed; log left untrimmed");
                TrimOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn try_trim(&self, now: UnixTimeSec) -> Result<TrimOutcome, StorageError> {
        let Some(raw) = fs_io::read_text_if_exists(&self.path)? else {
            return Ok(TrimOutcome::NoLog);
        };
        let cutoff = self.policy.cutoff(now);
        let mut stats = TrimStats::default();
        let mut kept: Vec<&str> = Vec::new();
        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let timestamp = serde_json::from_str::<Value>(line)
                .ok()
                .as_ref()
                .and_then(record_timestamp);
            match timestamp {
                None => stats.dropped_corrupt += 1,
                Some(ts) if ts < cutoff => stats.dropped_expired += 1,
                Some(_) => kept.push(line),
            }
        }
        if kept.len() > self.policy.max_points {
            stats.dropped_cap = kept.len() - self.policy.max_points;
            kept.drain(..stats.dropped_cap);
        }
        stats.kept = kept.len();

        let mut body = String::with_capacity(raw.len());
        for line in &kept {
            body.push_str(line);
            body.push('\n');
        }
        fs_io::atomic_write(&self.path, body.as_bytes())?;
        debug!(
            path = %self.path.display(),
            kept = stats.kept,
            dropped_expired = stats.dropped_expired,
            dropped_corrupt = stats.dropped_corrupt,
            dropped_cap = stats.dropped_cap,
            "history trimmed"
        );
        Ok(TrimOutcome::Rewritten(stats))
    }

    /// Every parseable sample in file order. Unreadable lines are skipped.
    pub fn read_samples(&self) -> Result<Vec<Sample>, StorageError> {
        let Some(raw) = fs_io::read_text_if_exists(&self.path)? else {
            return Ok(Vec::new());
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Sample>(line.trim()).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn head(ts: UnixTimeSec, energy: Option<f64>) -> RecordHead {
        RecordHead {
            timestamp: ts,
            energy,
            beam_intensity1: None,
            beam_intensity2: None,
            luminosity: None,
            species: Some("protons".to_string()),
        }
    }

    const EXACT: BucketMode = BucketMode::Exact {
        interval_seconds: 300,
    };
    const TOLERANT: BucketMode = BucketMode::Tolerance {
        tolerance_seconds: 60,
    };

    #[test]
    fn at_hist_01_first_record_always_appends() {
        assert_eq!(
            append_decision(EXACT, None, &head(0, None)),
            AppendDecision::Appended
        );
    }

    #[test]
    fn at_hist_02_exact_mode_appends_only_strictly_newer_buckets() {
        let last = head(600, Some(1.0));
        assert_eq!(
            append_decision(EXACT, Some(&last), &head(600, Some(2.0))),
            AppendDecision::SkippedDuplicate {
                last_timestamp: 600
            }
        );
        assert_eq!(
            append_decision(EXACT, Some(&last), &head(900, Some(1.0))),
            AppendDecision::Appended
        );
        assert_eq!(
            append_decision(EXACT, Some(&last), &head(300, Some(1.0))),
            AppendDecision::SkippedStale {
                last_timestamp: 600
            }
        );
    }

    #[test]
    fn at_hist_03_tolerance_mode_appends_on_gap_or_changed_field() {
        let last = head(1_000, Some(450.0));
        assert_eq!(
            append_decision(TOLERANT, Some(&last), &head(1_030, Some(450.0))),
            AppendDecision::SkippedDuplicate {
                last_timestamp: 1_000
            }
        );
        assert_eq!(
            append_decision(TOLERANT, Some(&last), &head(1_060, Some(450.0))),
            AppendDecision::SkippedDuplicate {
                last_timestamp: 1_000
            }
        );
        assert_eq!(
            append_decision(TOLERANT, Some(&last), &head(1_061, Some(450.0))),
            AppendDecision::Appended
        );
        assert_eq!(
            append_decision(TOLERANT, Some(&last), &head(1_010, Some(6800.0))),
            AppendDecision::Appended
        );
    }

    #[test]
    fn at_hist_04_record_head_reads_lenient_json() {
        let v = json!({"timestamp": 12.9, "energy": "bad", "species": "ions"});
        let h = RecordHead::from_value(&v).unwrap();
        assert_eq!(h.timestamp, 12);
        assert_eq!(h.energy, None);
        assert_eq!(h.species.as_deref(), Some("ions"));
        assert!(RecordHead::from_value(&json!({"timestamp": "12"})).is_none());
        assert!(RecordHead::from_value(&json!([1])).is_none());
    }
}
