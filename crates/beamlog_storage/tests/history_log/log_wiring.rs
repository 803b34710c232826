#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use beamlog_kernel_contracts::history::{BucketMode, HistoryPolicy};
use beamlog_kernel_contracts::sample::{Sample, SampleProvenance};
use beamlog_kernel_contracts::species::Species;
use beamlog_kernel_contracts::UnixTimeSec;
use beamlog_storage::history::{record_timestamp, AppendDecision, HistoryStore, TrimOutcome, TrimStats};
use tempfile::TempDir;

const NOW: UnixTimeSec = 1_700_000_000;

fn exact_policy(retention_seconds: u64, max_points: usize) -> HistoryPolicy {
    HistoryPolicy {
        bucket_mode: BucketMode::Exact {
            interval_seconds: 300,
        },
        retention_seconds,
        max_points,
    }
}

fn sample(timestamp: UnixTimeSec, energy: Option<f64>) -> Sample {
    Sample {
        timestamp,
        energy,
        speed: energy.map(|_| 0.5),
        beam_intensity1: None,
        beam_intensity2: None,
        luminosity: Some(1.0),
        species: Species::Protons,
        provenance: SampleProvenance::default(),
    }
}

fn timestamps(path: &Path) -> Vec<UnixTimeSec> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| record_timestamp(&serde_json::from_str(line).unwrap()).unwrap())
        .collect()
}

fn write_lines(path: &Path, lines: &[String]) {
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body).unwrap();
}

fn line_at(ts: UnixTimeSec) -> String {
    serde_json::to_string(&sample(ts, Some(450.0))).unwrap()
}

#[test]
fn at_history_log_01_same_bucket_twice_stores_one_line() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(dir.path().join("history.jsonl"), exact_policy(86_400, 100));
    let bucket = store.bucket_timestamp(NOW + 17);
    assert_eq!(bucket, NOW - NOW % 300);

    let first = store.append(&sample(bucket, Some(6800.0))).unwrap();
    let second = store.append(&sample(bucket, Some(6800.0))).unwrap();
    assert_eq!(first, AppendDecision::Appended);
    assert_eq!(
        second,
        AppendDecision::SkippedDuplicate {
            last_timestamp: bucket
        }
    );
    assert_eq!(timestamps(store.path()), vec![bucket]);
}

#[test]
fn at_history_log_02_increasing_buckets_store_one_line_each() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(dir.path().join("history.jsonl"), exact_policy(86_400, 100));
    let buckets: Vec<UnixTimeSec> = (0..5).map(|i| 1_000_200 + i * 300).collect();
    for ts in &buckets {
        store.append(&sample(*ts, None)).unwrap();
        store.append(&sample(*ts, Some(1.0))).unwrap();
    }
    assert_eq!(timestamps(store.path()), buckets);
    assert_eq!(store.read_samples().unwrap().len(), 5);
}

#[test]
fn at_history_log_03_stale_candidate_is_never_appended() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(dir.path().join("history.jsonl"), exact_policy(86_400, 100));
    store.append(&sample(900, None)).unwrap();
    let out = store.append(&sample(600, None)).unwrap();
    assert_eq!(out, AppendDecision::SkippedStale { last_timestamp: 900 });
    assert_eq!(timestamps(store.path()), vec![900]);
}

#[test]
fn at_history_log_04_tolerance_mode_collapses_unchanged_values_in_window() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(
        dir.path().join("history.jsonl"),
        HistoryPolicy {
            bucket_mode: BucketMode::Tolerance {
                tolerance_seconds: 60,
            },
            retention_seconds: 3_600,
            max_points: 100,
        },
    );
    assert_eq!(store.bucket_timestamp(NOW + 17), NOW + 17);
    store.append(&sample(NOW, Some(450.0))).unwrap();
    store.append(&sample(NOW + 30, Some(450.0))).unwrap();
    store.append(&sample(NOW + 40, Some(6800.0))).unwrap();
    store.append(&sample(NOW + 200, Some(6800.0))).unwrap();
    assert_eq!(timestamps(store.path()), vec![NOW, NOW + 40, NOW + 200]);
}

#[test]
fn at_history_log_05_trim_drops_records_outside_retention() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    write_lines(&path, &[line_at(NOW - 7_200), line_at(NOW - 10)]);
    let store = HistoryStore::new(path.clone(), exact_policy(3_600, 100));

    let out = store.trim(NOW);
    assert_eq!(
        out,
        TrimOutcome::Rewritten(TrimStats {
            kept: 1,
            dropped_expired: 1,
            dropped_corrupt: 0,
            dropped_cap: 0,
        })
    );
    assert_eq!(timestamps(&path), vec![NOW - 10]);
}

#[test]
fn at_history_log_06_cap_keeps_only_newest_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    let lines: Vec<String> = (0..10).map(|i| line_at(NOW - 1_000 + i * 10)).collect();
    write_lines(&path, &lines);
    let store = HistoryStore::new(path.clone(), exact_policy(86_400, 3));

    match store.trim(NOW) {
        TrimOutcome::Rewritten(stats) => {
            assert_eq!(stats.kept, 3);
            assert_eq!(stats.dropped_cap, 7);
        }
        other => panic!("unexpected trim outcome: {other:?}"),
    }
    assert_eq!(timestamps(&path), vec![NOW - 930, NOW - 920, NOW - 910]);
}

#[test]
fn at_history_log_07_corrupt_lines_are_dropped_and_valid_ones_survive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    let mut lines = vec![
        line_at(NOW - 300),
        "{\"timestamp\": 17".to_string(),
        "not json at all".to_string(),
        line_at(NOW - 200),
        "{\"energy\": 1}".to_string(),
        String::new(),
        line_at(NOW - 100),
    ];
    lines.push("{\"timestamp\":\"NOW\"}".to_string());
    write_lines(&path, &lines);
    let store = HistoryStore::new(path.clone(), exact_policy(3_600, 100));

    match store.trim(NOW) {
        TrimOutcome::Rewritten(stats) => {
            assert_eq!(stats.kept, 3);
            assert_eq!(stats.dropped_corrupt, 4);
        }
        other => panic!("unexpected trim outcome: {other:?}"),
    }
    assert_eq!(timestamps(&path), vec![NOW - 300, NOW - 200, NOW - 100]);
    assert!(!dir.path().join("history.jsonl.tmp").exists());
}

#[test]
fn at_history_log_08_everything_expired_leaves_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    write_lines(&path, &[line_at(10), line_at(20)]);
    let store = HistoryStore::new(path.clone(), exact_policy(60, 100));

    assert!(matches!(store.trim(NOW), TrimOutcome::Rewritten(_)));
    assert!(path.exists());
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
}

#[test]
fn at_history_log_09_missing_log_trims_to_no_log_without_creating_it() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    let store = HistoryStore::new(path.clone(), exact_policy(60, 100));
    assert_eq!(store.trim(NOW), TrimOutcome::NoLog);
    assert!(!path.exists());
}

#[test]
fn at_history_log_10_trim_failure_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    // A directory in place of the log file cannot be read as text.
    let path = dir.path().join("history.jsonl");
    fs::create_dir(&path).unwrap();
    let store = HistoryStore::new(path.clone(), exact_policy(60, 100));
    assert!(matches!(store.trim(NOW), TrimOutcome::Failed { .. }));
    assert!(path.is_dir());
}

#[test]
fn at_history_log_11_corrupt_tail_does_not_block_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    fs::write(&path, format!("{}\n{{\"timestamp\":", line_at(600))).unwrap();
    let store = HistoryStore::new(path.clone(), exact_policy(86_400, 100));

    assert_eq!(store.append(&sample(900, None)).unwrap(), AppendDecision::Appended);
    let raw = fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 3);
    assert!(raw.ends_with("\n"));
    assert_eq!(store.read_samples().unwrap().len(), 2);
}

#[test]
fn at_history_log_12_corrupt_tail_still_dedups_against_last_readable_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    fs::write(&path, format!("{}\ngarbage\n", line_at(NOW - 100))).unwrap();
    let store = HistoryStore::new(path.clone(), exact_policy(86_400, 100));

    assert_eq!(
        store.append(&sample(NOW - 100, Some(450.0))).unwrap(),
        AppendDecision::SkippedDuplicate {
            last_timestamp: NOW - 100
        }
    );
    assert!(matches!(store.trim(NOW), TrimOutcome::Rewritten(_)));
    assert_eq!(timestamps(&path), vec![NOW - 100]);
}

#[test]
fn at_history_log_13_corrupt_tail_does_not_admit_older_candidate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");
    fs::write(&path, format!("{}\n{{\"timestamp\":\n", line_at(NOW - 100))).unwrap();
    let store = HistoryStore::new(path.clone(), exact_policy(86_400, 100));

    assert_eq!(
        store.append(&sample(NOW - 400, None)).unwrap(),
        AppendDecision::SkippedStale {
            last_timestamp: NOW - 100
        }
    );
    store.trim(NOW);
    assert_eq!(timestamps(&path), vec![NOW - 100]);
}
