#![forbid(unsafe_code)]

use std::fs;

use beamlog_kernel_contracts::sample::{Sample, SampleProvenance};
use beamlog_kernel_contracts::species::Species;
use beamlog_storage::classifier_state::ClassifierStateStore;
use beamlog_storage::snapshot::SnapshotWriter;
use beamlog_storage::StorageError;
use tempfile::TempDir;

fn sample(timestamp: i64, species: Species) -> Sample {
    Sample {
        timestamp,
        energy: Some(6800.0),
        speed: Some(0.99999999),
        beam_intensity1: Some(2e14),
        beam_intensity2: None,
        luminosity: None,
        species,
        provenance: SampleProvenance {
            sources: vec!["http://source".to_string()],
            ..SampleProvenance::default()
        },
    }
}

#[test]
fn at_snapshot_state_01_latest_is_overwritten_every_write() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path().join("out").join("latest.json"));
    writer.write_latest(&sample(300, Species::Protons)).unwrap();
    writer.write_latest(&sample(300, Species::Ions)).unwrap();

    let text = fs::read_to_string(writer.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["species"], "ions");
    assert_eq!(value["timestamp"], 300);
    assert!(value["beamIntensity2"].is_null());
    assert_eq!(value["provenance"]["sources"][0], "http://source");
    assert!(text.ends_with('\n'));
}

#[test]
fn at_snapshot_state_02_unwritable_snapshot_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "file, not a dir").unwrap();
    let writer = SnapshotWriter::new(blocker.join("latest.json"));
    let err = writer.write_latest(&sample(0, Species::Protons)).unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));
}

#[test]
fn at_snapshot_state_03_state_survives_across_store_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("classifier_state.json");
    ClassifierStateStore::new(path.clone())
        .save(Species::Protons)
        .unwrap();
    assert_eq!(
        ClassifierStateStore::new(path).load(),
        Some(Species::Protons)
    );
}
