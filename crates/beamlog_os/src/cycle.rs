#![forbid(unsafe_code)]

use beamlog_engines::sample_build::{SampleBuilder, SampleContext};
use beamlog_engines::source_fetch::{fetch_bundle, FetchError, SourceFetcher};
use beamlog_engines::species::SpeciesClassifier;
use beamlog_kernel_contracts::sample::{Sample, SampleProvenance};
use beamlog_kernel_contracts::signal::SignalKind;
use beamlog_kernel_contracts::Validate;
use beamlog_storage::classifier_state::ClassifierStateStore;
use beamlog_storage::fs_io;
use beamlog_storage::history::{AppendDecision, HistoryStore, TrimOutcome};
use beamlog_storage::snapshot::SnapshotWriter;
use beamlog_storage::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::CollectorConfig;

pub const EXIT_FETCH_FAILED: i32 = 3;
pub const EXIT_STORAGE_FAILED: i32 = 4;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CycleError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CycleError::Fetch(_) => EXIT_FETCH_FAILED,
            CycleError::Storage(_) => EXIT_STORAGE_FAILED,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub sample: Sample,
    pub append: AppendDecision,
    pub trim: TrimOutcome,
}

/// One pull-and-persist pass: fetch, build, snapshot, remember species, append, trim.
///
/// The snapshot is written before the history append, so the latest view stays live when
/// the append is skipped as a duplicate. A trim failure is reported in the returned
/// [`CycleReport`] and never fails the cycle.
pub fn run_cycle<F>(
    config: &CollectorConfig,
    fetcher: &F,
    now: DateTime<Utc>,
) -> Result<CycleReport, CycleError>
where
    F: SourceFetcher + Sync + ?Sized,
{
    let history = HistoryStore::new(config.history_path.clone(), config.history_policy());
    let snapshot = SnapshotWriter::new(config.latest_path.clone());
    let state = ClassifierStateStore::new(config.state_path.clone());
    let bucket_time = history.bucket_timestamp(now.timestamp());
    let last_known = state.load();

    let bundle = match fetch_bundle(fetcher, &config.source_plan) {
        Ok(bundle) => bundle,
        Err(err) => {
            error!(url = %err.url(), error = %err, "source fetch failed");
            if config.write_degraded_snapshot {
                write_degraded_snapshot(&snapshot, bucket_time, now, &err);
            }
            return Err(CycleError::Fetch(err));
        }
    };

    let builder = SampleBuilder::new(SpeciesClassifier::new(config.classifier));
    let mut sample = builder.build(
        &bundle,
        &SampleContext {
            bucket_time,
            fetched_at: now,
            last_known,
            forced: config.forced_species,
        },
    );
    if let Err(violation) = sample.validate() {
        warn!(error = %violation, "built sample violates its contract");
    }

    if let Some(path) = &config.raw_payload_path {
        match fs_io::atomic_write(path, bundle.primary.raw.as_bytes()) {
            Ok(()) => sample.provenance.raw_payload_path = Some(path.display().to_string()),
            Err(err) => warn!(error = %err, "raw payload not written"),
        }
    }

    snapshot.write_latest(&sample)?;

    if let Err(err) = state.save(sample.species) {
        warn!(error = %err, "classifier state not saved");
    }

    let append = history.append(&sample)?;
    let trim = history.trim(now.timestamp());

    let degraded: Vec<&str> = sample
        .readings()
        .missing()
        .into_iter()
        .map(SignalKind::as_str)
        .collect();
    info!(
        timestamp = sample.timestamp,
        energy = ?sample.energy,
        speed = ?sample.speed,
        beam_intensity1 = ?sample.beam_intensity1,
        beam_intensity2 = ?sample.beam_intensity2,
        luminosity = ?sample.luminosity,
        species = sample.species.as_str(),
        rule = sample.provenance.species_rule.as_deref().unwrap_or("none"),
        append = append.as_str(),
        trim = %trim_summary(&trim),
        degraded = %degraded.join(","),
        "cycle complete"
    );

    Ok(CycleReport {
        sample,
        append,
        trim,
    })
}

fn write_degraded_snapshot(
    snapshot: &SnapshotWriter,
    bucket_time: i64,
    now: DateTime<Utc>,
    err: &FetchError,
) {
    let provenance = SampleProvenance {
        fetched_at: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        fetched_at_unix: Some(now.timestamp()),
        sources: vec![err.url()],
        error: Some(err.to_string()),
        ..SampleProvenance::default()
    };
    if let Err(write_err) = snapshot.write_latest(&Sample::degraded(bucket_time, provenance)) {
        warn!(error = %write_err, "degraded snapshot not written");
    }
}

fn trim_summary(trim: &TrimOutcome) -> String {
    match trim {
        TrimOutcome::NoLog => "no_log".to_string(),
        TrimOutcome::Rewritten(stats) => format!(
            "kept:{} expired:{} corrupt:{} cap:{}",
            stats.kept, stats.dropped_expired, stats.dropped_corrupt, stats.dropped_cap
        ),
        TrimOutcome::Failed { reason } => format!("failed:{reason}"),
    }
}
