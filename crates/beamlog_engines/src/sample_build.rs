#![forbid(unsafe_code)]

use beamlog_kernel_contracts::sample::{Sample, SampleProvenance};
use beamlog_kernel_contracts::signal::{SignalKind, SignalReadings};
use beamlog_kernel_contracts::species::Species;
use beamlog_kernel_contracts::UnixTimeSec;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::field_extract;
use crate::physics::beta_from_energy;
use crate::source_fetch::FetchBundle;
use crate::species::{SpeciesClassifier, SpeciesDecision};

/// Per-cycle inputs that come from outside the fetched documents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleContext {
    pub bucket_time: UnixTimeSec,
    pub fetched_at: DateTime<Utc>,
    pub last_known: Option<Species>,
    pub forced: Option<Species>,
}

#[derive(Debug, Clone)]
pub struct SampleBuilder {
    classifier: SpeciesClassifier,
}

impl SampleBuilder {
    pub fn new(classifier: SpeciesClassifier) -> Self {
        Self { classifier }
    }

    pub fn build(&self, bundle: &FetchBundle, ctx: &SampleContext) -> Sample {
        let mut readings = SignalReadings::default();
        for kind in SignalKind::ALL {
            let value = bundle
                .document_for(kind)
                .and_then(|doc| field_extract::extract(doc, kind));
            readings.set(kind, value);
        }

        let decision = self.classifier.classify(
            &readings,
            &bundle.combined_text(),
            ctx.last_known,
            ctx.forced,
        );

        let provenance = SampleProvenance {
            fetched_at: Some(ctx.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            fetched_at_unix: Some(ctx.fetched_at.timestamp()),
            sources: bundle.source_urls(),
            resolved_signals: readings
                .resolved()
                .into_iter()
                .map(|kind| kind.as_str().to_string())
                .collect(),
            species_rule: Some(decision.rule.as_str().to_string()),
            raw_payload_path: None,
            raw_payload_sha256: Some(sha256_hex(bundle.primary.raw.as_bytes())),
            error: None,
        };

        assemble(ctx.bucket_time, &readings, decision, provenance)
    }
}

fn assemble(
    timestamp: UnixTimeSec,
    readings: &SignalReadings,
    decision: SpeciesDecision,
    provenance: SampleProvenance,
) -> Sample {
    Sample {
        timestamp,
        energy: readings.energy,
        speed: readings.energy.map(beta_from_energy),
        beam_intensity1: readings.beam_intensity1,
        beam_intensity2: readings.beam_intensity2,
        luminosity: readings.luminosity,
        species: decision.species,
        provenance,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
