#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::signal::{SignalKind, SignalReadings};
use crate::species::Species;
use crate::{ContractViolation, UnixTimeSec, Validate};

/// Diagnostic metadata carried with every sample. Never consulted for dedup or equality
/// of tracked fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleProvenance {
    pub fetched_at: Option<String>,
    pub fetched_at_unix: Option<UnixTimeSec>,
    pub sources: Vec<String>,
    pub resolved_signals: Vec<String>,
    pub species_rule: Option<String>,
    pub raw_payload_path: Option<String>,
    pub raw_payload_sha256: Option<String>,
    pub error: Option<String>,
}

/// One observation of the accelerator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: UnixTimeSec,
    pub energy: Option<f64>,
    pub speed: Option<f64>,
    pub beam_intensity1: Option<f64>,
    pub beam_intensity2: Option<f64>,
    pub luminosity: Option<f64>,
    pub species: Species,
    #[serde(default)]
    pub provenance: SampleProvenance,
}

impl Sample {
    /// Record written to the snapshot when the source could not be read.
    pub fn degraded(timestamp: UnixTimeSec, provenance: SampleProvenance) -> Self {
        Self {
            timestamp,
            energy: None,
            speed: None,
            beam_intensity1: None,
            beam_intensity2: None,
            luminosity: None,
            species: Species::Unknown,
            provenance,
        }
    }

    pub fn readings(&self) -> SignalReadings {
        SignalReadings {
            energy: self.energy,
            beam_intensity1: self.beam_intensity1,
            beam_intensity2: self.beam_intensity2,
            luminosity: self.luminosity,
        }
    }

    pub fn signal(&self, kind: SignalKind) -> Option<f64> {
        self.readings().get(kind)
    }
}

impl Validate for Sample {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.timestamp < 0 {
            return Err(ContractViolation::InvalidValue {
                field: "sample.timestamp",
                reason: "must be >= 0",
            });
        }
        if self.energy.is_some() != self.speed.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "sample.speed",
                reason: "must be present iff energy is present",
            });
        }
        for (field, value) in [
            ("sample.energy", self.energy),
            ("sample.speed", self.speed),
            ("sample.beam_intensity1", self.beam_intensity1),
            ("sample.beam_intensity2", self.beam_intensity2),
            ("sample.luminosity", self.luminosity),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ContractViolation::NotFinite { field });
            }
        }
        if let Some(speed) = self.speed {
            if !(0.0..=1.0).contains(&speed) {
                return Err(ContractViolation::InvalidRange {
                    field: "sample.speed",
                    min: 0.0,
                    max: 1.0,
                    got: speed,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            timestamp: 1_700_000_100,
            energy: Some(6800.0),
            speed: Some(0.99999999),
            beam_intensity1: Some(1.1e14),
            beam_intensity2: None,
            luminosity: None,
            species: Species::Protons,
            provenance: SampleProvenance::default(),
        }
    }

    #[test]
    fn at_sample_01_absent_signals_serialize_as_null() {
        let value = serde_json::to_value(sample()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj["beamIntensity2"].is_null());
        assert!(obj["luminosity"].is_null());
        assert_eq!(obj["species"], "protons");
        assert_eq!(obj["timestamp"], 1_700_000_100);
        assert!(obj["provenance"]["error"].is_null());
    }

    #[test]
    fn at_sample_02_speed_without_energy_is_rejected() {
        let mut s = sample();
        s.energy = None;
        assert!(matches!(
            s.validate(),
            Err(ContractViolation::InvalidValue {
                field: "sample.speed",
                ..
            })
        ));
    }

    #[test]
    fn at_sample_03_speed_out_of_range_is_rejected() {
        let mut s = sample();
        s.speed = Some(1.5);
        assert!(matches!(
            s.validate(),
            Err(ContractViolation::InvalidRange { .. })
        ));
    }

    #[test]
    fn at_sample_04_degraded_record_is_valid_and_unknown() {
        let s = Sample::degraded(10, SampleProvenance::default());
        assert!(s.validate().is_ok());
        assert_eq!(s.species, Species::Unknown);
        assert!(s.readings().resolved().is_empty());
    }

    #[test]
    fn at_sample_05_missing_provenance_deserializes_to_default() {
        let raw = r#"{"timestamp":5,"energy":null,"speed":null,"beamIntensity1":null,
            "beamIntensity2":null,"luminosity":null,"species":"ions"}"#;
        let s: Sample = serde_json::from_str(raw).unwrap();
        assert_eq!(s.species, Species::Ions);
        assert_eq!(s.provenance, SampleProvenance::default());
    }
}
