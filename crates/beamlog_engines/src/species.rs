#![forbid(unsafe_code)]

use beamlog_kernel_contracts::signal::SignalReadings;
use beamlog_kernel_contracts::species::Species;
use beamlog_kernel_contracts::ReasonCodeId;

pub mod reason_codes {
    use beamlog_kernel_contracts::ReasonCodeId;

    // Species classifier reason-code namespace.
    pub const SPECIES_FORCED_OVERRIDE: ReasonCodeId = ReasonCodeId(0x5350_0001);
    pub const SPECIES_TEXT_SIGNATURE: ReasonCodeId = ReasonCodeId(0x5350_0002);
    pub const SPECIES_ENERGY_THRESHOLD: ReasonCodeId = ReasonCodeId(0x5350_0003);
    pub const SPECIES_ENERGY_INTENSITY: ReasonCodeId = ReasonCodeId(0x5350_0004);
    pub const SPECIES_INTENSITY_ONLY: ReasonCodeId = ReasonCodeId(0x5350_0005);
    pub const SPECIES_HYSTERESIS: ReasonCodeId = ReasonCodeId(0x5350_0006);
    pub const SPECIES_DEFAULT: ReasonCodeId = ReasonCodeId(0x5350_0007);
}

const ION_TOKENS: &[&str] = &["ion", "ions", "lead", "pb", "pb208", "pbpb", "heavy"];
const PROTON_TOKENS: &[&str] = &["proton", "protons"];

/// Which decision-table row produced a species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeciesRule {
    ForcedOverride,
    TextSignature,
    EnergyThreshold,
    EnergyIntensity,
    IntensityOnly,
    Hysteresis,
    Default,
}

impl SpeciesRule {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeciesRule::ForcedOverride => "forced_override",
            SpeciesRule::TextSignature => "text_signature",
            SpeciesRule::EnergyThreshold => "energy_threshold",
            SpeciesRule::EnergyIntensity => "energy_intensity",
            SpeciesRule::IntensityOnly => "intensity_only",
            SpeciesRule::Hysteresis => "hysteresis",
            SpeciesRule::Default => "default",
        }
    }

    pub fn reason_code(self) -> ReasonCodeId {
        match self {
            SpeciesRule::ForcedOverride => reason_codes::SPECIES_FORCED_OVERRIDE,
            SpeciesRule::TextSignature => reason_codes::SPECIES_TEXT_SIGNATURE,
            SpeciesRule::EnergyThreshold => reason_codes::SPECIES_ENERGY_THRESHOLD,
            SpeciesRule::EnergyIntensity => reason_codes::SPECIES_ENERGY_INTENSITY,
            SpeciesRule::IntensityOnly => reason_codes::SPECIES_INTENSITY_ONLY,
            SpeciesRule::Hysteresis => reason_codes::SPECIES_HYSTERESIS,
            SpeciesRule::Default => reason_codes::SPECIES_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeciesDecision {
    pub species: Species,
    pub rule: SpeciesRule,
}

/// Heuristic thresholds. Energies are total beam energy in GeV, intensities in source units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesClassifierConfig {
    pub proton_min_energy_gev: f64,
    pub ion_max_energy_gev: f64,
    pub ion_max_intensity: f64,
    pub proton_min_intensity_without_energy: f64,
    pub ion_max_intensity_without_energy: f64,
}

impl SpeciesClassifierConfig {
    pub fn standard_v1() -> Self {
        Self {
            proton_min_energy_gev: 4000.0,
            ion_max_energy_gev: 3500.0,
            ion_max_intensity: 1e12,
            proton_min_intensity_without_energy: 1e13,
            ion_max_intensity_without_energy: 5e11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextSignature {
    pub ion: bool,
    pub proton: bool,
}

/// Scans payload text for whole-word species hints. Words are split on non-alphanumerics and
/// on lower-to-upper case changes, so `heavyIon` and `Pb-Pb` both read as ion hints while
/// `collisions` or `position` do not.
pub fn text_signature(text: &str) -> TextSignature {
    let mut signature = TextSignature::default();
    for token in tokens(text) {
        if ION_TOKENS.contains(&token.as_str()) {
            signature.ion = true;
        } else if PROTON_TOKENS.contains(&token.as_str()) {
            signature.proton = true;
        }
        if signature.ion && signature.proton {
            break;
        }
    }
    signature
}

fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[derive(Debug, Clone)]
pub struct SpeciesClassifier {
    config: SpeciesClassifierConfig,
}

impl SpeciesClassifier {
    pub fn new(config: SpeciesClassifierConfig) -> Self {
        Self { config }
    }

    /// First matching rule wins: override, text, energy, energy+intensity, intensity,
    /// last known species, then protons.
    pub fn classify(
        &self,
        readings: &SignalReadings,
        payload_text: &str,
        last_known: Option<Species>,
        forced: Option<Species>,
    ) -> SpeciesDecision {
        if let Some(species) = forced.filter(|s| s.is_known()) {
            return decision(species, SpeciesRule::ForcedOverride);
        }

        let signature = text_signature(payload_text);
        match (signature.ion, signature.proton) {
            (true, false) => return decision(Species::Ions, SpeciesRule::TextSignature),
            (false, true) => return decision(Species::Protons, SpeciesRule::TextSignature),
            _ => {}
        }

        let cfg = &self.config;
        let max_intensity = readings.max_intensity();
        match readings.energy {
            Some(energy) => {
                if energy >= cfg.proton_min_energy_gev {
                    return decision(Species::Protons, SpeciesRule::EnergyThreshold);
                }
                if energy <= cfg.ion_max_energy_gev
                    && max_intensity.is_some_and(|i| i > 0.0 && i < cfg.ion_max_intensity)
                {
                    return decision(Species::Ions, SpeciesRule::EnergyIntensity);
                }
            }
            None => {
                if let Some(intensity) = max_intensity {
                    if intensity > cfg.proton_min_intensity_without_energy {
                        return decision(Species::Protons, SpeciesRule::IntensityOnly);
                    }
                    if intensity > 0.0 && intensity < cfg.ion_max_intensity_without_energy {
                        return decision(Species::Ions, SpeciesRule::IntensityOnly);
                    }
                }
            }
        }

        if let Some(species) = last_known.filter(|s| s.is_known()) {
            return decision(species, SpeciesRule::Hysteresis);
        }
        decision(Species::Protons, SpeciesRule::Default)
    }
}

fn decision(species: Species, rule: SpeciesRule) -> SpeciesDecision {
    SpeciesDecision { species, rule }
}
