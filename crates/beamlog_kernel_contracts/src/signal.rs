#![forbid(unsafe_code)]

/// The four telemetry signals the sampler recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalKind {
    Energy,
    BeamIntensity1,
    BeamIntensity2,
    Luminosity,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Energy,
        SignalKind::BeamIntensity1,
        SignalKind::BeamIntensity2,
        SignalKind::Luminosity,
    ];

    /// Field name used in the sample JSON schema.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Energy => "energy",
            SignalKind::BeamIntensity1 => "beamIntensity1",
            SignalKind::BeamIntensity2 => "beamIntensity2",
            SignalKind::Luminosity => "luminosity",
        }
    }
}

/// One cycle's worth of extracted signal values. `None` means the source did not expose it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalReadings {
    pub energy: Option<f64>,
    pub beam_intensity1: Option<f64>,
    pub beam_intensity2: Option<f64>,
    pub luminosity: Option<f64>,
}

impl SignalReadings {
    pub fn get(&self, kind: SignalKind) -> Option<f64> {
        match kind {
            SignalKind::Energy => self.energy,
            SignalKind::BeamIntensity1 => self.beam_intensity1,
            SignalKind::BeamIntensity2 => self.beam_intensity2,
            SignalKind::Luminosity => self.luminosity,
        }
    }

    pub fn set(&mut self, kind: SignalKind, value: Option<f64>) {
        match kind {
            SignalKind::Energy => self.energy = value,
            SignalKind::BeamIntensity1 => self.beam_intensity1 = value,
            SignalKind::BeamIntensity2 => self.beam_intensity2 = value,
            SignalKind::Luminosity => self.luminosity = value,
        }
    }

    /// Larger of the two beam intensities, considering only those present.
    pub fn max_intensity(&self) -> Option<f64> {
        match (self.beam_intensity1, self.beam_intensity2) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    pub fn resolved(&self) -> Vec<SignalKind> {
        SignalKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_some())
            .collect()
    }

    pub fn missing(&self) -> Vec<SignalKind> {
        SignalKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_none())
            .collect()
    }
}
