#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Accelerator operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Protons,
    Ions,
    Unknown,
}

impl Species {
    pub fn as_str(self) -> &'static str {
        match self {
            Species::Protons => "protons",
            Species::Ions => "ions",
            Species::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Species::Unknown)
    }

    /// Operator override parsing. Singular and plural forms are accepted in any case;
    /// everything else, the empty string included, means "no override".
    pub fn parse_override(raw: &str) -> Option<Species> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "protons" | "proton" => Some(Species::Protons),
            "ions" | "ion" => Some(Species::Ions),
            _ => None,
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted last-known species, read before classification and rewritten after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierState {
    pub species: Species,
}
