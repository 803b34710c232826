#![forbid(unsafe_code)]

use std::path::PathBuf;

use beamlog_engines::source_fetch::{HttpFetchConfig, SourcePlan};
use beamlog_engines::species::SpeciesClassifierConfig;
use beamlog_kernel_contracts::history::{BucketMode, HistoryPolicy};
use beamlog_kernel_contracts::signal::SignalKind;
use beamlog_kernel_contracts::species::Species;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const RETENTION_DAYS_DEFAULT: u64 = 7;
pub const MAX_POINTS_DEFAULT: usize = 20_000;
pub const SAMPLE_INTERVAL_SECONDS_DEFAULT: u64 = 300;
pub const DEDUP_TOLERANCE_SECONDS_DEFAULT: u64 = 60;
pub const DATA_DIR_DEFAULT: &str = "./data";
const HTTP_TIMEOUT_MS_RANGE: std::ops::RangeInclusive<u64> = 100..=120_000;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    /// Process exit code for a configuration that cannot run.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Raw key/value settings as they arrive from flags or the environment. Empty values are unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorSettings {
    pub source_url: Option<String>,
    pub energy_url: Option<String>,
    pub intensity1_url: Option<String>,
    pub intensity2_url: Option<String>,
    pub luminosity_url: Option<String>,
    pub source_fixture_path: Option<String>,
    pub retention_seconds: Option<String>,
    pub retention_days: Option<String>,
    pub max_points: Option<String>,
    pub force_species: Option<String>,
    pub bucket_mode: Option<String>,
    pub sample_interval_seconds: Option<String>,
    pub dedup_tolerance_seconds: Option<String>,
    pub data_dir: Option<String>,
    pub latest_path: Option<String>,
    pub history_path: Option<String>,
    pub state_path: Option<String>,
    pub raw_payload_path: Option<String>,
    pub write_degraded_snapshot: Option<String>,
    pub http_timeout_ms: Option<String>,
    pub http_user_agent: Option<String>,
}

/// Validated, immutable configuration for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub source_plan: SourcePlan,
    pub source_fixture_path: Option<PathBuf>,
    pub retention_seconds: u64,
    pub max_points: usize,
    pub forced_species: Option<Species>,
    pub bucket_mode: BucketMode,
    pub latest_path: PathBuf,
    pub history_path: PathBuf,
    pub state_path: PathBuf,
    pub raw_payload_path: Option<PathBuf>,
    pub write_degraded_snapshot: bool,
    pub http: HttpFetchConfig,
    pub classifier: SpeciesClassifierConfig,
}

impl CollectorConfig {
    pub fn from_settings(settings: &CollectorSettings) -> Result<Self, ConfigError> {
        let source_fixture_path = non_empty(&settings.source_fixture_path).map(PathBuf::from);
        let primary_url = match (non_empty(&settings.source_url), &source_fixture_path) {
            (Some(raw), _) => parse_source_url("SOURCE_URL", raw)?,
            (None, Some(path)) => format!("file://{}", path.display()),
            (None, None) => return Err(ConfigError::Missing("SOURCE_URL")),
        };
        let mut source_plan = SourcePlan::single(primary_url);
        for (key, kind, value) in [
            ("ENERGY_URL", SignalKind::Energy, &settings.energy_url),
            ("INTENSITY1_URL", SignalKind::BeamIntensity1, &settings.intensity1_url),
            ("INTENSITY2_URL", SignalKind::BeamIntensity2, &settings.intensity2_url),
            ("LUMINOSITY_URL", SignalKind::Luminosity, &settings.luminosity_url),
        ] {
            if let Some(raw) = non_empty(value) {
                source_plan
                    .signal_urls
                    .insert(kind, parse_source_url(key, raw)?);
            }
        }

        let retention_seconds = match (
            non_empty(&settings.retention_seconds),
            non_empty(&settings.retention_days),
        ) {
            (Some(raw), _) => parse_positive_u64("RETENTION_SECONDS", raw)?,
            (None, Some(raw)) => parse_retention_days(raw)?,
            (None, None) => RETENTION_DAYS_DEFAULT * 86_400,
        };

        let max_points = match non_empty(&settings.max_points) {
            Some(raw) => usize::try_from(parse_positive_u64("MAX_POINTS", raw)?)
                .map_err(|_| invalid("MAX_POINTS", "too large"))?,
            None => MAX_POINTS_DEFAULT,
        };

        let forced_species = non_empty(&settings.force_species).and_then(|raw| {
            let parsed = Species::parse_override(raw);
            if parsed.is_none() {
                warn!(value = raw, "FORCE_SPECIES not recognised; ignoring override");
            }
            parsed
        });

        let interval_seconds = match non_empty(&settings.sample_interval_seconds) {
            Some(raw) => parse_positive_u64("SAMPLE_INTERVAL_SECONDS", raw)?,
            None => SAMPLE_INTERVAL_SECONDS_DEFAULT,
        };
        let tolerance_seconds = match non_empty(&settings.dedup_tolerance_seconds) {
            Some(raw) => parse_u64("DEDUP_TOLERANCE_SECONDS", raw)?,
            None => DEDUP_TOLERANCE_SECONDS_DEFAULT,
        };
        let bucket_mode = match non_empty(&settings.bucket_mode)
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            None | Some("exact") => BucketMode::Exact { interval_seconds },
            Some("tolerance") => BucketMode::Tolerance { tolerance_seconds },
            Some(other) => {
                return Err(invalid(
                    "BUCKET_MODE",
                    format!("expected exact or tolerance, got {other}"),
                ))
            }
        };

        let data_dir = PathBuf::from(non_empty(&settings.data_dir).unwrap_or(DATA_DIR_DEFAULT));
        let path_or = |value: &Option<String>, file: &str| {
            non_empty(value)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(file))
        };
        let latest_path = path_or(&settings.latest_path, "latest.json");
        let history_path = path_or(&settings.history_path, "history.jsonl");
        let state_path = path_or(&settings.state_path, "classifier_state.json");
        let raw_payload_path = non_empty(&settings.raw_payload_path).map(PathBuf::from);
        let mut owned_paths = vec![
            ("LATEST_PATH", &latest_path),
            ("HISTORY_PATH", &history_path),
            ("STATE_PATH", &state_path),
        ];
        if let Some(raw) = &raw_payload_path {
            owned_paths.push(("RAW_PAYLOAD_PATH", raw));
        }
        distinct_paths(&owned_paths)?;

        let write_degraded_snapshot = match non_empty(&settings.write_degraded_snapshot) {
            Some(raw) => parse_bool("WRITE_DEGRADED_SNAPSHOT", raw)?,
            None => true,
        };

        let mut http = HttpFetchConfig::standard_v1();
        if let Some(raw) = non_empty(&settings.http_timeout_ms) {
            let timeout_ms = parse_u64("HTTP_TIMEOUT_MS", raw)?;
            if !HTTP_TIMEOUT_MS_RANGE.contains(&timeout_ms) {
                return Err(invalid(
                    "HTTP_TIMEOUT_MS",
                    format!(
                        "expected {}..={}, got {timeout_ms}",
                        HTTP_TIMEOUT_MS_RANGE.start(),
                        HTTP_TIMEOUT_MS_RANGE.end()
                    ),
                ));
            }
            http.timeout_ms = timeout_ms;
        }
        if let Some(agent) = non_empty(&settings.http_user_agent) {
            http.user_agent = agent.to_string();
        }

        Ok(Self {
            source_plan,
            source_fixture_path,
            retention_seconds,
            max_points,
            forced_species,
            bucket_mode,
            latest_path,
            history_path,
            state_path,
            raw_payload_path,
            write_degraded_snapshot,
            http,
            classifier: SpeciesClassifierConfig::standard_v1(),
        })
    }

    pub fn history_policy(&self) -> HistoryPolicy {
        HistoryPolicy {
            bucket_mode: self.bucket_mode,
            retention_seconds: self.retention_seconds,
            max_points: self.max_points,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_source_url(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|err| invalid(key, err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(invalid(key, format!("unsupported scheme {other}"))),
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .map_err(|_| invalid(key, format!("expected a non-negative integer, got {raw}")))
}

fn parse_positive_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match parse_u64(key, raw)? {
        0 => Err(invalid(key, "must be greater than zero")),
        value => Ok(value),
    }
}

fn parse_retention_days(raw: &str) -> Result<u64, ConfigError> {
    let days = raw
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| invalid("RETENTION_DAYS", format!("expected a positive number, got {raw}")))?;
    let seconds = (days * SECONDS_PER_DAY).round();
    if seconds < 1.0 || seconds >= u64::MAX as f64 {
        return Err(invalid("RETENTION_DAYS", "out of range"));
    }
    Ok(seconds as u64)
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, format!("expected a boolean, got {raw}"))),
    }
}

fn distinct_paths(paths: &[(&'static str, &PathBuf)]) -> Result<(), ConfigError> {
    for (i, &(key, path)) in paths.iter().enumerate() {
        let clash = paths[..i]
            .iter()
            .find(|&&(_, other)| other.as_path() == path.as_path());
        if let Some(&(other_key, _)) = clash {
            return Err(invalid(key, format!("same file as {other_key}")));
        }
    }
    Ok(())
}
