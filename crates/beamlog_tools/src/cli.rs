#![forbid(unsafe_code)]

use beamlog_os::config::CollectorSettings;
use clap::Parser;

/// Runs one accelerator telemetry pull-and-persist cycle and exits.
///
/// Every flag falls back to the environment variable of the same name. Values are
/// validated after parsing so that flags and environment share one error path.
#[derive(Debug, Clone, Parser)]
#[command(name = "beamlog", version)]
pub struct Args {
    /// Telemetry endpoint returning a JSON document.
    #[arg(long, env = "SOURCE_URL")]
    pub source_url: Option<String>,
    #[arg(long, env = "ENERGY_URL")]
    pub energy_url: Option<String>,
    #[arg(long, env = "INTENSITY1_URL")]
    pub intensity1_url: Option<String>,
    #[arg(long, env = "INTENSITY2_URL")]
    pub intensity2_url: Option<String>,
    #[arg(long, env = "LUMINOSITY_URL")]
    pub luminosity_url: Option<String>,
    /// Read the payload from this file instead of the network.
    #[arg(long, env = "SOURCE_FIXTURE_PATH")]
    pub source_fixture_path: Option<String>,
    #[arg(long, env = "RETENTION_SECONDS")]
    pub retention_seconds: Option<String>,
    #[arg(long, env = "RETENTION_DAYS")]
    pub retention_days: Option<String>,
    #[arg(long, env = "MAX_POINTS")]
    pub max_points: Option<String>,
    /// `protons` or `ions`; anything else is ignored.
    #[arg(long, env = "FORCE_SPECIES")]
    pub force_species: Option<String>,
    /// `exact` or `tolerance`.
    #[arg(long, env = "BUCKET_MODE")]
    pub bucket_mode: Option<String>,
    #[arg(long, env = "SAMPLE_INTERVAL_SECONDS")]
    pub sample_interval_seconds: Option<String>,
    #[arg(long, env = "DEDUP_TOLERANCE_SECONDS")]
    pub dedup_tolerance_seconds: Option<String>,
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<String>,
    #[arg(long, env = "LATEST_PATH")]
    pub latest_path: Option<String>,
    #[arg(long, env = "HISTORY_PATH")]
    pub history_path: Option<String>,
    #[arg(long, env = "STATE_PATH")]
    pub state_path: Option<String>,
    #[arg(long, env = "RAW_PAYLOAD_PATH")]
    pub raw_payload_path: Option<String>,
    #[arg(long, env = "WRITE_DEGRADED_SNAPSHOT")]
    pub write_degraded_snapshot: Option<String>,
    #[arg(long, env = "HTTP_TIMEOUT_MS")]
    pub http_timeout_ms: Option<String>,
    #[arg(long, env = "HTTP_USER_AGENT")]
    pub http_user_agent: Option<String>,
}

impl Args {
    pub fn settings(&self) -> CollectorSettings {
        CollectorSettings {
            source_url: self.source_url.clone(),
            energy_url: self.energy_url.clone(),
            intensity1_url: self.intensity1_url.clone(),
            intensity2_url: self.intensity2_url.clone(),
            luminosity_url: self.luminosity_url.clone(),
            source_fixture_path: self.source_fixture_path.clone(),
            retention_seconds: self.retention_seconds.clone(),
            retention_days: self.retention_days.clone(),
            max_points: self.max_points.clone(),
            force_species: self.force_species.clone(),
            bucket_mode: self.bucket_mode.clone(),
            sample_interval_seconds: self.sample_interval_seconds.clone(),
            dedup_tolerance_seconds: self.dedup_tolerance_seconds.clone(),
            data_dir: self.data_dir.clone(),
            latest_path: self.latest_path.clone(),
            history_path: self.history_path.clone(),
            state_path: self.state_path.clone(),
            raw_payload_path: self.raw_payload_path.clone(),
            write_degraded_snapshot: self.write_degraded_snapshot.clone(),
            http_timeout_ms: self.http_timeout_ms.clone(),
            http_user_agent: self.http_user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamlog_os::config::CollectorConfig;
    use clap::CommandFactory;

    #[test]
    fn at_cli_01_command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn at_cli_02_flags_map_onto_collector_settings() {
        let args = Args::try_parse_from([
            "beamlog",
            "--source-url",
            "https://lhc.example/api",
            "--max-points",
            "500",
            "--force-species",
            "Ion",
            "--bucket-mode",
            "tolerance",
        ])
        .unwrap();
        let settings = args.settings();
        assert_eq!(settings.max_points.as_deref(), Some("500"));

        let cfg = CollectorConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.max_points, 500);
        assert_eq!(cfg.source_plan.primary_url, "https://lhc.example/api");
        assert_eq!(cfg.bucket_mode.as_str(), "tolerance");
    }
}
