#![forbid(unsafe_code)]

use beamlog_engines::source_fetch::{FixtureSourceFetcher, HttpSourceFetcher, SourceFetcher};
use beamlog_os::config::CollectorConfig;
use beamlog_os::cycle::run_cycle;
use beamlog_tools::cli::Args;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    std::process::exit(run());
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run() -> i32 {
    let args = Args::parse();
    let config = match CollectorConfig::from_settings(&args.settings()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration rejected");
            return err.exit_code();
        }
    };

    let fetcher: Box<dyn SourceFetcher + Sync> = match &config.source_fixture_path {
        Some(path) => Box::new(FixtureSourceFetcher::new(path.clone())),
        None => Box::new(HttpSourceFetcher::new(&config.http)),
    };

    match run_cycle(&config, fetcher.as_ref(), chrono::Utc::now()) {
        Ok(_) => 0,
        Err(err) => {
            error!(error = %err, code = err.exit_code(), "cycle failed");
            err.exit_code()
        }
    }
}
