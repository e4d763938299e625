use std::path::PathBuf;
use std::process::ExitCode;
use ccsim::{Config, Error, Simulation};
use tracing::{error, info, Level};

/// Where the report is written.
const RESULTS: &str = "results.json";

fn run() -> ccsim::Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Config::load(&path)?
        },
        None => Config::default(),
    };

    let report = Simulation::new(config)?.run()?;
    for flow in report.flows.values() {
        println!("{} ({})", flow.summary, flow.variant);
    }

    let json = serde_json::to_string_pretty(&report).map_err(Error::Export)?;
    std::fs::write(RESULTS, json)?;
    info!(path = RESULTS, "results written");
    Ok(())
}

fn main() -> ExitCode {
    let level = if std::env::var_os("CCSIM_DEBUG").is_some() { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "simulation failed");
            ExitCode::FAILURE
        },
    }
}
