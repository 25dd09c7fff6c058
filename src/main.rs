use crate::capture::SystemProbe;
use crate::config::AppConfig;
use crate::engine::process::ProcessEngine;
use crate::kernel::overlay::SCREENFPS_ENV;
use crate::runner::{RunOutcome, Runner};
use log::{error, info, warn};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub mod capture;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod pipeline;
pub mod runner;
pub mod utils;
pub mod workers;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // option-parse failures exit through clap with its own status
    let matches = config::command().get_matches();

    let config = match AppConfig::from_matches(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    process::exit(run(config));
}

fn run(config: AppConfig) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start event loop: {}", e);
            return 1;
        }
    };

    // Ctrl-C asks the supervisor to leave its loop and release the session
    let quit = CancellationToken::new();
    let stop = quit.clone();
    if let Err(e) = ctrlc::set_handler(move || stop.cancel()) {
        warn!("Error setting Ctrl-C handler: {}", e);
    }

    let probe = SystemProbe::new();
    let mut engine = ProcessEngine::from_env();
    if config.pipeline.screen_fps {
        engine = engine.with_env(SCREENFPS_ENV, "1");
    }

    match runtime.block_on(Runner::new(&config, &probe, &engine).run(quit)) {
        Ok(RunOutcome::DryRun(description)) => {
            println!("{}", description);
            0
        }
        Ok(RunOutcome::Finished(report)) => {
            info!("{} target done", report.target);
            0
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}
