use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::BufRead;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use assembly_publicizer::cli::{Cli, RunConfig};
use assembly_publicizer::core::{BatchDriver, Engine, RunReport};

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    let parsed = Cli::try_from_args(&args);

    // Initialize logging; RUST_LOG wins over --verbose
    let verbose = parsed.as_ref().map_or(false, |cli| cli.verbose);
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Assembly Publicizer v{}", env!("CARGO_PKG_VERSION"));

    // Arguments that failed to parse still honour --wait
    let mut wait = args.iter().skip(1).any(|arg| arg == "--wait");
    let exit_code = match parsed.and_then(RunConfig::from_cli) {
        Ok(run) => {
            wait = run.wait;
            match execute(&run) {
                Ok(code) => code,
                Err(e) => {
                    error!("{:#}", e);
                    1
                }
            }
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };

    if wait {
        if let Err(e) = wait_for_enter() {
            warn!("{:#}", e);
        }
    }

    std::process::exit(exit_code)
}

fn execute(run: &RunConfig) -> Result<i32> {
    let driver = BatchDriver::new(Engine::new(&run.config), run.config.batch.clone());
    let summary = driver.run(&run.inputs, run.output.as_ref());

    if let Some(path) = &run.report {
        RunReport::from_summary(&summary)
            .write(path)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    }

    Ok(summary.exit_code())
}

fn wait_for_enter() -> Result<()> {
    println!("Press Enter to exit...");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(())
}
