//! Trawl - gather facts, run every check in isolation, report what looks wrong

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use tracing::debug;
use trawl::cli::Cli;
use trawl::{builtin_catalog, errors, logging};
use trawl_common::{Engine, ReportOptions, TrawlConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.debug);

    match run(&cli) {
        Ok(()) => ExitCode::from(errors::EXIT_SUCCESS),
        Err(e) => {
            eprintln!("trawl: {:#}", e);
            ExitCode::from(errors::exit_code(&e))
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = TrawlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut engine = Engine::new(builtin_catalog()?);
    cli.seed(&config, engine.facts_mut(), Utc::now())?;

    if cli.list {
        engine.discover_local()?;
        for name in engine.catalog().list() {
            println!("{}", name);
        }
        return Ok(());
    }

    let report = cli.report_name(&config);
    debug!("Rendering with report {}", report);
    let options = ReportOptions {
        live: true,
        ..ReportOptions::default()
    };
    engine.run(&report, &options)?;
    Ok(())
}
