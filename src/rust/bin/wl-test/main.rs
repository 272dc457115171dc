// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Modules
//======================================================================================================================

mod args;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::std::io::{
    self,
    Stdout,
};
use ::wakelat::{
    companion::{
        self,
        CompanionOptions,
        CompanionReport,
    },
    config::Config,
    runtime::logging,
};
use args::ProgramArguments;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn main() -> Result<()> {
    logging::initialize();
    let args: ProgramArguments = ProgramArguments::new("wl-test", "Measures wake and scheduling latencies.")?;

    let config: Config = match args.get_config_path() {
        Some(path) => Config::new(path)?,
        None => Config::default(),
    };
    let mut options: CompanionOptions = CompanionOptions::from_config(&config)?;
    if let Some(load) = args.get_load() {
        options.load_threads = load;
    }
    if let Some(iterations) = args.get_iterations() {
        options.iterations = Some(iterations);
    }
    if let Some(iterations) = args.get_probe_iterations() {
        options.probe_iterations = iterations;
    }
    if args.is_quiet() {
        options.verbose = false;
    }

    let mut stdout: Stdout = io::stdout();
    let report: CompanionReport = companion::run(&options, &mut stdout)?;
    if report.failures() > 0 {
        anyhow::bail!("{} of {} tests failed", report.failures(), report.tests.len());
    }
    Ok(())
}
