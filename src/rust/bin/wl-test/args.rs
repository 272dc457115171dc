// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::clap::{
    Arg,
    ArgAction,
    ArgMatches,
    Command,
};

//======================================================================================================================
// Program Arguments
//======================================================================================================================

/// Program Arguments
#[derive(Debug)]
pub struct ProgramArguments {
    /// Number of background load threads.
    load: Option<usize>,
    /// Iterations of each backend test.
    iterations: Option<u32>,
    /// Iterations of the direct probe.
    probe_iterations: Option<u32>,
    /// Configuration file.
    config_path: Option<String>,
    /// Suppress probe progress.
    quiet: bool,
}

impl ProgramArguments {
    /// Parses the program arguments from the command line interface.
    pub fn new(app_name: &'static str, app_about: &'static str) -> Result<Self> {
        let matches: ArgMatches = Command::new(app_name)
            .about(app_about)
            .arg(
                Arg::new("load")
                    .long("load")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .value_name("THREADS")
                    .help("Sets the number of background load threads"),
            )
            .arg(
                Arg::new("iterations")
                    .long("iterations")
                    .value_parser(clap::value_parser!(u32))
                    .required(false)
                    .value_name("N")
                    .help("Sets the number of iterations of each backend test"),
            )
            .arg(
                Arg::new("probe-iterations")
                    .long("probe-iterations")
                    .value_parser(clap::value_parser!(u32))
                    .required(false)
                    .value_name("N")
                    .help("Sets the number of iterations of the direct probe"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("FILE")
                    .help("Reads options from a YAML configuration file"),
            )
            .arg(
                Arg::new("quiet")
                    .long("quiet")
                    .action(ArgAction::SetTrue)
                    .help("Does not print probe progress"),
            )
            .get_matches();

        Ok(Self {
            load: matches.get_one::<usize>("load").copied(),
            iterations: matches.get_one::<u32>("iterations").copied(),
            probe_iterations: matches.get_one::<u32>("probe-iterations").copied(),
            config_path: matches.get_one::<String>("config").cloned(),
            quiet: matches.get_flag("quiet"),
        })
    }

    pub fn get_load(&self) -> Option<usize> {
        self.load
    }

    pub fn get_iterations(&self) -> Option<u32> {
        self.iterations
    }

    pub fn get_probe_iterations(&self) -> Option<u32> {
        self.probe_iterations
    }

    pub fn get_config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
