// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::std::time::Duration;
use ::wakelat::{
    companion::{
        self,
        CompanionOptions,
        CompanionReport,
        TestOutcome,
        TEST_PLAN,
    },
    config::Config,
    load::{
        priority::ThreadPriority,
        LoadGenerator,
    },
    probe::{
        DirectProbe,
        ProbeReport,
    },
    runtime::logging,
    TestResult,
};

//======================================================================================================================
// Helpers
//======================================================================================================================

/// Small options that do not need elevated privileges.
fn options() -> CompanionOptions {
    CompanionOptions {
        load_threads: 2,
        load_priority: ThreadPriority::PROBE,
        iterations: Some(50),
        probe_iterations: 30,
        probe_priority: ThreadPriority::PROBE,
        wait_timeout: Some(Duration::from_secs(10)),
        remove_timeout: Some(Duration::from_secs(10)),
        verbose: true,
    }
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// The companion runs the whole plan and the probe, reporting as it goes.
#[test]
fn companion_runs_plan_and_probe() -> Result<()> {
    logging::initialize();
    let mut out: Vec<u8> = Vec::new();
    let report: CompanionReport = companion::run(&options(), &mut out)?;
    let text: String = String::from_utf8(out)?;

    wakelat::ensure_eq!(report.load_threads, 2);
    wakelat::ensure_eq!(report.tests.len(), TEST_PLAN.len());
    wakelat::ensure_eq!(report.failures(), 0);
    for outcome in &report.tests {
        let TestOutcome { entry, result } = outcome;
        match result {
            Ok(result) => {
                let result: &TestResult = result;
                wakelat::ensure_eq!(result.n, 50);
            },
            Err(e) => anyhow::bail!("{} failed: {:?}", entry.name, e),
        }
    }
    match report.probe.as_ref() {
        Some(probe) => wakelat::ensure_eq!(probe.stats.n, 30),
        None => anyhow::bail!("probe should have run"),
    }

    let expected: [&str; 7] = [
        "Start load, 2 threads",
        "Start test 0: workqueue (global)",
        "Start test 1: workqueue (self)",
        "Start test 2: tasklet",
        "Start test 3: thread",
        "Start test 4: userspace",
        "Unloading...",
    ];
    let mut rest: &str = text.as_str();
    for line in expected {
        match rest.find(line) {
            Some(at) => rest = &rest[at + line.len()..],
            None => anyhow::bail!("missing or out of order: {:?}\n{}", line, text),
        }
    }
    wakelat::ensure_eq!(text.contains("0\t10\t20\t"), true);
    Ok(())
}

/// Companion options come from the configuration file.
#[test]
fn options_from_config() -> Result<()> {
    let config: Config = Config::from_yaml_str("load:\n  threads: 7\nprobe:\n  iterations: 12\n  verbose: false\n")?;
    let options: CompanionOptions = CompanionOptions::from_config(&config)?;
    wakelat::ensure_eq!(options.load_threads, 7);
    wakelat::ensure_eq!(options.load_priority, ThreadPriority::LOAD);
    wakelat::ensure_eq!(options.probe_iterations, 12);
    wakelat::ensure_eq!(options.verbose, false);
    wakelat::ensure_eq!(options.iterations, Some(10000));
    Ok(())
}

/// The load generator joins every thread it started, and an empty load is fine.
#[test]
fn load_generator_start_stop() -> Result<()> {
    logging::initialize();
    for nthreads in [0, 4] {
        let load: LoadGenerator = LoadGenerator::start(nthreads, ThreadPriority::PROBE);
        wakelat::ensure_eq!(load.running(), nthreads);
        load.stop()?;
    }
    Ok(())
}

/// The direct probe answers every wake-up and can run more than once.
#[test]
fn probe_reports_every_iteration() -> Result<()> {
    logging::initialize();
    let mut probe: DirectProbe = DirectProbe::spawn(ThreadPriority::PROBE, Some(Duration::from_secs(10)))?;
    for iterations in [100, 5] {
        let report: ProbeReport = probe.run(iterations, |_: u32| ())?;
        wakelat::ensure_eq!(report.iterations, iterations);
        wakelat::ensure_eq!(report.stats.n, iterations as u64);
        wakelat::ensure_eq!(report.stats.anomalies, 0);
        wakelat::ensure_eq!(report.stats.mean <= report.stats.max, true);
    }
    probe.shutdown()?;
    Ok(())
}
