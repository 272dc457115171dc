// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Companion driver: runs the default test plan through the control channel under background load, then the direct
//! probe.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    backend::{
        BackendKind,
        SubVariant,
    },
    config::Config,
    control::{
        Request,
        Session,
        TestResult,
    },
    harness::RunReport,
    load::{
        priority::ThreadPriority,
        LoadGenerator,
    },
    probe::{
        DirectProbe,
        ProbeReport,
    },
    report::{
        self,
        LatencyDistribution,
    },
    runtime::fail::Fail,
};
use ::std::{
    io::Write,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Tests run through the control channel, in order.
pub const TEST_PLAN: [PlanEntry; 4] = [
    PlanEntry::new("workqueue (global)", BackendKind::WorkQueue, SubVariant::SharedQueue),
    PlanEntry::new("workqueue (self)", BackendKind::WorkQueue, SubVariant::PrivateQueue),
    PlanEntry::new("tasklet", BackendKind::Tasklet, SubVariant::Default),
    PlanEntry::new("thread", BackendKind::Thread, SubVariant::Default),
];

//======================================================================================================================
// Structures
//======================================================================================================================

/// One test of the plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: &'static str,
    pub backend: BackendKind,
    pub subvariant: SubVariant,
}

/// Knobs of a companion run.
#[derive(Clone, Debug)]
pub struct CompanionOptions {
    pub load_threads: usize,
    pub load_priority: ThreadPriority,
    /// Iterations of each control channel test. `None` keeps the session default.
    pub iterations: Option<u32>,
    pub probe_iterations: u32,
    pub probe_priority: ThreadPriority,
    pub wait_timeout: Option<Duration>,
    pub remove_timeout: Option<Duration>,
    /// Print probe progress?
    pub verbose: bool,
}

/// Outcome of one test of the plan.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    pub entry: PlanEntry,
    pub result: Result<TestResult, Fail>,
}

/// Outcome of a companion run.
#[derive(Clone, Debug)]
pub struct CompanionReport {
    /// Load threads that actually ran.
    pub load_threads: usize,
    pub tests: Vec<TestOutcome>,
    /// `None` if the probe could not run.
    pub probe: Option<ProbeReport>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl PlanEntry {
    pub const fn new(name: &'static str, backend: BackendKind, subvariant: SubVariant) -> Self {
        Self {
            name,
            backend,
            subvariant,
        }
    }
}

impl CompanionOptions {
    /// Reads every option from `config`, falling back to defaults.
    pub fn from_config(config: &Config) -> Result<Self, Fail> {
        Ok(Self {
            load_threads: config.load_threads()?,
            load_priority: config.load_priority()?,
            iterations: Some(config.iterations()?),
            probe_iterations: config.probe_iterations()?,
            probe_priority: config.probe_priority()?,
            wait_timeout: config.wait_timeout()?,
            remove_timeout: config.remove_timeout()?,
            verbose: config.probe_verbose()?,
        })
    }
}

impl CompanionReport {
    /// Number of plan tests that failed.
    pub fn failures(&self) -> usize {
        self.tests.iter().filter(|outcome: &&TestOutcome| outcome.result.is_err()).count()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Starts the load, runs the test plan reporting each test to `out` without stopping at failures, runs the direct
/// probe, then stops the load and the probe.
pub fn run<W: Write>(options: &CompanionOptions, out: &mut W) -> Result<CompanionReport, Fail> {
    writeln!(out, "Start load, {} threads", options.load_threads)?;
    let load: LoadGenerator = LoadGenerator::start(options.load_threads, options.load_priority);
    if load.running() < load.requested() {
        writeln!(out, "Failed to start {} load threads", load.requested() - load.running())?;
    }
    let load_threads: usize = load.running();

    let mut session: Session = Session::with_timeouts(options.wait_timeout, options.remove_timeout);
    let mut tests: Vec<TestOutcome> = Vec::with_capacity(TEST_PLAN.len());
    for (i, entry) in TEST_PLAN.iter().enumerate() {
        let result: Result<TestResult, Fail> = run_test(&mut session, i, entry, options, out);
        tests.push(TestOutcome { entry: *entry, result });
    }
    drop(session);

    let probe: Option<ProbeReport> = match DirectProbe::spawn(options.probe_priority, options.wait_timeout) {
        Ok(mut probe) => {
            writeln!(out, "Start test {}: userspace", TEST_PLAN.len())?;
            let verbose: bool = options.verbose;
            let result: Result<ProbeReport, Fail> = probe.run(options.probe_iterations, |i: u32| {
                if verbose {
                    // Progress is best effort.
                    let _ = write!(out, "{}\t", i);
                    let _ = out.flush();
                }
            });
            if verbose {
                writeln!(out)?;
            }
            let report: Option<ProbeReport> = match result {
                Ok(report) => {
                    report::write_statistics(out, &report.stats)?;
                    Some(report)
                },
                Err(e) => {
                    writeln!(out, "Probe error: {}", e.errno)?;
                    None
                },
            };
            writeln!(out)?;

            writeln!(out, "Unloading...")?;
            stop_load(load);
            if let Err(e) = probe.shutdown() {
                warn!("run(): {:?}", e);
            }
            report
        },
        Err(e) => {
            writeln!(out, "Cannot create userspace thread ({:?})", e)?;
            writeln!(out, "Unloading...")?;
            stop_load(load);
            None
        },
    };

    Ok(CompanionReport {
        load_threads,
        tests,
        probe,
    })
}

/// Runs one plan test through the control channel.
fn run_test<W: Write>(
    session: &mut Session,
    i: usize,
    entry: &PlanEntry,
    options: &CompanionOptions,
    out: &mut W,
) -> Result<TestResult, Fail> {
    if let Err(e) = session.submit(Request::SelectBackend(entry.backend.id())) {
        writeln!(out, "failed to set task: {}, rc={}", entry.backend.id(), e.errno)?;
        return Err(e);
    }
    if let Err(e) = session.submit(Request::SelectSubVariant(entry.subvariant.id())) {
        writeln!(out, "failed to set subtype: {}, rc={}", entry.subvariant.id(), e.errno)?;
        return Err(e);
    }
    if let Some(n) = options.iterations {
        session.submit(Request::SetIterations(n))?;
    }

    writeln!(out, "Start test {}: {}", i, entry.name)?;
    let mut result: TestResult = TestResult::new();
    let outcome: Result<TestResult, Fail> = match session.submit(Request::Run(&mut result)) {
        Ok(()) => {
            report::write_result(out, &result)?;
            if options.verbose {
                if let Some(last) = session.last_report() {
                    write_distribution(out, last)?;
                }
            }
            Ok(result)
        },
        Err(e) => {
            writeln!(out, "Test error: {}", e.errno)?;
            Err(e)
        },
    };
    writeln!(out)?;
    outcome
}

/// Writes the latency distribution of `report`. A distribution that cannot be built is logged and skipped, since
/// the run itself succeeded.
fn write_distribution<W: Write>(out: &mut W, report: &RunReport) -> Result<(), Fail> {
    match LatencyDistribution::from_samples(report.samples.iter()) {
        Ok(distribution) => distribution.write(out),
        Err(e) => {
            warn!("write_distribution(): skipping latency distribution ({:?})", e);
            Ok(())
        },
    }
}

fn stop_load(load: LoadGenerator) {
    if let Err(e) = load.stop() {
        warn!("stop_load(): {:?}", e);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for CompanionOptions {
    fn default() -> Self {
        Self {
            load_threads: crate::load::DEFAULT_LOAD_THREADS,
            load_priority: ThreadPriority::LOAD,
            iterations: None,
            probe_iterations: crate::probe::DEFAULT_PROBE_ITERATIONS,
            probe_priority: ThreadPriority::PROBE,
            wait_timeout: Some(crate::harness::DEFAULT_WAIT_TIMEOUT),
            remove_timeout: Some(crate::control::DEFAULT_REMOVE_TIMEOUT),
            verbose: false,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
