// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::rand::{
    rngs::SmallRng,
    seq::SliceRandom,
    Rng,
    SeedableRng,
};
use ::std::{
    hint,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use ::wakelat::{
    backend::{
        context::AtomicContext,
        tasklet::{
            SoftIrqExecutor,
            Tasklet,
        },
    },
    control::{
        opcode,
        IoctlArg,
    },
    harness::{
        sample::LatencySample,
        stats::{
            Aggregator,
            Statistics,
        },
        RunReport,
    },
    runtime::{
        clock::Timestamp,
        logging,
    },
    BackendKind,
    Request,
    Session,
    SubVariant,
    TestResult,
    TriggerMode,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Iterations of the runs in these tests.
const ITERATIONS: u32 = 200;

/// Seed of the synthetic sample sequences.
const SEED: u64 = 0x5eed_1a7e;

/// Upper bound on any wait in these tests.
const TIMEOUT: Duration = Duration::from_secs(10);

//======================================================================================================================
// Helpers
//======================================================================================================================

fn select(session: &mut Session, backend: BackendKind, subvariant: SubVariant) -> Result<()> {
    session.submit(Request::SelectBackend(backend.id()))?;
    session.submit(Request::SelectSubVariant(subvariant.id()))?;
    Ok(())
}

/// Parks the deferred procedure executor in a spinning tasklet until the returned sender fires or is dropped.
fn park_executor() -> Result<Sender<()>> {
    SoftIrqExecutor::start()?;
    let (release, release_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::unbounded();
    let (parked_tx, parked): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
    let tasklet: Arc<Tasklet> = Tasklet::new(Box::new(move |ctx: &AtomicContext| {
        let _ = parked_tx.try_send(());
        let deadline: Instant = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            match ctx.try_recv(&release_rx) {
                Ok(None) => hint::spin_loop(),
                Ok(Some(())) | Err(_) => return,
            }
        }
    }));
    tasklet.schedule()?;
    parked.recv_timeout(TIMEOUT)?;
    Ok(release)
}

/// Waits until every tasklet raised so far has run.
fn drain_executor() -> Result<()> {
    let (tx, rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
    let marker: Arc<Tasklet> = Tasklet::new(Box::new(move |_: &AtomicContext| {
        let _ = tx.try_send(());
    }));
    marker.schedule()?;
    rx.recv_timeout(TIMEOUT)?;
    Ok(())
}

fn aggregate(durations: &[u64]) -> Statistics {
    let mut aggregator: Aggregator = Aggregator::new();
    for d in durations {
        aggregator.push_duration(*d);
    }
    aggregator.finish()
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// Every backend completes a run with no errors, and every iteration is accounted for.
#[test]
fn run_every_backend() -> Result<()> {
    logging::initialize();
    let mut session: Session = Session::new();
    session.submit(Request::SetIterations(ITERATIONS))?;
    for (backend, subvariant) in [
        (BackendKind::WorkQueue, SubVariant::SharedQueue),
        (BackendKind::WorkQueue, SubVariant::PrivateQueue),
        (BackendKind::Tasklet, SubVariant::Default),
        (BackendKind::Thread, SubVariant::Default),
    ] {
        select(&mut session, backend, subvariant)?;
        let mut result: TestResult = TestResult::new();
        session.submit(Request::Run(&mut result))?;

        wakelat::ensure_eq!(result.size, TestResult::SIZE);
        wakelat::ensure_eq!(result.n + result.err_cnt, ITERATIONS);
        wakelat::ensure_eq!(result.err_cnt, 0);
        wakelat::ensure_eq!(result.avg <= result.max, true);
        wakelat::ensure_eq!(result.var <= (result.max as u64) * (result.max as u64), true);

        let report: &RunReport = match session.last_report() {
            Some(report) => report,
            None => anyhow::bail!("run should leave a report"),
        };
        wakelat::ensure_eq!(report.config.backend, backend);
        wakelat::ensure_eq!(report.samples.len(), ITERATIONS as usize);
        wakelat::ensure_eq!(report.error.is_none(), true);
    }
    Ok(())
}

/// Each run computes its statistics from scratch.
#[test]
fn runs_do_not_accumulate() -> Result<()> {
    logging::initialize();
    let mut session: Session = Session::new();
    select(&mut session, BackendKind::Thread, SubVariant::Default)?;
    for iterations in [50, 20] {
        session.submit(Request::SetIterations(iterations))?;
        let mut result: TestResult = TestResult::new();
        session.submit(Request::Run(&mut result))?;
        wakelat::ensure_eq!(result.n, iterations);

        let recomputed: Statistics = match session.last_report() {
            Some(report) => Statistics::from_samples(report.samples.iter()),
            None => anyhow::bail!("run should leave a report"),
        };
        wakelat::ensure_eq!(recomputed.n as u32, result.n);
        wakelat::ensure_eq!(recomputed.mean as u32, result.avg);
        wakelat::ensure_eq!(recomputed.max as u32, result.max);
        wakelat::ensure_eq!(recomputed.variance, result.var);
    }
    Ok(())
}

/// A result buffer of the wrong declared size is rejected before anything runs.
#[test]
fn size_mismatch_runs_nothing() -> Result<()> {
    logging::initialize();
    let mut session: Session = Session::new();
    session.submit(Request::SetIterations(10))?;
    let mut result: TestResult = TestResult {
        size: TestResult::SIZE - 8,
        ..TestResult::new()
    };
    match session.submit(Request::Run(&mut result)) {
        Ok(()) => anyhow::bail!("short buffer should be rejected"),
        Err(e) => wakelat::ensure_eq!(e.errno, libc::EINVAL),
    }
    wakelat::ensure_eq!(result.n, 0);
    wakelat::ensure_eq!(session.last_report().is_none(), true);
    wakelat::ensure_eq!(session.has_instance(BackendKind::WorkQueue), false);
    Ok(())
}

/// Invalid ids fail with EINVAL and leave the selection unchanged.
#[test]
fn invalid_ids_leave_selection_alone() -> Result<()> {
    logging::initialize();
    let mut session: Session = Session::new();
    select(&mut session, BackendKind::WorkQueue, SubVariant::PrivateQueue)?;

    for request in [Request::SelectBackend(3), Request::SelectSubVariant(3), Request::SetTrigger(7)] {
        match session.submit(request) {
            Ok(()) => anyhow::bail!("invalid id should be rejected"),
            Err(e) => wakelat::ensure_eq!(e.errno, libc::EINVAL),
        }
    }
    wakelat::ensure_eq!(session.config().backend, BackendKind::WorkQueue);
    wakelat::ensure_eq!(session.config().subvariant, SubVariant::PrivateQueue);
    wakelat::ensure_eq!(session.config().trigger, TriggerMode::Process);
    Ok(())
}

/// Timer and interrupt triggers are declared but refused when running.
#[test]
fn unsupported_triggers_are_rejected() -> Result<()> {
    logging::initialize();
    let mut session: Session = Session::new();
    session.submit(Request::SetIterations(10))?;
    for trigger in [TriggerMode::Timer, TriggerMode::Irq] {
        session.ioctl(opcode::SET_TRIGGER, IoctlArg::Value(trigger.id()))?;
        let mut result: TestResult = TestResult::new();
        match session.ioctl(opcode::RUN, IoctlArg::Result(&mut result)) {
            Ok(()) => anyhow::bail!("{} trigger should be rejected", trigger),
            Err(e) => wakelat::ensure_eq!(e.errno, libc::EOPNOTSUPP),
        }
        wakelat::ensure_eq!(session.last_report().is_none(), true);
    }

    session.ioctl(opcode::SET_TRIGGER, IoctlArg::Value(TriggerMode::Process.id()))?;
    let mut result: TestResult = TestResult::new();
    session.ioctl(opcode::RUN, IoctlArg::Result(&mut result))?;
    wakelat::ensure_eq!(result.n, 10);
    Ok(())
}

/// A run whose dispatch never completes is cut short with partial statistics, and the next run of the same backend
/// finishes the interrupted removal and succeeds.
#[test]
fn timed_out_run_reports_partial_statistics_and_recovers() -> Result<()> {
    logging::initialize();
    let step: Duration = Duration::from_secs(1);
    let mut session: Session = Session::with_timeouts(Some(step), Some(step));
    select(&mut session, BackendKind::Tasklet, SubVariant::Default)?;
    session.submit(Request::SetIterations(5))?;

    let release: Sender<()> = park_executor()?;
    let mut result: TestResult = TestResult::new();
    session.submit(Request::Run(&mut result))?;
    release.send(())?;

    wakelat::ensure_eq!(result.n, 0);
    wakelat::ensure_eq!(result.err_cnt, 5);
    wakelat::ensure_eq!(result.n + result.err_cnt, 5);
    let report: &RunReport = match session.last_report() {
        Some(report) => report,
        None => anyhow::bail!("cut short run should leave a report"),
    };
    wakelat::ensure_eq!(report.samples.len(), 1);
    wakelat::ensure_eq!(report.stats.anomalies, 1);
    wakelat::ensure_eq!(report.unattempted(), 4);
    wakelat::ensure_eq!(report.error.as_ref().map(|e| e.errno), Some(libc::ETIMEDOUT));
    wakelat::ensure_eq!(session.has_instance(BackendKind::Tasklet), true);

    drain_executor()?;
    session.submit(Request::SetIterations(20))?;
    let mut result: TestResult = TestResult::new();
    session.submit(Request::Run(&mut result))?;
    wakelat::ensure_eq!(result.n + result.err_cnt, 20);
    wakelat::ensure_eq!(result.err_cnt, 0);
    match session.last_report() {
        Some(report) => wakelat::ensure_eq!(report.error.is_none(), true),
        None => anyhow::bail!("run should leave a report"),
    }
    Ok(())
}

/// Deselecting a backend releases its instance.
#[test]
fn deselect_releases_instance() -> Result<()> {
    logging::initialize();
    let mut session: Session = Session::new();
    session.submit(Request::SetIterations(5))?;
    select(&mut session, BackendKind::Thread, SubVariant::Default)?;
    let mut result: TestResult = TestResult::new();
    session.submit(Request::Run(&mut result))?;
    wakelat::ensure_eq!(session.has_instance(BackendKind::Thread), true);

    select(&mut session, BackendKind::Tasklet, SubVariant::Default)?;
    wakelat::ensure_eq!(session.has_instance(BackendKind::Thread), false);
    Ok(())
}

/// Constant and evenly spread samples have the documented statistics.
#[test]
fn reference_statistics() -> Result<()> {
    let flat: Statistics = aggregate(&[10, 10, 10, 10]);
    wakelat::ensure_eq!((flat.mean, flat.max, flat.variance), (10, 10, 0));

    let spread: Statistics = aggregate(&[0, 10, 20, 30]);
    wakelat::ensure_eq!((spread.mean, spread.max, spread.variance), (15, 30, 125));
    Ok(())
}

/// Statistics do not depend on sample order and match a floating point reference.
#[test]
fn statistics_are_order_independent() -> Result<()> {
    let mut rng: SmallRng = SmallRng::seed_from_u64(SEED);
    let mut durations: Vec<u64> = (0..1000).map(|_| rng.gen_range(0..5000)).collect();
    let first: Statistics = aggregate(&durations);
    durations.shuffle(&mut rng);
    let second: Statistics = aggregate(&durations);
    wakelat::ensure_eq!(first, second);

    let n: f64 = durations.len() as f64;
    let mean: f64 = durations.iter().map(|d: &u64| *d as f64).sum::<f64>() / n;
    let variance: f64 = durations.iter().map(|d: &u64| (*d as f64 - mean).powi(2)).sum::<f64>() / n;
    wakelat::ensure_eq!(first.mean, mean as u64);
    wakelat::ensure_eq!(((first.variance as f64) - variance).abs() < 1.0, true);
    wakelat::ensure_eq!(first.max, *durations.iter().max().unwrap_or(&0));
    Ok(())
}

/// Samples that never ran or ran before they were invoked are counted as errors, not latencies.
#[test]
fn anomalies_are_counted_apart() -> Result<()> {
    let mut rng: SmallRng = SmallRng::seed_from_u64(SEED);
    let mut aggregator: Aggregator = Aggregator::new();
    let mut expected_anomalies: u64 = 0;
    for _ in 0..500 {
        let invoke: Timestamp = Timestamp::from_micros(rng.gen_range(100..1000));
        let exec: Option<Timestamp> = match rng.gen_range(0..10) {
            0 => None,
            1 => Some(Timestamp::from_micros(invoke.as_micros() - 50)),
            _ => Some(Timestamp::from_micros(invoke.as_micros() + rng.gen_range(0..100))),
        };
        let sample: LatencySample = LatencySample::new(invoke, exec);
        if sample.is_anomaly() {
            expected_anomalies += 1;
        }
        aggregator.push(&sample);
    }
    let stats: Statistics = aggregator.finish();
    wakelat::ensure_eq!(stats.anomalies, expected_anomalies);
    wakelat::ensure_eq!(stats.n + stats.anomalies, 500);
    wakelat::ensure_eq!(stats.max < 100, true);
    Ok(())
}
