// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Measurement harness: N rounds of dispatch-then-wait against one backend instance.

pub mod sample;
pub mod stats;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::{
    sample::{
        ExecStamps,
        LatencySample,
    },
    stats::{
        Aggregator,
        Statistics,
    },
};
use crate::{
    backend::{
        context::ExecScope,
        state::{
            self,
            CompletionData,
            CompletionFn,
        },
        BackendKind,
        SubVariant,
        TaskBackend,
    },
    runtime::{
        clock::{
            self,
            Timestamp,
        },
        fail::Fail,
        poll,
    },
};
use ::std::{
    collections::TryReserveError,
    fmt,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Default number of iterations of a run.
pub const DEFAULT_ITERATIONS: u32 = 10000;

/// Default bound on the wait for a single dispatch to execute.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

//======================================================================================================================
// Structures
//======================================================================================================================

/// What triggers a dispatch. Only [TriggerMode::Process] is implemented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    #[default]
    Process,
    Timer,
    Irq,
}

/// Parameters of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub backend: BackendKind,
    pub subvariant: SubVariant,
    pub iterations: u32,
    pub trigger: TriggerMode,
}

/// Outcome of one run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub config: RunConfig,
    /// One sample per successful dispatch, in order.
    pub samples: Vec<LatencySample>,
    pub stats: Statistics,
    /// Iterations whose dispatch was rejected with `EBUSY`.
    pub skipped: u64,
    /// Error that cut the run short, if any.
    pub error: Option<Fail>,
}

/// Runs measurement loops.
#[derive(Clone, Copy, Debug)]
pub struct Harness {
    /// Bound on the wait for each dispatch. `None` waits forever.
    wait_timeout: Option<Duration>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TriggerMode {
    pub const ALL: [TriggerMode; 3] = [TriggerMode::Process, TriggerMode::Timer, TriggerMode::Irq];

    pub const fn id(&self) -> u32 {
        match self {
            TriggerMode::Process => 0,
            TriggerMode::Timer => 1,
            TriggerMode::Irq => 2,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            TriggerMode::Process => "process",
            TriggerMode::Timer => "timer",
            TriggerMode::Irq => "irq",
        }
    }

    pub const fn is_supported(&self) -> bool {
        matches!(self, TriggerMode::Process)
    }
}

impl RunConfig {
    pub fn new(backend: BackendKind, subvariant: SubVariant, iterations: u32) -> Self {
        Self {
            backend,
            subvariant,
            iterations,
            trigger: TriggerMode::Process,
        }
    }
}

impl RunReport {
    /// Iterations that were never attempted because the run was cut short.
    pub fn unattempted(&self) -> u64 {
        (self.config.iterations as u64).saturating_sub(self.samples.len() as u64 + self.skipped)
    }

    /// Anomalies, skipped dispatches and unattempted iterations.
    pub fn err_cnt(&self) -> u64 {
        self.stats.anomalies + self.skipped + self.unattempted()
    }
}

impl Harness {
    pub fn new(wait_timeout: Option<Duration>) -> Self {
        Self { wait_timeout }
    }

    /// Runs `config.iterations` rounds against `backend`. A backend left initialized by an earlier run whose removal
    /// timed out is removed first. The backend is always removed at the end of the run. Errors before the first
    /// dispatch fail the run; later errors cut it short and are recorded in the report.
    pub fn run(&self, backend: &mut dyn TaskBackend, config: &RunConfig) -> Result<RunReport, Fail> {
        if !config.trigger.is_supported() {
            let cause: String = format!("trigger mode {} is not supported", config.trigger);
            error!("run(): {}", cause);
            return Err(Fail::new(libc::EOPNOTSUPP, &cause));
        }

        let n: usize = config.iterations as usize;
        let mut samples: Vec<LatencySample> = Vec::new();
        samples.try_reserve_exact(n).map_err(|e: TryReserveError| {
            let cause: String = format!("cannot allocate {} samples ({})", n, e);
            error!("run(): {}", cause);
            Fail::new(libc::ENOMEM, &cause)
        })?;
        let stamps: Arc<ExecStamps> = Arc::new(ExecStamps::allocate(n)?);

        if backend.is_initialized() {
            warn!("run(): finishing earlier removal of backend {}", backend.name());
            backend.remove()?;
        }

        let sink: Arc<ExecStamps> = stamps.clone();
        let complete: CompletionFn = state::completion(move |data: CompletionData, _: ExecScope| sink.stamp(data));
        backend.init(config.subvariant, complete)?;
        info!(
            "run(): backend={} subvariant={} iterations={}",
            backend.name(),
            config.subvariant,
            config.iterations
        );

        let mut skipped: u64 = 0;
        let mut error: Option<Fail> = None;
        for i in 0..n {
            stamps.clear(i);
            let invoke: Timestamp = clock::now();
            match backend.invoke(i) {
                Ok(()) => (),
                Err(e) if e.is_busy() => {
                    warn!("run(): iteration {} skipped, backend {} is busy", i, backend.name());
                    skipped += 1;
                    continue;
                },
                Err(e) => {
                    error!("run(): iteration {} failed to dispatch ({:?})", i, e);
                    error = Some(e);
                    break;
                },
            }

            let waited: Result<(), Fail> = poll::yield_until(|| !backend.is_busy(), self.wait_timeout, "dispatch");
            let sample: LatencySample = LatencySample::new(invoke, stamps.get(i));
            trace!("run(): iteration {}: {:?}", i, sample);
            samples.push(sample);
            if let Err(e) = waited {
                error = Some(e);
                break;
            }
        }

        if let Err(e) = backend.remove() {
            error!("run(): failed to remove backend {} ({:?})", backend.name(), e);
            error.get_or_insert(e);
        }

        let stats: Statistics = Statistics::from_samples(samples.iter());
        let report: RunReport = RunReport {
            config: *config,
            samples,
            stats,
            skipped,
            error,
        };
        info!(
            "run(): backend={} n={} avg={}us max={}us var={} err_cnt={}",
            backend.name(),
            report.stats.n,
            report.stats.mean,
            report.stats.max,
            report.stats.variance,
            report.err_cnt()
        );
        Ok(report)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Harness {
    fn default() -> Self {
        Self::new(Some(DEFAULT_WAIT_TIMEOUT))
    }
}

impl TryFrom<u32> for TriggerMode {
    type Error = Fail;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match TriggerMode::ALL.iter().find(|trigger: &&TriggerMode| trigger.id() == id) {
            Some(trigger) => Ok(*trigger),
            None => {
                let cause: String = format!("invalid trigger mode id (id={})", id);
                error!("try_from(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }
}

impl FromStr for TriggerMode {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match TriggerMode::ALL
            .iter()
            .find(|trigger: &&TriggerMode| trigger.name().eq_ignore_ascii_case(s))
        {
            Some(trigger) => Ok(*trigger),
            None => Err(Fail::new(libc::EINVAL, &format!("unknown trigger mode \"{}\"", s))),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
