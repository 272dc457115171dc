// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Deferred procedure (tasklet) backend.
//!
//! A tasklet is marked pending and handed to a single process-wide executor thread, which runs it with an
//! [AtomicContext]. The executor is the soft interrupt of this framework: procedures run soon after being raised,
//! one at a time, and must never sleep.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    backend::{
        context::AtomicContext,
        state::{
            CompletionData,
            CompletionFn,
            DispatchUnit,
        },
        task_name,
        BackendKind,
        SubVariant,
        TaskBackend,
        TaskName,
    },
    runtime::fail::Fail,
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        OnceLock,
    },
    thread::{
        self,
        JoinHandle,
    },
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Name of the executor thread.
const EXECUTOR_NAME: &str = "wl-softirq";

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Process-wide deferred procedure executor.
static EXECUTOR: OnceLock<SoftIrqExecutor> = OnceLock::new();

//======================================================================================================================
// Structures
//======================================================================================================================

/// Body of a deferred procedure.
pub type TaskletFn = Box<dyn Fn(&AtomicContext) + Send + Sync>;

/// A deferred procedure. Scheduling an already pending tasklet is a no-op.
pub struct Tasklet {
    pending: AtomicBool,
    func: TaskletFn,
}

/// Thread that runs raised tasklets in order.
pub struct SoftIrqExecutor {
    tx: Sender<Arc<Tasklet>>,
    _thread: JoinHandle<()>,
}

/// Tasklet backend.
pub struct TaskletBackend {
    name: TaskName,
    unit: Option<Arc<DispatchUnit>>,
    tasklet: Option<Arc<Tasklet>>,
    timeout: Option<Duration>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Tasklet {
    pub fn new(func: TaskletFn) -> Arc<Self> {
        Arc::new(Self {
            pending: AtomicBool::new(false),
            func,
        })
    }

    /// Marks the tasklet pending and raises it on the executor. Never blocks. The executor must have been started
    /// with [SoftIrqExecutor::start].
    pub fn schedule(self: &Arc<Self>) -> Result<(), Fail> {
        if self.pending.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match EXECUTOR.get() {
            Some(executor) => executor.raise(self.clone()).map_err(|e: Fail| {
                self.pending.store(false, Ordering::Release);
                e
            }),
            None => {
                self.pending.store(false, Ordering::Release);
                Err(Fail::new(libc::ENOTCONN, "deferred procedure executor not started"))
            },
        }
    }
}

impl SoftIrqExecutor {
    /// Starts the process-wide executor if it is not running yet. May block.
    pub fn start() -> Result<&'static SoftIrqExecutor, Fail> {
        if let Some(executor) = EXECUTOR.get() {
            return Ok(executor);
        }

        let (tx, rx): (Sender<Arc<Tasklet>>, Receiver<Arc<Tasklet>>) = crossbeam_channel::unbounded();
        let builder: thread::Builder = thread::Builder::new().name(EXECUTOR_NAME.to_string());
        let handle: JoinHandle<()> = match builder.spawn(move || Self::run(rx)) {
            Ok(handle) => handle,
            Err(e) => {
                let cause: String = format!("cannot spawn {} ({})", EXECUTOR_NAME, e);
                error!("start(): {}", cause);
                return Err(Fail::new(libc::EAGAIN, &cause));
            },
        };

        // A losing racer's executor exits as soon as its sender is dropped.
        let _ = EXECUTOR.set(SoftIrqExecutor { tx, _thread: handle });
        match EXECUTOR.get() {
            Some(executor) => Ok(executor),
            None => Err(Fail::new(libc::EAGAIN, "deferred procedure executor unavailable")),
        }
    }

    fn raise(&self, tasklet: Arc<Tasklet>) -> Result<(), Fail> {
        self.tx
            .send(tasklet)
            .map_err(|_| Fail::new(libc::EPIPE, "deferred procedure executor exited"))
    }

    /// Sleeps until a tasklet is raised, then runs every raised tasklet back to back in one atomic section.
    fn run(rx: Receiver<Arc<Tasklet>>) {
        while let Ok(first) = rx.recv() {
            let ctx: AtomicContext = AtomicContext::new();
            let mut next: Option<Arc<Tasklet>> = Some(first);
            while let Some(tasklet) = next {
                // Clear before running so that the procedure may be raised again from within.
                tasklet.pending.store(false, Ordering::Release);
                (tasklet.func)(&ctx);
                next = ctx.try_recv(&rx).unwrap_or(None);
            }
        }
    }
}

impl TaskletBackend {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            name: task_name(BackendKind::Tasklet.name()),
            unit: None,
            tasklet: None,
            timeout,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl TaskBackend for TaskletBackend {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Tasklet
    }

    fn init(&mut self, _subvariant: SubVariant, complete: CompletionFn) -> Result<(), Fail> {
        if self.unit.is_some() {
            let cause: String = format!("backend {} already initialized", self.name);
            error!("init(): {}", cause);
            return Err(Fail::new(libc::EALREADY, &cause));
        }
        SoftIrqExecutor::start()?;

        let unit: Arc<DispatchUnit> = Arc::new(DispatchUnit::new(complete));
        let body: Arc<DispatchUnit> = unit.clone();
        self.tasklet = Some(Tasklet::new(Box::new(move |ctx: &AtomicContext| body.execute(ctx))));
        self.unit = Some(unit);
        Ok(())
    }

    fn invoke(&self, data: CompletionData) -> Result<(), Fail> {
        let (unit, tasklet): (&Arc<DispatchUnit>, &Arc<Tasklet>) = match (self.unit.as_ref(), self.tasklet.as_ref()) {
            (Some(unit), Some(tasklet)) => (unit, tasklet),
            _ => return Err(Fail::new(libc::ENOTCONN, "backend not initialized")),
        };

        unit.state().try_dispatch(data)?;
        if let Err(e) = tasklet.schedule() {
            unit.abandon();
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Fail> {
        if let Some(unit) = self.unit.as_ref() {
            unit.state().wait_idle(self.timeout)?;
        }
        self.tasklet = None;
        self.unit = None;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.unit.is_some()
    }

    fn is_busy(&self) -> bool {
        self.unit.as_ref().map_or(false, |unit: &Arc<DispatchUnit>| unit.state().is_busy())
    }
}

impl Drop for TaskletBackend {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.remove() {
                warn!("drop(): failed to remove {} ({:?})", self.name, e);
            }
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
